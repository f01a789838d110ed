use std::sync::Arc;

use datashare_common::protocol::{
    Data, DataShareCommand, ObserverRef, OperationResult, Parcel, ParcelReader, Predicates, Result, ResultSet,
    Template, TemplateId, Uri, ValuesBucket, DATA_SHARE_ERROR, INTERFACE_TOKEN,
};
use datashare_common::transport::RemoteObject;
use tracing::{debug, error};

/// Caller-side dispatcher for the data-share service.
///
/// Every method builds a request parcel (interface token first, then the
/// arguments in a fixed order), blocks on the remote for the reply and
/// unmarshals it. Calls block, so run them off async executors.
///
/// A failed round-trip or an undecodable reply never yields a partial
/// result. Instead each method returns its sentinel:
///
/// - `DATA_SHARE_ERROR` (-1) for counts
/// - an empty list for batch results
/// - `None` for objects
/// - `false` for acknowledgements
/// - an empty string for strings
///
/// Each such failure is logged at error level with the command and URI.
pub struct DataShareServiceProxy {
    remote: Arc<dyn RemoteObject>,
}

impl DataShareServiceProxy {
    pub fn new(remote: Arc<dyn RemoteObject>) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteObject> {
        &self.remote
    }

    pub fn is_alive(&self) -> bool {
        self.remote.is_alive()
    }

    fn transact<T>(
        &self,
        command: DataShareCommand,
        uri: &str,
        write: impl FnOnce(&mut Parcel) -> Result<()>,
        read: impl FnOnce(&mut ParcelReader<'_>) -> Result<T>,
    ) -> Option<T> {
        let result = (|| -> Result<T> {
            let mut data = Parcel::with_interface_token(INTERFACE_TOKEN)?;
            write(&mut data)?;
            debug!(%command, uri, bytes = data.len(), "sending request");
            let reply = self.remote.send_request(command.code(), &data)?;
            let mut reader = reply.reader();
            read(&mut reader)
        })();

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!(%command, uri, endpoint = self.remote.endpoint(), error = %e, "request failed");
                None
            }
        }
    }

    pub fn insert(&self, uri: &Uri, bucket: &ValuesBucket) -> i32 {
        self.transact(
            DataShareCommand::Insert,
            uri.as_str(),
            |p| {
                p.write(uri)?;
                p.write(bucket)
            },
            |r| r.read_i32(),
        )
        .unwrap_or(DATA_SHARE_ERROR)
    }

    pub fn update(&self, uri: &Uri, predicates: &Predicates, bucket: &ValuesBucket) -> i32 {
        self.transact(
            DataShareCommand::Update,
            uri.as_str(),
            |p| datashare_common::marshal!(p, uri, predicates, bucket),
            |r| r.read_i32(),
        )
        .unwrap_or(DATA_SHARE_ERROR)
    }

    pub fn delete(&self, uri: &Uri, predicates: &Predicates) -> i32 {
        self.transact(
            DataShareCommand::Delete,
            uri.as_str(),
            |p| datashare_common::marshal!(p, uri, predicates),
            |r| r.read_i32(),
        )
        .unwrap_or(DATA_SHARE_ERROR)
    }

    /// Returns the provider's business code and the result set, or
    /// `(DATA_SHARE_ERROR, None)` if the round-trip failed.
    pub fn query(&self, uri: &Uri, predicates: &Predicates, columns: &[String]) -> (i32, Option<ResultSet>) {
        self.transact(
            DataShareCommand::Query,
            uri.as_str(),
            |p| datashare_common::marshal!(p, uri, predicates, columns),
            |r| Ok((r.read_i32()?, r.read::<Option<ResultSet>>()?)),
        )
        .unwrap_or((DATA_SHARE_ERROR, None))
    }

    pub fn batch_insert(&self, uri: &Uri, buckets: &[ValuesBucket]) -> i32 {
        self.transact(
            DataShareCommand::BatchInsert,
            uri.as_str(),
            |p| datashare_common::marshal!(p, uri, buckets),
            |r| r.read_i32(),
        )
        .unwrap_or(DATA_SHARE_ERROR)
    }

    pub fn add_template(&self, uri: &Uri, id: &TemplateId, template: &Template) -> i32 {
        self.transact(
            DataShareCommand::AddTemplate,
            uri.as_str(),
            |p| datashare_common::marshal!(p, uri, id, template),
            |r| r.read_i32(),
        )
        .unwrap_or(DATA_SHARE_ERROR)
    }

    pub fn del_template(&self, uri: &Uri, id: &TemplateId) -> i32 {
        self.transact(
            DataShareCommand::DelTemplate,
            uri.as_str(),
            |p| datashare_common::marshal!(p, uri, id),
            |r| r.read_i32(),
        )
        .unwrap_or(DATA_SHARE_ERROR)
    }

    pub fn publish(&self, data: &Data, bundle_name: &str) -> Vec<OperationResult> {
        self.transact(
            DataShareCommand::Publish,
            bundle_name,
            |p| datashare_common::marshal!(p, data, bundle_name),
            |r| r.read(),
        )
        .unwrap_or_default()
    }

    /// Returns the bundle's data with the provider's result code, or `None`.
    pub fn get_published_data(&self, bundle_name: &str) -> Option<(Data, i32)> {
        self.transact(
            DataShareCommand::GetPublishedData,
            bundle_name,
            |p| p.write(bundle_name),
            |r| Ok((r.read::<Data>()?, r.read_i32()?)),
        )
    }

    fn batch(
        &self,
        command: DataShareCommand,
        uris: &[Uri],
        write: impl FnOnce(&mut Parcel) -> Result<()>,
    ) -> Vec<OperationResult> {
        let first = uris.first().map(Uri::as_str).unwrap_or_default();
        self.transact(
            command,
            first,
            |p| {
                p.write(uris)?;
                write(p)
            },
            |r| r.read(),
        )
        .unwrap_or_default()
    }

    pub fn subscribe_rdb(&self, uris: &[Uri], id: &TemplateId, observer: &ObserverRef) -> Vec<OperationResult> {
        self.batch(DataShareCommand::SubscribeRdb, uris, |p| datashare_common::marshal!(p, id, observer))
    }

    pub fn unsubscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        self.batch(DataShareCommand::UnsubscribeRdb, uris, |p| p.write(id))
    }

    pub fn enable_subscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        self.batch(DataShareCommand::EnableSubscribeRdb, uris, |p| p.write(id))
    }

    pub fn disable_subscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        self.batch(DataShareCommand::DisableSubscribeRdb, uris, |p| p.write(id))
    }

    pub fn subscribe_published(&self, uris: &[Uri], subscriber_id: i64, observer: &ObserverRef) -> Vec<OperationResult> {
        self.batch(DataShareCommand::SubscribePublished, uris, |p| {
            datashare_common::marshal!(p, subscriber_id, observer)
        })
    }

    pub fn unsubscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        self.batch(DataShareCommand::UnsubscribePublished, uris, |p| p.write(&subscriber_id))
    }

    pub fn enable_subscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        self.batch(DataShareCommand::EnableSubscribePublished, uris, |p| p.write(&subscriber_id))
    }

    pub fn disable_subscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        self.batch(DataShareCommand::DisableSubscribePublished, uris, |p| p.write(&subscriber_id))
    }

    /// Asks the provider to notify every observer of `uri`.
    pub fn notify_observers(&self, uri: &Uri) -> bool {
        self.transact(DataShareCommand::NotifyObservers, uri.as_str(), |p| p.write(uri), |_| Ok(()))
            .is_some()
    }

    pub fn register_observer(&self, uri: &Uri, observer: &ObserverRef) -> bool {
        self.transact(
            DataShareCommand::RegisterObserver,
            uri.as_str(),
            |p| datashare_common::marshal!(p, uri, observer),
            |r| r.read_bool(),
        )
        .unwrap_or(false)
    }

    pub fn unregister_observer(&self, uri: &Uri, observer: &ObserverRef) -> bool {
        self.transact(
            DataShareCommand::UnregisterObserver,
            uri.as_str(),
            |p| datashare_common::marshal!(p, uri, observer),
            |r| r.read_bool(),
        )
        .unwrap_or(false)
    }

    pub fn normalize_uri(&self, uri: &Uri) -> String {
        self.string_call(DataShareCommand::NormalizeUri, uri)
    }

    pub fn denormalize_uri(&self, uri: &Uri) -> String {
        self.string_call(DataShareCommand::DenormalizeUri, uri)
    }

    pub fn get_type(&self, uri: &Uri) -> String {
        self.string_call(DataShareCommand::GetType, uri)
    }

    fn string_call(&self, command: DataShareCommand, uri: &Uri) -> String {
        self.transact(command, uri.as_str(), |p| p.write(uri), |r| r.read_string())
            .unwrap_or_default()
    }
}
