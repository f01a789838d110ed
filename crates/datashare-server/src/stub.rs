use std::sync::Arc;

use datashare_common::protocol::{
    Data, DataShareCommand, DataShareError, ObserverRef, Parcel, ParcelReader, Predicates, Result, Template,
    TemplateId, Uri, ValuesBucket, INTERFACE_TOKEN,
};
use datashare_common::transport::RequestHandler;
use tracing::debug;

use crate::service::DataShareService;

/// Provider-side dispatcher.
///
/// Checks the interface token, resolves the command id, unmarshals the
/// arguments in command-table order, calls the service and marshals its
/// return value as the reply. Unknown ids and undecodable arguments are
/// errors, which the server turns into non-OK reply statuses.
pub struct DataShareStub<S: ?Sized> {
    service: Arc<S>,
}

impl<S: DataShareService + ?Sized> DataShareStub<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    fn dispatch(&self, command: DataShareCommand, data: &mut ParcelReader<'_>, reply: &mut Parcel) -> Result<()> {
        let service = &self.service;
        match command {
            DataShareCommand::Insert => {
                let uri: Uri = data.read()?;
                let bucket: ValuesBucket = data.read()?;
                reply.write_i32(service.insert(&uri, &bucket));
            }
            DataShareCommand::Update => {
                let uri: Uri = data.read()?;
                let predicates: Predicates = data.read()?;
                let bucket: ValuesBucket = data.read()?;
                reply.write_i32(service.update(&uri, &predicates, &bucket));
            }
            DataShareCommand::Delete => {
                let uri: Uri = data.read()?;
                let predicates: Predicates = data.read()?;
                reply.write_i32(service.delete(&uri, &predicates));
            }
            DataShareCommand::Query => {
                let uri: Uri = data.read()?;
                let predicates: Predicates = data.read()?;
                let columns: Vec<String> = data.read()?;
                let (code, result) = service.query(&uri, &predicates, &columns);
                reply.write_i32(code);
                reply.write(&result)?;
            }
            DataShareCommand::AddTemplate => {
                let uri: Uri = data.read()?;
                let id: TemplateId = data.read()?;
                let template: Template = data.read()?;
                reply.write_i32(service.add_template(&uri, &id, template));
            }
            DataShareCommand::DelTemplate => {
                let uri: Uri = data.read()?;
                let id: TemplateId = data.read()?;
                reply.write_i32(service.del_template(&uri, &id));
            }
            DataShareCommand::Publish => {
                let published: Data = data.read()?;
                let bundle_name = data.read_string()?;
                reply.write(&service.publish(&published, &bundle_name))?;
            }
            DataShareCommand::GetPublishedData => {
                let bundle_name = data.read_string()?;
                let (published, code) = service.get_published_data(&bundle_name);
                reply.write(&published)?;
                reply.write_i32(code);
            }
            DataShareCommand::SubscribeRdb => {
                let uris: Vec<Uri> = data.read()?;
                let id: TemplateId = data.read()?;
                let observer: ObserverRef = data.read()?;
                reply.write(&service.subscribe_rdb(&uris, &id, &observer))?;
            }
            DataShareCommand::UnsubscribeRdb => {
                let (uris, id) = read_rdb_batch(data)?;
                reply.write(&service.unsubscribe_rdb(&uris, &id))?;
            }
            DataShareCommand::EnableSubscribeRdb => {
                let (uris, id) = read_rdb_batch(data)?;
                reply.write(&service.enable_subscribe_rdb(&uris, &id))?;
            }
            DataShareCommand::DisableSubscribeRdb => {
                let (uris, id) = read_rdb_batch(data)?;
                reply.write(&service.disable_subscribe_rdb(&uris, &id))?;
            }
            DataShareCommand::SubscribePublished => {
                let uris: Vec<Uri> = data.read()?;
                let subscriber_id = data.read_i64()?;
                let observer: ObserverRef = data.read()?;
                reply.write(&service.subscribe_published(&uris, subscriber_id, &observer))?;
            }
            DataShareCommand::UnsubscribePublished => {
                let (uris, subscriber_id) = read_published_batch(data)?;
                reply.write(&service.unsubscribe_published(&uris, subscriber_id))?;
            }
            DataShareCommand::EnableSubscribePublished => {
                let (uris, subscriber_id) = read_published_batch(data)?;
                reply.write(&service.enable_subscribe_published(&uris, subscriber_id))?;
            }
            DataShareCommand::DisableSubscribePublished => {
                let (uris, subscriber_id) = read_published_batch(data)?;
                reply.write(&service.disable_subscribe_published(&uris, subscriber_id))?;
            }
            DataShareCommand::NotifyObservers => {
                let uri: Uri = data.read()?;
                service.notify_observers(&uri);
            }
            DataShareCommand::BatchInsert => {
                let uri: Uri = data.read()?;
                let buckets: Vec<ValuesBucket> = data.read()?;
                reply.write_i32(service.batch_insert(&uri, &buckets));
            }
            DataShareCommand::RegisterObserver => {
                let uri: Uri = data.read()?;
                let observer: ObserverRef = data.read()?;
                reply.write_bool(service.register_observer(&uri, &observer));
            }
            DataShareCommand::UnregisterObserver => {
                let uri: Uri = data.read()?;
                let observer: ObserverRef = data.read()?;
                reply.write_bool(service.unregister_observer(&uri, &observer));
            }
            DataShareCommand::NormalizeUri => {
                let uri: Uri = data.read()?;
                reply.write_string(&service.normalize_uri(&uri))?;
            }
            DataShareCommand::DenormalizeUri => {
                let uri: Uri = data.read()?;
                reply.write_string(&service.denormalize_uri(&uri))?;
            }
            DataShareCommand::GetType => {
                let uri: Uri = data.read()?;
                reply.write_string(&service.get_type(&uri))?;
            }
        }
        Ok(())
    }
}

fn read_rdb_batch(data: &mut ParcelReader<'_>) -> Result<(Vec<Uri>, TemplateId)> {
    Ok((data.read()?, data.read()?))
}

fn read_published_batch(data: &mut ParcelReader<'_>) -> Result<(Vec<Uri>, i64)> {
    Ok((data.read()?, data.read_i64()?))
}

impl<S: DataShareService + ?Sized> RequestHandler for DataShareStub<S> {
    fn on_remote_request(&self, code: u32, data: &mut ParcelReader<'_>) -> Result<Parcel> {
        data.expect_interface_token(INTERFACE_TOKEN)?;
        let command = DataShareCommand::from_code(code).ok_or(DataShareError::UnknownCommand(code))?;
        debug!(%command, bytes = data.remaining(), "dispatching request");

        let mut reply = Parcel::new();
        self.dispatch(command, data, &mut reply)?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datashare_common::marshal;
    use datashare_common::protocol::{OperationResult, ResultSet, ValueObject};
    use parking_lot::Mutex;

    /// Records the last call and answers with fixed values.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    impl Recording {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }
    }

    impl DataShareService for Recording {
        fn insert(&self, uri: &Uri, bucket: &ValuesBucket) -> i32 {
            self.record(format!("insert {} {}", uri, bucket.len()));
            7
        }

        fn update(&self, uri: &Uri, _predicates: &Predicates, _bucket: &ValuesBucket) -> i32 {
            self.record(format!("update {}", uri));
            2
        }

        fn delete(&self, uri: &Uri, predicates: &Predicates) -> i32 {
            self.record(format!("delete {} {}", uri, predicates.operations().len()));
            1
        }

        fn query(&self, _uri: &Uri, _predicates: &Predicates, columns: &[String]) -> (i32, Option<ResultSet>) {
            let rows = vec![vec![ValueObject::from("Rose")]];
            (0, Some(ResultSet { columns: columns.to_vec(), rows }))
        }

        fn add_template(&self, _uri: &Uri, id: &TemplateId, _template: Template) -> i32 {
            self.record(format!("add_template {}", id.subscriber_id));
            0
        }

        fn del_template(&self, _uri: &Uri, _id: &TemplateId) -> i32 {
            0
        }

        fn publish(&self, data: &Data, _bundle_name: &str) -> Vec<OperationResult> {
            data.items.iter().map(|item| OperationResult::ok(item.key.clone())).collect()
        }

        fn get_published_data(&self, bundle_name: &str) -> (Data, i32) {
            self.record(format!("get_published {}", bundle_name));
            (Data::default(), 0)
        }

        fn subscribe_rdb(&self, uris: &[Uri], _id: &TemplateId, observer: &ObserverRef) -> Vec<OperationResult> {
            self.record(format!("subscribe_rdb {}", observer));
            uris.iter().map(|uri| OperationResult::ok(uri.as_str())).collect()
        }

        fn unsubscribe_rdb(&self, uris: &[Uri], _id: &TemplateId) -> Vec<OperationResult> {
            uris.iter().map(|uri| OperationResult::ok(uri.as_str())).collect()
        }

        fn enable_subscribe_rdb(&self, uris: &[Uri], _id: &TemplateId) -> Vec<OperationResult> {
            uris.iter().map(|uri| OperationResult::ok(uri.as_str())).collect()
        }

        fn disable_subscribe_rdb(&self, uris: &[Uri], _id: &TemplateId) -> Vec<OperationResult> {
            uris.iter().map(|uri| OperationResult::ok(uri.as_str())).collect()
        }

        fn subscribe_published(&self, uris: &[Uri], _id: i64, _observer: &ObserverRef) -> Vec<OperationResult> {
            uris.iter().map(|uri| OperationResult::ok(uri.as_str())).collect()
        }

        fn unsubscribe_published(&self, uris: &[Uri], _id: i64) -> Vec<OperationResult> {
            uris.iter().map(|uri| OperationResult::ok(uri.as_str())).collect()
        }

        fn enable_subscribe_published(&self, uris: &[Uri], _id: i64) -> Vec<OperationResult> {
            uris.iter().map(|uri| OperationResult::ok(uri.as_str())).collect()
        }

        fn disable_subscribe_published(&self, uris: &[Uri], _id: i64) -> Vec<OperationResult> {
            uris.iter().map(|uri| OperationResult::ok(uri.as_str())).collect()
        }

        fn notify_observers(&self, uri: &Uri) {
            self.record(format!("notify {}", uri));
        }

        fn register_observer(&self, _uri: &Uri, _observer: &ObserverRef) -> bool {
            true
        }

        fn unregister_observer(&self, _uri: &Uri, _observer: &ObserverRef) -> bool {
            false
        }
    }

    fn stub() -> DataShareStub<Recording> {
        DataShareStub::new(Arc::new(Recording::default()))
    }

    fn request(write: impl FnOnce(&mut Parcel) -> Result<()>) -> Parcel {
        let mut parcel = Parcel::with_interface_token(INTERFACE_TOKEN).unwrap();
        write(&mut parcel).unwrap();
        parcel
    }

    #[test]
    fn test_insert_dispatch() {
        let stub = stub();
        let uri = Uri::from("datashare:///contacts");
        let bucket = ValuesBucket::new().with("name", "Rose").with("age", 3i64);
        let data = request(|p| marshal!(p, uri, bucket));

        let reply = stub.on_remote_request(DataShareCommand::Insert.code(), &mut data.reader()).unwrap();
        assert_eq!(reply.reader().read_i32().unwrap(), 7);
        assert_eq!(*stub.service().calls.lock(), vec!["insert datashare:///contacts 2".to_string()]);
    }

    #[test]
    fn test_query_reply_layout() {
        let stub = stub();
        let uri = Uri::from("datashare:///contacts");
        let columns = vec!["name".to_string()];
        let data = request(|p| marshal!(p, uri, Predicates::new().equal_to("age", 3i64), columns));

        let reply = stub.on_remote_request(DataShareCommand::Query.code(), &mut data.reader()).unwrap();
        let mut reader = reply.reader();
        assert_eq!(reader.read_i32().unwrap(), 0);
        let result: Option<ResultSet> = reader.read().unwrap();
        assert_eq!(result.unwrap().get(0, "name"), Some(&ValueObject::from("Rose")));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_subscribe_dispatch_keeps_uri_order() {
        let stub = stub();
        let uris = vec![Uri::from("datashare:///b"), Uri::from("datashare:///a")];
        let id = TemplateId::new(3, "com.example");
        let observer = ObserverRef::new("127.0.0.1:9", 4);
        let data = request(|p| marshal!(p, uris, id, observer));

        let reply = stub.on_remote_request(DataShareCommand::SubscribeRdb.code(), &mut data.reader()).unwrap();
        let results: Vec<OperationResult> = reply.reader().read().unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(order, vec!["datashare:///b", "datashare:///a"]);
        assert_eq!(*stub.service().calls.lock(), vec!["subscribe_rdb 127.0.0.1:9#4".to_string()]);
    }

    #[test]
    fn test_default_string_calls() {
        let stub = stub();
        let uri = Uri::from("datashare:///a");

        let data = request(|p| p.write(&uri));
        let reply = stub.on_remote_request(DataShareCommand::NormalizeUri.code(), &mut data.reader()).unwrap();
        assert_eq!(reply.reader().read_string().unwrap(), "datashare:///a");

        let reply = stub.on_remote_request(DataShareCommand::GetType.code(), &mut data.reader()).unwrap();
        assert_eq!(reply.reader().read_string().unwrap(), "");
    }

    #[test]
    fn test_notify_has_empty_reply() {
        let stub = stub();
        let data = request(|p| p.write(&Uri::from("datashare:///a")));
        let reply = stub.on_remote_request(DataShareCommand::NotifyObservers.code(), &mut data.reader()).unwrap();
        assert!(reply.is_empty());
        assert_eq!(*stub.service().calls.lock(), vec!["notify datashare:///a".to_string()]);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let stub = stub();
        let data = request(|_| Ok(()));
        let err = stub.on_remote_request(99, &mut data.reader()).unwrap_err();
        assert!(matches!(err, DataShareError::UnknownCommand(99)));
    }

    #[test]
    fn test_wrong_token_rejected() {
        let stub = stub();
        let mut data = Parcel::with_interface_token("datashare.ISomethingElse").unwrap();
        data.write(&Uri::from("datashare:///a")).unwrap();
        assert!(stub.on_remote_request(DataShareCommand::GetType.code(), &mut data.reader()).is_err());
        assert!(stub.service().calls.lock().is_empty());
    }

    #[test]
    fn test_truncated_arguments_rejected() {
        let stub = stub();
        let data = request(|p| p.write(&Uri::from("datashare:///a")));
        let err = stub.on_remote_request(DataShareCommand::Update.code(), &mut data.reader()).unwrap_err();
        assert!(matches!(err, DataShareError::CorruptEncoding(_)));
        assert!(stub.service().calls.lock().is_empty());
    }

    #[test]
    fn test_batch_insert_default_counts_rows() {
        let stub = stub();
        let uri = Uri::from("datashare:///a");
        let buckets = vec![ValuesBucket::new().with("a", 1i64), ValuesBucket::new().with("a", 2i64)];
        let data = request(|p| marshal!(p, uri, buckets));
        let reply = stub.on_remote_request(DataShareCommand::BatchInsert.code(), &mut data.reader()).unwrap();
        assert_eq!(reply.reader().read_i32().unwrap(), 2);
    }
}
