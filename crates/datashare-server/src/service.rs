use datashare_common::protocol::{
    Data, ObserverRef, OperationResult, Predicates, ResultSet, Template, TemplateId, Uri, ValuesBucket,
};

/// What a provider implements to be served by [`DataShareStub`](crate::DataShareStub).
///
/// Methods mirror the command table and return the values that go on the
/// wire: counts and business codes as `i32`, batch calls one
/// [`OperationResult`] per input URI. Calls arrive on blocking workers,
/// possibly concurrently.
pub trait DataShareService: Send + Sync + 'static {
    fn insert(&self, uri: &Uri, bucket: &ValuesBucket) -> i32;

    fn update(&self, uri: &Uri, predicates: &Predicates, bucket: &ValuesBucket) -> i32;

    fn delete(&self, uri: &Uri, predicates: &Predicates) -> i32;

    /// Business code and, on success, the matching rows.
    fn query(&self, uri: &Uri, predicates: &Predicates, columns: &[String]) -> (i32, Option<ResultSet>);

    /// Inserts each bucket in turn, stopping at the first failure.
    fn batch_insert(&self, uri: &Uri, buckets: &[ValuesBucket]) -> i32 {
        let mut inserted = 0;
        for bucket in buckets {
            let code = self.insert(uri, bucket);
            if code < 0 {
                return if inserted == 0 { code } else { inserted };
            }
            inserted += 1;
        }
        inserted
    }

    fn add_template(&self, uri: &Uri, id: &TemplateId, template: Template) -> i32;

    fn del_template(&self, uri: &Uri, id: &TemplateId) -> i32;

    fn publish(&self, data: &Data, bundle_name: &str) -> Vec<OperationResult>;

    /// The bundle's current data and a business code.
    fn get_published_data(&self, bundle_name: &str) -> (Data, i32);

    fn subscribe_rdb(&self, uris: &[Uri], id: &TemplateId, observer: &ObserverRef) -> Vec<OperationResult>;

    fn unsubscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult>;

    fn enable_subscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult>;

    fn disable_subscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult>;

    fn subscribe_published(&self, uris: &[Uri], subscriber_id: i64, observer: &ObserverRef) -> Vec<OperationResult>;

    fn unsubscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult>;

    fn enable_subscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult>;

    fn disable_subscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult>;

    fn notify_observers(&self, uri: &Uri);

    fn register_observer(&self, uri: &Uri, observer: &ObserverRef) -> bool;

    fn unregister_observer(&self, uri: &Uri, observer: &ObserverRef) -> bool;

    fn normalize_uri(&self, uri: &Uri) -> String {
        uri.to_string()
    }

    fn denormalize_uri(&self, uri: &Uri) -> String {
        uri.to_string()
    }

    /// MIME type of the resource; empty when unknown.
    fn get_type(&self, _uri: &Uri) -> String {
        String::new()
    }
}
