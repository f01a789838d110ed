//! Reference provider keeping tables and published data in memory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use datashare_common::protocol::{
    result_code, Data, DataShareError, ObserverRef, OperationResult, Predicates, PublishedDataChangeNode, PublishedDataItem,
    PublishedValue, RdbChangeNode, Result, ResultSet, Template, TemplateId, Uri, ValueObject, ValuesBucket,
};
use datashare_common::registry::SubscriptionRegistry;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::filter::Selection;
use crate::notifier::Notifier;
use crate::service::DataShareService;

/// The URI is not well-formed.
pub const E_INVALID_URI: i32 = -2;
/// The predicates cannot be evaluated.
pub const E_INVALID_PREDICATES: i32 = -3;
/// Insert or update without any values.
pub const E_EMPTY_BUCKET: i32 = -4;
/// A row id or row count does not fit the `i32` reply.
pub const E_COUNT_OVERFLOW: i32 = -5;

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, ValuesBucket>,
}

#[derive(Default)]
struct Bundle {
    version: i32,
    items: BTreeMap<(String, i64), PublishedValue>,
}

impl Bundle {
    fn items(&self) -> Vec<PublishedDataItem> {
        self.items
            .iter()
            .map(|((key, subscriber_id), value)| PublishedDataItem::new(key.clone(), *subscriber_id, value.clone()))
            .collect()
    }
}

/// One template sub-query result as delivered to RDB subscribers.
#[derive(Serialize)]
struct TemplateResult<'a> {
    key: &'a str,
    select_sql: &'a str,
    rows: Vec<&'a ValuesBucket>,
}

/// In-memory [`DataShareService`].
///
/// Every URI names a table of rows. Data changes are pushed to plain change
/// observers and to RDB subscribers of that URI before the mutating call
/// returns. Template sub-queries are not interpreted: each template node
/// receives the whole table as a JSON document.
///
/// Observers whose host can no longer be reached are dropped from every
/// registration.
pub struct InMemoryProvider {
    tables: RwLock<HashMap<Uri, Table>>,
    published: Mutex<HashMap<String, Bundle>>,
    registry: SubscriptionRegistry<ObserverRef>,
    notifier: Arc<dyn Notifier>,
}

impl InMemoryProvider {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            published: Mutex::new(HashMap::new()),
            registry: SubscriptionRegistry::new(),
            notifier,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry<ObserverRef> {
        &self.registry
    }

    /// Number of rows stored under `uri`.
    pub fn row_count(&self, uri: &Uri) -> usize {
        self.tables.read().get(uri).map(|t| t.rows.len()).unwrap_or(0)
    }

    // ---- Notification ----

    fn deliver(&self, observer: &ObserverRef, push: impl FnOnce(&dyn Notifier) -> Result<()>) {
        match push(self.notifier.as_ref()) {
            Ok(()) => {}
            Err(e) if e.is_transport() => {
                let removed = self.registry.remove_observer(observer);
                warn!(%observer, removed, error = %e, "observer unreachable, registrations dropped");
            }
            Err(e) => warn!(%observer, error = %e, "notification failed"),
        }
    }

    fn notify_change(&self, uri: &Uri) {
        for observer in self.registry.change_observers(uri) {
            self.deliver(&observer, |n| n.on_change(&observer, uri));
        }
        for target in self.registry.rdb_targets(uri) {
            let node = self.rdb_node(uri, &target.template_id, &target.template);
            for observer in &target.observers {
                self.deliver(observer, |n| n.on_rdb_change(observer, &node));
            }
        }
    }

    fn rdb_node(&self, uri: &Uri, template_id: &TemplateId, template: &Template) -> RdbChangeNode {
        let tables = self.tables.read();
        let rows: Vec<&ValuesBucket> = tables.get(uri).map(|t| t.rows.values().collect()).unwrap_or_default();
        let data = template
            .predicates
            .iter()
            .map(|node| {
                let result = TemplateResult { key: &node.key, select_sql: &node.select_sql, rows: rows.clone() };
                serde_json::to_string(&result).unwrap_or_else(|e| {
                    warn!(%uri, key = %node.key, error = %e, "template result not serializable");
                    String::new()
                })
            })
            .collect();
        RdbChangeNode { uri: uri.to_string(), template_id: template_id.clone(), data }
    }

    /// Pushes the current template results for every URI that succeeded.
    fn push_rdb_snapshots(&self, results: &[OperationResult], id: &TemplateId, observer: &ObserverRef) {
        for result in results.iter().filter(|r| r.is_ok()) {
            let uri = Uri::new(result.uri.clone());
            if let Some(template) = self.registry.template(&uri, id) {
                let node = self.rdb_node(&uri, id, &template);
                self.deliver(observer, |n| n.on_rdb_change(observer, &node));
            }
        }
    }

    /// Pushes the current published items under each URI that succeeded,
    /// one node per bundle holding any.
    fn push_published_snapshots(&self, results: &[OperationResult], subscriber_id: i64, observer: &ObserverRef) {
        let nodes: Vec<PublishedDataChangeNode> = {
            let published = self.published.lock();
            let keys: BTreeSet<&str> = results.iter().filter(|r| r.is_ok()).map(|r| r.uri.as_str()).collect();
            published
                .iter()
                .map(|(bundle_name, bundle)| PublishedDataChangeNode {
                    bundle_name: bundle_name.clone(),
                    items: bundle
                        .items()
                        .into_iter()
                        .filter(|item| item.subscriber_id == subscriber_id && keys.contains(item.key.as_str()))
                        .collect(),
                })
                .filter(|node| !node.items.is_empty())
                .collect()
        };
        for node in nodes {
            self.deliver(observer, |n| n.on_published_change(observer, &node));
        }
    }

    /// Applies `change` to the URI's table. `change` returns how many rows it
    /// touched and the reply; observers hear about any touched row even when
    /// the reply is out of range.
    fn mutate(&self, uri: &Uri, change: impl FnOnce(&mut Table) -> (usize, Result<i32>)) -> i32 {
        let (touched, reply) = change(self.tables.write().entry(uri.clone()).or_default());
        if touched > 0 {
            self.notify_change(uri);
        }
        reply.unwrap_or_else(|e| {
            warn!(%uri, touched, error = %e, "reply out of range");
            E_COUNT_OVERFLOW
        })
    }
}

/// Narrows a row id or count to the wire's `i32`.
fn reply_count<T>(n: T) -> Result<i32>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    n.try_into()
        .map_err(|_| DataShareError::Parameter(format!("{} does not fit an i32 reply", n)))
}

impl DataShareService for InMemoryProvider {
    fn insert(&self, uri: &Uri, bucket: &ValuesBucket) -> i32 {
        if !uri.is_well_formed() {
            return E_INVALID_URI;
        }
        if bucket.is_empty() {
            return E_EMPTY_BUCKET;
        }
        self.mutate(uri, |table| {
            table.next_id += 1;
            table.rows.insert(table.next_id, bucket.clone());
            debug!(%uri, row_id = table.next_id, "row inserted");
            (1, reply_count(table.next_id))
        })
    }

    fn update(&self, uri: &Uri, predicates: &Predicates, bucket: &ValuesBucket) -> i32 {
        if !uri.is_well_formed() {
            return E_INVALID_URI;
        }
        if bucket.is_empty() {
            return E_EMPTY_BUCKET;
        }
        let Ok(selection) = Selection::compile(predicates) else {
            return E_INVALID_PREDICATES;
        };
        self.mutate(uri, |table| {
            let mut changed = 0usize;
            for row in table.rows.values_mut().filter(|row| selection.matches(row)) {
                for (column, value) in bucket.iter() {
                    row.put(column.clone(), value.clone());
                }
                changed += 1;
            }
            (changed, reply_count(changed))
        })
    }

    fn delete(&self, uri: &Uri, predicates: &Predicates) -> i32 {
        if !uri.is_well_formed() {
            return E_INVALID_URI;
        }
        let Ok(selection) = Selection::compile(predicates) else {
            return E_INVALID_PREDICATES;
        };
        self.mutate(uri, |table| {
            let before = table.rows.len();
            table.rows.retain(|_, row| !selection.matches(row));
            let removed = before - table.rows.len();
            (removed, reply_count(removed))
        })
    }

    fn query(&self, uri: &Uri, predicates: &Predicates, columns: &[String]) -> (i32, Option<ResultSet>) {
        if !uri.is_well_formed() {
            return (E_INVALID_URI, None);
        }
        let selection = match Selection::compile(predicates) {
            Ok(selection) => selection,
            Err(e) => {
                debug!(%uri, error = %e, "query rejected");
                return (E_INVALID_PREDICATES, None);
            }
        };

        let tables = self.tables.read();
        let mut matched: Vec<&ValuesBucket> = tables
            .get(uri)
            .map(|t| t.rows.values().filter(|row| selection.matches(row)).collect())
            .unwrap_or_default();
        selection.sort(&mut matched, |row| *row);

        let columns: Vec<String> = if columns.is_empty() {
            let all: BTreeSet<&String> = matched.iter().flat_map(|row| row.iter().map(|(c, _)| c)).collect();
            all.into_iter().cloned().collect()
        } else {
            columns.to_vec()
        };
        let rows = matched
            .iter()
            .map(|row| columns.iter().map(|c| row.get(c).cloned().unwrap_or(ValueObject::Null)).collect())
            .collect();

        (result_code::OK, Some(ResultSet { columns, rows: selection.page(rows) }))
    }

    fn batch_insert(&self, uri: &Uri, buckets: &[ValuesBucket]) -> i32 {
        if !uri.is_well_formed() {
            return E_INVALID_URI;
        }
        if buckets.iter().any(ValuesBucket::is_empty) {
            return E_EMPTY_BUCKET;
        }
        self.mutate(uri, |table| {
            for bucket in buckets {
                table.next_id += 1;
                table.rows.insert(table.next_id, bucket.clone());
            }
            (buckets.len(), reply_count(buckets.len()))
        })
    }

    fn add_template(&self, uri: &Uri, id: &TemplateId, template: Template) -> i32 {
        self.registry.add_template(uri, id, template)
    }

    fn del_template(&self, uri: &Uri, id: &TemplateId) -> i32 {
        self.registry.del_template(uri, id)
    }

    fn publish(&self, data: &Data, bundle_name: &str) -> Vec<OperationResult> {
        if bundle_name.is_empty() {
            return data
                .items
                .iter()
                .map(|item| OperationResult::new(item.key.clone(), result_code::E_PROVIDER))
                .collect();
        }

        let mut accepted = Vec::new();
        let results: Vec<OperationResult> = {
            let mut published = self.published.lock();
            let bundle = published.entry(bundle_name.to_string()).or_default();
            bundle.version = data.version;
            data.items
                .iter()
                .map(|item| {
                    if !Uri::new(item.key.clone()).is_well_formed() {
                        return OperationResult::new(item.key.clone(), result_code::E_URI_INVALID);
                    }
                    bundle.items.insert((item.key.clone(), item.subscriber_id), item.value.clone());
                    accepted.push(item.clone());
                    OperationResult::ok(item.key.clone())
                })
                .collect()
        };
        info!(bundle_name, items = accepted.len(), version = data.version, "data published");

        // group the accepted items per subscribed observer
        let mut pending: Vec<(ObserverRef, Vec<PublishedDataItem>)> = Vec::new();
        for item in &accepted {
            let targets = self.registry.published_targets(&Uri::new(item.key.clone()));
            for target in targets.into_iter().filter(|t| t.subscriber_id == item.subscriber_id) {
                for observer in target.observers {
                    match pending.iter_mut().find(|(o, _)| *o == observer) {
                        Some((_, items)) => items.push(item.clone()),
                        None => pending.push((observer, vec![item.clone()])),
                    }
                }
            }
        }
        for (observer, items) in pending {
            let node = PublishedDataChangeNode { bundle_name: bundle_name.to_string(), items };
            self.deliver(&observer, |n| n.on_published_change(&observer, &node));
        }
        results
    }

    fn get_published_data(&self, bundle_name: &str) -> (Data, i32) {
        let published = self.published.lock();
        let data = published
            .get(bundle_name)
            .map(|bundle| Data { items: bundle.items(), version: bundle.version })
            .unwrap_or_default();
        (data, result_code::OK)
    }

    fn subscribe_rdb(&self, uris: &[Uri], id: &TemplateId, observer: &ObserverRef) -> Vec<OperationResult> {
        let results = self.registry.subscribe_rdb(uris, id, observer);
        self.push_rdb_snapshots(&results, id, observer);
        results
    }

    fn unsubscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        self.registry.unsubscribe_rdb(uris, id)
    }

    fn enable_subscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        let results = self.registry.enable_rdb(uris, id);
        for result in results.iter().filter(|r| r.is_ok()) {
            let uri = Uri::new(result.uri.clone());
            for target in self.registry.rdb_targets(&uri).into_iter().filter(|t| &t.template_id == id) {
                let node = self.rdb_node(&uri, id, &target.template);
                for observer in &target.observers {
                    self.deliver(observer, |n| n.on_rdb_change(observer, &node));
                }
            }
        }
        results
    }

    fn disable_subscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        self.registry.disable_rdb(uris, id)
    }

    fn subscribe_published(&self, uris: &[Uri], subscriber_id: i64, observer: &ObserverRef) -> Vec<OperationResult> {
        let results = self.registry.subscribe_published(uris, subscriber_id, observer);
        self.push_published_snapshots(&results, subscriber_id, observer);
        results
    }

    fn unsubscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        self.registry.unsubscribe_published(uris, subscriber_id)
    }

    fn enable_subscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        self.registry.enable_published(uris, subscriber_id)
    }

    fn disable_subscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        self.registry.disable_published(uris, subscriber_id)
    }

    fn notify_observers(&self, uri: &Uri) {
        self.notify_change(uri);
    }

    fn register_observer(&self, uri: &Uri, observer: &ObserverRef) -> bool {
        uri.is_well_formed() && self.registry.add_change_observer(uri, observer.clone())
    }

    fn unregister_observer(&self, uri: &Uri, observer: &ObserverRef) -> bool {
        self.registry.remove_change_observer(uri, observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datashare_common::protocol::{DataShareError, PredicateTemplateNode};

    #[derive(Debug, Clone, PartialEq)]
    enum Push {
        Change(u64, String),
        Rdb(u64, RdbChangeNode),
        Published(u64, PublishedDataChangeNode),
    }

    /// Records pushes; observers with id 0 are unreachable.
    #[derive(Default)]
    struct Recorder {
        pushes: Mutex<Vec<Push>>,
    }

    impl Recorder {
        fn record(&self, observer: &ObserverRef, push: Push) -> Result<()> {
            if observer.id == 0 {
                return Err(DataShareError::PeerDied);
            }
            self.pushes.lock().push(push);
            Ok(())
        }

        fn take(&self) -> Vec<Push> {
            std::mem::take(&mut *self.pushes.lock())
        }
    }

    impl Notifier for Recorder {
        fn on_change(&self, observer: &ObserverRef, uri: &Uri) -> Result<()> {
            self.record(observer, Push::Change(observer.id, uri.to_string()))
        }

        fn on_rdb_change(&self, observer: &ObserverRef, node: &RdbChangeNode) -> Result<()> {
            self.record(observer, Push::Rdb(observer.id, node.clone()))
        }

        fn on_published_change(&self, observer: &ObserverRef, node: &PublishedDataChangeNode) -> Result<()> {
            self.record(observer, Push::Published(observer.id, node.clone()))
        }
    }

    fn provider() -> (InMemoryProvider, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (InMemoryProvider::new(recorder.clone()), recorder)
    }

    fn observer(id: u64) -> ObserverRef {
        ObserverRef::new("127.0.0.1:9", id)
    }

    fn contacts() -> Uri {
        Uri::from("datashare:///com.example/contacts")
    }

    fn names(result: &ResultSet) -> Vec<String> {
        (0..result.row_count())
            .map(|i| match result.get(i, "name") {
                Some(ValueObject::String(s)) => s.clone(),
                other => format!("{:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_crud() {
        let (provider, _) = provider();
        let uri = contacts();

        assert_eq!(provider.insert(&uri, &ValuesBucket::new().with("name", "Rose").with("age", 3i64)), 1);
        assert_eq!(provider.insert(&uri, &ValuesBucket::new().with("name", "Lily").with("age", 5i64)), 2);

        let updated = provider.update(
            &uri,
            &Predicates::new().equal_to("name", "Lily"),
            &ValuesBucket::new().with("age", 6i64),
        );
        assert_eq!(updated, 1);

        let (code, result) = provider.query(&uri, &Predicates::new().order_by_desc("age"), &[]);
        assert_eq!(code, result_code::OK);
        let result = result.unwrap();
        assert_eq!(result.columns, vec!["age".to_string(), "name".to_string()]);
        assert_eq!(names(&result), vec!["Lily", "Rose"]);
        assert_eq!(result.get(0, "age"), Some(&ValueObject::Int64(6)));

        assert_eq!(provider.delete(&uri, &Predicates::new().less_than("age", 4i64)), 1);
        assert_eq!(provider.row_count(&uri), 1);
    }

    #[test]
    fn test_query_projects_requested_columns() {
        let (provider, _) = provider();
        let uri = contacts();
        provider.insert(&uri, &ValuesBucket::new().with("name", "Rose"));

        let (_, result) = provider.query(&uri, &Predicates::new(), &["name".into(), "phone".into()]);
        let result = result.unwrap();
        assert_eq!(result.rows, vec![vec![ValueObject::from("Rose"), ValueObject::Null]]);
    }

    #[test]
    fn test_invalid_requests() {
        let (provider, _) = provider();
        assert_eq!(provider.insert(&Uri::from("no scheme"), &ValuesBucket::new().with("a", 1i64)), E_INVALID_URI);
        assert_eq!(provider.insert(&contacts(), &ValuesBucket::new()), E_EMPTY_BUCKET);

        let where_clause = Predicates::with_where_clause("age > ?", vec!["3".into()]);
        assert_eq!(provider.query(&contacts(), &where_clause, &[]), (E_INVALID_PREDICATES, None));
        assert_eq!(provider.delete(&contacts(), &where_clause), E_INVALID_PREDICATES);
    }

    #[test]
    fn test_reply_count_rejects_overflow() {
        assert_eq!(reply_count(7usize).unwrap(), 7);
        assert!(matches!(reply_count(i32::MAX as usize + 1), Err(DataShareError::Parameter(_))));
        assert!(reply_count(-1i64 << 40).is_err());
    }

    #[test]
    fn test_row_id_past_i32_is_an_error_but_still_notifies() {
        let (provider, recorder) = provider();
        let uri = contacts();
        assert!(provider.register_observer(&uri, &observer(1)));
        provider.tables.write().entry(uri.clone()).or_default().next_id = i64::from(i32::MAX);

        assert_eq!(provider.insert(&uri, &ValuesBucket::new().with("name", "Rose")), E_COUNT_OVERFLOW);
        assert_eq!(provider.row_count(&uri), 1);
        assert_eq!(recorder.take(), vec![Push::Change(1, uri.to_string())]);
    }

    #[test]
    fn test_mutation_notifies_change_observers() {
        let (provider, recorder) = provider();
        let uri = contacts();
        assert!(provider.register_observer(&uri, &observer(1)));
        assert!(!provider.register_observer(&uri, &observer(1)));

        provider.insert(&uri, &ValuesBucket::new().with("name", "Rose"));
        assert_eq!(recorder.take(), vec![Push::Change(1, uri.to_string())]);

        // no rows changed, nobody is told
        provider.delete(&uri, &Predicates::new().equal_to("name", "Nobody"));
        assert!(recorder.take().is_empty());

        assert!(provider.unregister_observer(&uri, &observer(1)));
        provider.notify_observers(&uri);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_rdb_subscription_lifecycle() {
        let (provider, recorder) = provider();
        let uri = contacts();
        let id = TemplateId::new(7, "com.example");
        let template = Template::new(vec![PredicateTemplateNode::new("all", "select * from contacts")], "");

        let results = provider.subscribe_rdb(&[uri.clone()], &id, &observer(1));
        assert_eq!(results[0].code, result_code::E_TEMPLATE_NOT_FOUND);

        assert_eq!(provider.add_template(&uri, &id, template), result_code::OK);
        provider.insert(&uri, &ValuesBucket::new().with("name", "Rose"));
        assert!(provider.subscribe_rdb(&[uri.clone()], &id, &observer(1))[0].is_ok());

        // initial snapshot
        let pushes = recorder.take();
        let [Push::Rdb(1, node)] = pushes.as_slice() else {
            panic!("expected one rdb push, got {:?}", pushes);
        };
        let doc: serde_json::Value = serde_json::from_str(&node.data[0]).unwrap();
        assert_eq!(doc["key"], "all");
        assert_eq!(doc["rows"][0]["name"], "Rose");

        provider.disable_subscribe_rdb(&[uri.clone()], &id);
        provider.insert(&uri, &ValuesBucket::new().with("name", "Lily"));
        assert!(recorder.take().is_empty());

        provider.enable_subscribe_rdb(&[uri.clone()], &id);
        assert_eq!(recorder.take().len(), 1);

        provider.notify_observers(&uri);
        assert_eq!(recorder.take().len(), 1);
    }

    #[test]
    fn test_deleted_template_goes_stale() {
        let (provider, recorder) = provider();
        let uri = contacts();
        let id = TemplateId::new(7, "com.example");
        provider.add_template(&uri, &id, Template::new(vec![PredicateTemplateNode::new("k", "q")], ""));
        provider.subscribe_rdb(&[uri.clone()], &id, &observer(1));
        recorder.take();

        assert_eq!(provider.del_template(&uri, &id), result_code::OK);
        provider.insert(&uri, &ValuesBucket::new().with("name", "Rose"));
        assert!(recorder.take().is_empty());

        assert_eq!(provider.enable_subscribe_rdb(&[uri.clone()], &id)[0].code, result_code::E_TEMPLATE_STALE);
        assert!(provider.unsubscribe_rdb(&[uri.clone()], &id)[0].is_ok());
    }

    #[test]
    fn test_publish_and_fan_out() {
        let (provider, recorder) = provider();
        let key = "datashare:///com.example/weather";
        let results = provider.subscribe_published(&[Uri::from(key)], 1, &observer(2));
        assert!(results[0].is_ok());
        assert!(recorder.take().is_empty());

        let data = Data {
            items: vec![
                PublishedDataItem::new(key, 1, PublishedValue::String("sunny".into())),
                PublishedDataItem::new(key, 2, PublishedValue::String("other subscriber".into())),
                PublishedDataItem::new("bad key", 1, PublishedValue::Blob(vec![1])),
            ],
            version: 3,
        };
        let results = provider.publish(&data, "com.example");
        let codes: Vec<i32> = results.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![result_code::OK, result_code::OK, result_code::E_URI_INVALID]);

        let pushes = recorder.take();
        let [Push::Published(2, node)] = pushes.as_slice() else {
            panic!("expected one published push, got {:?}", pushes);
        };
        assert_eq!(node.items, vec![data.items[0].clone()]);

        let (stored, code) = provider.get_published_data("com.example");
        assert_eq!(code, result_code::OK);
        assert_eq!(stored.version, 3);
        assert_eq!(stored.items.len(), 2);

        let (unknown, code) = provider.get_published_data("com.unknown");
        assert_eq!((unknown.items.len(), code), (0, result_code::OK));

        // a late subscriber gets what is already there
        provider.subscribe_published(&[Uri::from(key)], 2, &observer(3));
        let pushes = recorder.take();
        assert!(matches!(pushes.as_slice(), [Push::Published(3, node)] if node.items.len() == 1));
    }

    #[test]
    fn test_unreachable_observer_is_dropped() {
        let (provider, recorder) = provider();
        let uri = contacts();
        provider.register_observer(&uri, &observer(0));
        provider.register_observer(&uri, &observer(1));

        provider.notify_observers(&uri);
        assert_eq!(recorder.take(), vec![Push::Change(1, uri.to_string())]);
        assert_eq!(provider.registry().change_observers(&uri), vec![observer(1)]);
    }

    #[test]
    fn test_batch_insert() {
        let (provider, recorder) = provider();
        let uri = contacts();
        provider.register_observer(&uri, &observer(1));
        let rows = vec![ValuesBucket::new().with("n", 1i64), ValuesBucket::new().with("n", 2i64)];
        assert_eq!(provider.batch_insert(&uri, &rows), 2);
        assert_eq!(provider.row_count(&uri), 2);
        // one notification for the whole batch
        assert_eq!(recorder.take().len(), 1);
    }
}
