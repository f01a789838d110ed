//! Subscription registry: who wants to hear about which URI.
//!
//! Four kinds of interest are tracked, all behind one short-held lock:
//!
//! - **listeners**: a single slot per URI for the `on`/`off` API. Registering
//!   over an occupied slot hands the previous observer back to the caller.
//! - **change observers**: every observer registered for plain change
//!   notification of a URI.
//! - **RDB subscriptions**: keyed by `(uri, TemplateId)`, each with an
//!   enabled flag, only valid while the template exists.
//! - **published-data subscriptions**: keyed by `(uri, subscriber_id)`.
//!
//! Batch calls process every URI independently and return one
//! [`OperationResult`] per input URI, in input order.
//!
//! Deleting a template keeps its RDB subscriptions. They become *stale*:
//! skipped by [`SubscriptionRegistry::rdb_targets`], answered with
//! `E_TEMPLATE_STALE` by enable/disable, removable by unsubscribe, and revived
//! when a template is added again under the same key.
//!
//! Nothing here calls out to observers. Callers collect targets, drop the
//! lock (by returning), and only then deliver.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::protocol::types::result_code;
use crate::protocol::{OperationResult, Template, TemplateId, Uri};

// ---------------------------------------------------------------------------
// SubscriptionState
// ---------------------------------------------------------------------------

/// Delivery state of a subscription entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone)]
struct Entry<O> {
    observers: Vec<O>,
    state: SubscriptionState,
}

impl<O> Entry<O> {
    fn new(observer: O) -> Self {
        Self { observers: vec![observer], state: SubscriptionState::Enabled }
    }
}

// ---------------------------------------------------------------------------
// Snapshots handed out to callers
// ---------------------------------------------------------------------------

/// An RDB subscription as seen by enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct RdbEntryInfo {
    pub template_id: TemplateId,
    pub state: SubscriptionState,
    pub stale: bool,
    pub observers: usize,
}

/// A published-data subscription as seen by enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEntryInfo {
    pub subscriber_id: i64,
    pub state: SubscriptionState,
    pub observers: usize,
}

/// Observers to notify for one RDB subscription.
#[derive(Debug, Clone)]
pub struct RdbTarget<O> {
    pub template_id: TemplateId,
    pub template: Template,
    pub observers: Vec<O>,
}

/// Observers to notify for one published-data subscription.
#[derive(Debug, Clone)]
pub struct PublishedTarget<O> {
    pub subscriber_id: i64,
    pub observers: Vec<O>,
}

// ---------------------------------------------------------------------------
// SubscriptionRegistry
// ---------------------------------------------------------------------------

type RdbKey = (Uri, TemplateId);
type PublishedKey = (Uri, i64);

struct Inner<O> {
    listeners: HashMap<Uri, O>,
    change_observers: HashMap<Uri, Vec<O>>,
    templates: HashMap<RdbKey, Template>,
    rdb: BTreeMap<RdbKey, Entry<O>>,
    published: BTreeMap<PublishedKey, Entry<O>>,
}

/// Registry of observer interest, generic over the observer handle.
///
/// The registry owns every handle it stores; lookups return clones.
pub struct SubscriptionRegistry<O> {
    inner: Mutex<Inner<O>>,
}

impl<O> Default for SubscriptionRegistry<O> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                listeners: HashMap::new(),
                change_observers: HashMap::new(),
                templates: HashMap::new(),
                rdb: BTreeMap::new(),
                published: BTreeMap::new(),
            }),
        }
    }
}

impl<O: Clone + PartialEq> SubscriptionRegistry<O> {
    pub fn new() -> Self {
        Self::default()
    }

    // -- single-slot listeners ------------------------------------------------

    /// Puts `observer` in the URI's slot and returns the observer it replaced.
    pub fn register_listener(&self, uri: &Uri, observer: O) -> Option<O> {
        let previous = self.inner.lock().listeners.insert(uri.clone(), observer);
        if previous.is_some() {
            debug!(%uri, "listener replaced");
        }
        previous
    }

    /// Empties the URI's slot, returning its observer.
    pub fn unregister_listener(&self, uri: &Uri) -> Option<O> {
        self.inner.lock().listeners.remove(uri)
    }

    pub fn listener(&self, uri: &Uri) -> Option<O> {
        self.inner.lock().listeners.get(uri).cloned()
    }

    // -- change observers -----------------------------------------------------

    /// Adds an observer for plain change notifications. Returns false if it
    /// is already registered for the URI.
    pub fn add_change_observer(&self, uri: &Uri, observer: O) -> bool {
        let mut inner = self.inner.lock();
        let observers = inner.change_observers.entry(uri.clone()).or_default();
        if observers.contains(&observer) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn remove_change_observer(&self, uri: &Uri, observer: &O) -> bool {
        let mut inner = self.inner.lock();
        let Some(observers) = inner.change_observers.get_mut(uri) else {
            return false;
        };
        let before = observers.len();
        observers.retain(|o| o != observer);
        let removed = observers.len() != before;
        if observers.is_empty() {
            inner.change_observers.remove(uri);
        }
        removed
    }

    pub fn change_observers(&self, uri: &Uri) -> Vec<O> {
        self.inner.lock().change_observers.get(uri).cloned().unwrap_or_default()
    }

    // -- templates ------------------------------------------------------------

    /// Inserts or replaces a template. Stale subscriptions under the same key
    /// become live again.
    pub fn add_template(&self, uri: &Uri, id: &TemplateId, template: Template) -> i32 {
        if !uri.is_well_formed() {
            return result_code::E_URI_INVALID;
        }
        let key = (uri.clone(), id.clone());
        let mut inner = self.inner.lock();
        if inner.templates.insert(key.clone(), template).is_none() && inner.rdb.contains_key(&key) {
            debug!(%uri, subscriber_id = id.subscriber_id, "template re-added, subscriptions revived");
        }
        result_code::OK
    }

    /// Deletes a template. Its subscriptions are kept and turn stale.
    pub fn del_template(&self, uri: &Uri, id: &TemplateId) -> i32 {
        if !uri.is_well_formed() {
            return result_code::E_URI_INVALID;
        }
        let key = (uri.clone(), id.clone());
        let mut inner = self.inner.lock();
        if inner.templates.remove(&key).is_none() {
            return result_code::E_TEMPLATE_NOT_FOUND;
        }
        if inner.rdb.contains_key(&key) {
            warn!(%uri, subscriber_id = id.subscriber_id, "template deleted with live subscriptions");
        }
        result_code::OK
    }

    pub fn template(&self, uri: &Uri, id: &TemplateId) -> Option<Template> {
        self.inner.lock().templates.get(&(uri.clone(), id.clone())).cloned()
    }

    // -- RDB subscriptions ----------------------------------------------------

    pub fn subscribe_rdb(&self, uris: &[Uri], id: &TemplateId, observer: &O) -> Vec<OperationResult> {
        let mut inner = self.inner.lock();
        batch(uris, |uri| {
            let key = (uri.clone(), id.clone());
            if !inner.templates.contains_key(&key) {
                return result_code::E_TEMPLATE_NOT_FOUND;
            }
            subscribe_entry(&mut inner.rdb, key, observer)
        })
    }

    pub fn unsubscribe_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        let mut inner = self.inner.lock();
        batch(uris, |uri| match inner.rdb.remove(&(uri.clone(), id.clone())) {
            Some(_) => result_code::OK,
            None => result_code::E_SUBSCRIBER_NOT_EXIST,
        })
    }

    pub fn enable_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        self.set_rdb_state(uris, id, SubscriptionState::Enabled)
    }

    pub fn disable_rdb(&self, uris: &[Uri], id: &TemplateId) -> Vec<OperationResult> {
        self.set_rdb_state(uris, id, SubscriptionState::Disabled)
    }

    fn set_rdb_state(&self, uris: &[Uri], id: &TemplateId, state: SubscriptionState) -> Vec<OperationResult> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        batch(uris, |uri| {
            let key = (uri.clone(), id.clone());
            let Some(entry) = inner.rdb.get_mut(&key) else {
                return result_code::E_SUBSCRIBER_NOT_EXIST;
            };
            if !inner.templates.contains_key(&key) {
                return result_code::E_TEMPLATE_STALE;
            }
            entry.state = state;
            result_code::OK
        })
    }

    /// Every RDB subscription on the URI, whatever its state.
    pub fn rdb_entries(&self, uri: &Uri) -> Vec<RdbEntryInfo> {
        let inner = self.inner.lock();
        inner
            .rdb
            .iter()
            .filter(|((u, _), _)| u == uri)
            .map(|(key, entry)| RdbEntryInfo {
                template_id: key.1.clone(),
                state: entry.state,
                stale: !inner.templates.contains_key(key),
                observers: entry.observers.len(),
            })
            .collect()
    }

    /// Enabled, non-stale RDB subscriptions on the URI with their templates.
    pub fn rdb_targets(&self, uri: &Uri) -> Vec<RdbTarget<O>> {
        let inner = self.inner.lock();
        let mut targets = Vec::new();
        for (key, entry) in inner.rdb.iter().filter(|((u, _), _)| u == uri) {
            if entry.state == SubscriptionState::Disabled {
                continue;
            }
            let Some(template) = inner.templates.get(key) else {
                warn!(%uri, subscriber_id = key.1.subscriber_id, "skipping stale subscription");
                continue;
            };
            targets.push(RdbTarget {
                template_id: key.1.clone(),
                template: template.clone(),
                observers: entry.observers.clone(),
            });
        }
        targets
    }

    // -- published-data subscriptions -----------------------------------------

    pub fn subscribe_published(&self, uris: &[Uri], subscriber_id: i64, observer: &O) -> Vec<OperationResult> {
        let mut inner = self.inner.lock();
        batch(uris, |uri| subscribe_entry(&mut inner.published, (uri.clone(), subscriber_id), observer))
    }

    pub fn unsubscribe_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        let mut inner = self.inner.lock();
        batch(uris, |uri| match inner.published.remove(&(uri.clone(), subscriber_id)) {
            Some(_) => result_code::OK,
            None => result_code::E_SUBSCRIBER_NOT_EXIST,
        })
    }

    pub fn enable_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        self.set_published_state(uris, subscriber_id, SubscriptionState::Enabled)
    }

    pub fn disable_published(&self, uris: &[Uri], subscriber_id: i64) -> Vec<OperationResult> {
        self.set_published_state(uris, subscriber_id, SubscriptionState::Disabled)
    }

    fn set_published_state(&self, uris: &[Uri], subscriber_id: i64, state: SubscriptionState) -> Vec<OperationResult> {
        let mut inner = self.inner.lock();
        batch(uris, |uri| match inner.published.get_mut(&(uri.clone(), subscriber_id)) {
            Some(entry) => {
                entry.state = state;
                result_code::OK
            }
            None => result_code::E_SUBSCRIBER_NOT_EXIST,
        })
    }

    pub fn published_entries(&self, uri: &Uri) -> Vec<PublishedEntryInfo> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|((u, _), _)| u == uri)
            .map(|((_, subscriber_id), entry)| PublishedEntryInfo {
                subscriber_id: *subscriber_id,
                state: entry.state,
                observers: entry.observers.len(),
            })
            .collect()
    }

    /// Enabled published-data subscriptions on the URI.
    pub fn published_targets(&self, uri: &Uri) -> Vec<PublishedTarget<O>> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|((u, _), entry)| u == uri && entry.state == SubscriptionState::Enabled)
            .map(|((_, subscriber_id), entry)| PublishedTarget {
                subscriber_id: *subscriber_id,
                observers: entry.observers.clone(),
            })
            .collect()
    }

    // -- housekeeping ---------------------------------------------------------

    /// Drops an observer from every change and subscription set, e.g. after
    /// its host went away. Single-slot listeners are left to their owner.
    /// Returns how many registrations were removed.
    pub fn remove_observer(&self, observer: &O) -> usize {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        inner.change_observers.retain(|_, observers| {
            removed += remove_from(observers, observer);
            !observers.is_empty()
        });
        inner.rdb.retain(|_, entry| {
            removed += remove_from(&mut entry.observers, observer);
            !entry.observers.is_empty()
        });
        inner.published.retain(|_, entry| {
            removed += remove_from(&mut entry.observers, observer);
            !entry.observers.is_empty()
        });
        removed
    }
}

fn remove_from<O: PartialEq>(observers: &mut Vec<O>, observer: &O) -> usize {
    let before = observers.len();
    observers.retain(|o| o != observer);
    before - observers.len()
}

/// Runs `op` for every well-formed URI; malformed ones get `E_URI_INVALID`.
fn batch(uris: &[Uri], mut op: impl FnMut(&Uri) -> i32) -> Vec<OperationResult> {
    uris.iter()
        .map(|uri| {
            let code = if uri.is_well_formed() { op(uri) } else { result_code::E_URI_INVALID };
            OperationResult::new(uri.as_str(), code)
        })
        .collect()
}

fn subscribe_entry<K: Ord, O: Clone + PartialEq>(entries: &mut BTreeMap<K, Entry<O>>, key: K, observer: &O) -> i32 {
    match entries.get_mut(&key) {
        Some(entry) if entry.observers.contains(observer) => result_code::E_DUPLICATE,
        Some(entry) => {
            entry.observers.push(observer.clone());
            result_code::OK
        }
        None => {
            entries.insert(key, Entry::new(observer.clone()));
            result_code::OK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PredicateTemplateNode;

    fn uri(s: &str) -> Uri {
        Uri::from(s)
    }

    fn template() -> Template {
        Template::new(vec![PredicateTemplateNode::new("all", "select * from t")], "")
    }

    fn registry_with_template(uris: &[&str], id: &TemplateId) -> SubscriptionRegistry<&'static str> {
        let registry = SubscriptionRegistry::new();
        for u in uris {
            assert_eq!(registry.add_template(&uri(u), id, template()), result_code::OK);
        }
        registry
    }

    fn codes(results: &[OperationResult]) -> Vec<i32> {
        results.iter().map(|r| r.code).collect()
    }

    #[test]
    fn test_listener_replace_returns_previous() {
        let registry = SubscriptionRegistry::new();
        let u = uri("datashare:///a");

        assert_eq!(registry.register_listener(&u, "l1"), None);
        assert_eq!(registry.register_listener(&u, "l2"), Some("l1"));
        assert_eq!(registry.listener(&u), Some("l2"));
        assert_eq!(registry.unregister_listener(&u), Some("l2"));
        assert_eq!(registry.listener(&u), None);
    }

    #[test]
    fn test_change_observers() {
        let registry = SubscriptionRegistry::new();
        let u = uri("datashare:///a");

        assert!(registry.add_change_observer(&u, "o1"));
        assert!(!registry.add_change_observer(&u, "o1"));
        assert!(registry.add_change_observer(&u, "o2"));
        assert_eq!(registry.change_observers(&u), vec!["o1", "o2"]);

        assert!(registry.remove_change_observer(&u, &"o1"));
        assert!(!registry.remove_change_observer(&u, &"o1"));
        assert_eq!(registry.change_observers(&u), vec!["o2"]);
    }

    #[test]
    fn test_batch_independence() {
        let id = TemplateId::new(1, "bundle");
        let registry = registry_with_template(&["datashare:///a"], &id);

        let results = registry.subscribe_rdb(&[uri("datashare:///a"), uri("not a uri")], &id, &"obs");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], OperationResult::ok("datashare:///a"));
        assert_eq!(results[1], OperationResult::new("not a uri", result_code::E_URI_INVALID));
        assert_eq!(registry.rdb_entries(&uri("datashare:///a")).len(), 1);
    }

    #[test]
    fn test_subscribe_rdb_codes() {
        let id = TemplateId::new(1, "bundle");
        let registry = registry_with_template(&["datashare:///a"], &id);
        let uris = [uri("datashare:///a"), uri("datashare:///no-template")];

        let first = registry.subscribe_rdb(&uris, &id, &"obs");
        assert_eq!(codes(&first), vec![result_code::OK, result_code::E_TEMPLATE_NOT_FOUND]);

        let again = registry.subscribe_rdb(&uris[..1], &id, &"obs");
        assert_eq!(codes(&again), vec![result_code::E_DUPLICATE]);

        let other = registry.subscribe_rdb(&uris[..1], &id, &"other");
        assert_eq!(codes(&other), vec![result_code::OK]);
        assert_eq!(registry.rdb_entries(&uris[0])[0].observers, 2);
    }

    #[test]
    fn test_enable_disable_keeps_entry() {
        let id = TemplateId::new(1, "bundle");
        let u = uri("datashare:///a");
        let registry = registry_with_template(&["datashare:///a"], &id);
        registry.subscribe_rdb(&[u.clone()], &id, &"obs");

        assert_eq!(codes(&registry.disable_rdb(&[u.clone()], &id)), vec![result_code::OK]);
        assert!(registry.rdb_targets(&u).is_empty());
        let entries = registry.rdb_entries(&u);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, SubscriptionState::Disabled);

        assert_eq!(codes(&registry.enable_rdb(&[u.clone()], &id)), vec![result_code::OK]);
        let targets = registry.rdb_targets(&u);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].observers, vec!["obs"]);
    }

    #[test]
    fn test_missing_subscription_codes() {
        let id = TemplateId::new(1, "bundle");
        let registry: SubscriptionRegistry<&str> = SubscriptionRegistry::new();
        let u = [uri("datashare:///a")];

        assert_eq!(codes(&registry.enable_rdb(&u, &id)), vec![result_code::E_SUBSCRIBER_NOT_EXIST]);
        assert_eq!(codes(&registry.disable_rdb(&u, &id)), vec![result_code::E_SUBSCRIBER_NOT_EXIST]);
        assert_eq!(codes(&registry.unsubscribe_rdb(&u, &id)), vec![result_code::E_SUBSCRIBER_NOT_EXIST]);
        assert_eq!(codes(&registry.unsubscribe_published(&u, 3)), vec![result_code::E_SUBSCRIBER_NOT_EXIST]);
    }

    #[test]
    fn test_stale_template_policy() {
        let id = TemplateId::new(1, "bundle");
        let u = uri("datashare:///a");
        let registry = registry_with_template(&["datashare:///a"], &id);
        registry.subscribe_rdb(&[u.clone()], &id, &"obs");

        assert_eq!(registry.del_template(&u, &id), result_code::OK);
        assert_eq!(registry.del_template(&u, &id), result_code::E_TEMPLATE_NOT_FOUND);

        // kept, but stale: not notified, cannot be toggled
        let entries = registry.rdb_entries(&u);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].stale);
        assert!(registry.rdb_targets(&u).is_empty());
        assert_eq!(codes(&registry.enable_rdb(&[u.clone()], &id)), vec![result_code::E_TEMPLATE_STALE]);
        assert_eq!(codes(&registry.disable_rdb(&[u.clone()], &id)), vec![result_code::E_TEMPLATE_STALE]);

        // re-adding revives
        registry.add_template(&u, &id, template());
        assert!(!registry.rdb_entries(&u)[0].stale);
        assert_eq!(registry.rdb_targets(&u).len(), 1);

        // unsubscribe succeeds on a stale entry
        registry.del_template(&u, &id);
        assert_eq!(codes(&registry.unsubscribe_rdb(&[u.clone()], &id)), vec![result_code::OK]);
        assert!(registry.rdb_entries(&u).is_empty());
    }

    #[test]
    fn test_published_subscriptions() {
        let registry = SubscriptionRegistry::new();
        let uris = [uri("weather"), uri("datashareproxy://bundle/weather")];

        let results = registry.subscribe_published(&uris, 7, &"obs");
        assert_eq!(codes(&results), vec![result_code::E_URI_INVALID, result_code::OK]);

        let u = &uris[1];
        assert_eq!(registry.published_targets(u).len(), 1);
        registry.disable_published(&[u.clone()], 7);
        assert!(registry.published_targets(u).is_empty());
        assert_eq!(registry.published_entries(u)[0].state, SubscriptionState::Disabled);
        registry.enable_published(&[u.clone()], 7);
        assert_eq!(registry.published_targets(u)[0].subscriber_id, 7);

        assert_eq!(codes(&registry.unsubscribe_published(&[u.clone()], 7)), vec![result_code::OK]);
        assert!(registry.published_entries(u).is_empty());
    }

    #[test]
    fn test_remove_observer_everywhere() {
        let id = TemplateId::new(1, "bundle");
        let u = uri("datashare:///a");
        let registry = registry_with_template(&["datashare:///a"], &id);
        registry.add_change_observer(&u, "gone");
        registry.subscribe_rdb(&[u.clone()], &id, &"gone");
        registry.subscribe_rdb(&[u.clone()], &id, &"kept");
        registry.subscribe_published(&[u.clone()], 1, &"gone");

        assert_eq!(registry.remove_observer(&"gone"), 3);
        assert!(registry.change_observers(&u).is_empty());
        assert_eq!(registry.rdb_targets(&u)[0].observers, vec!["kept"]);
        assert!(registry.published_entries(&u).is_empty());
    }

    #[test]
    fn test_concurrent_subscribers() {
        use std::sync::Arc;

        let id = TemplateId::new(1, "bundle");
        let u = uri("datashare:///a");
        let registry: Arc<SubscriptionRegistry<u64>> = Arc::new(SubscriptionRegistry::new());
        registry.add_template(&u, &id, template());

        let handles: Vec<_> = (0..8u64)
            .map(|n| {
                let registry = registry.clone();
                let u = u.clone();
                let id = id.clone();
                std::thread::spawn(move || registry.subscribe_rdb(&[u], &id, &n))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap()[0].is_ok());
        }
        assert_eq!(registry.rdb_entries(&u)[0].observers, 8);
    }
}
