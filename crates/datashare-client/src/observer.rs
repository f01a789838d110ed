use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use datashare_common::protocol::{
    DataShareError, ObserverCommand, ObserverRef, Parcel, ParcelReader, PublishedDataChangeNode, RdbChangeNode,
    Result, TemplateId, Uri, OBSERVER_TOKEN,
};
use datashare_common::registry::SubscriptionRegistry;
use datashare_common::transport::{RequestHandler, TcpServer};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Receives plain change notifications for a URI.
pub trait DataObserver: Send + Sync {
    fn on_change(&self, uri: &Uri);
}

/// Receives template query results when subscribed RDB data changes.
pub trait RdbObserver: Send + Sync {
    fn on_rdb_change(&self, node: &RdbChangeNode);
}

/// Receives published data changes.
pub trait PublishedObserver: Send + Sync {
    fn on_published_change(&self, node: &PublishedDataChangeNode);
}

impl<F: Fn(&Uri) + Send + Sync> DataObserver for F {
    fn on_change(&self, uri: &Uri) {
        self(uri)
    }
}

impl<F: Fn(&RdbChangeNode) + Send + Sync> RdbObserver for F {
    fn on_rdb_change(&self, node: &RdbChangeNode) {
        self(node)
    }
}

impl<F: Fn(&PublishedDataChangeNode) + Send + Sync> PublishedObserver for F {
    fn on_published_change(&self, node: &PublishedDataChangeNode) {
        self(node)
    }
}

/// The occupant of a URI's single listener slot.
#[derive(Clone)]
pub struct ListenerEntry {
    pub id: u64,
    pub observer: Arc<dyn DataObserver>,
}

impl PartialEq for ListenerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// A subscription as the provider keys it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    Rdb(Uri, TemplateId),
    Published(Uri, i64),
}

#[derive(Clone)]
enum Subscriber {
    Rdb(Arc<dyn RdbObserver>),
    Published(Arc<dyn PublishedObserver>),
}

/// One subscribe call's callback and the keys the provider accepted for it.
struct Binding {
    subscriber: Subscriber,
    keys: HashSet<SubscriptionKey>,
}

#[derive(Default)]
struct Subscribers {
    by_id: HashMap<u64, Binding>,
    by_key: HashMap<SubscriptionKey, Vec<u64>>,
}

/// Local state behind the host's endpoint.
struct HostState {
    endpoint: String,
    next_id: AtomicU64,
    listeners: Arc<SubscriptionRegistry<ListenerEntry>>,
    subscribers: Mutex<Subscribers>,
}

impl HostState {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn on_change(&self, id: u64, uri: &Uri) {
        // resolved at delivery time; a replaced listener no longer matches
        match self.listeners.listener(uri) {
            Some(entry) if entry.id == id => entry.observer.on_change(uri),
            _ => debug!(%uri, id, "change for released listener dropped"),
        }
    }

    fn subscriber(&self, id: u64) -> Option<Subscriber> {
        self.subscribers.lock().by_id.get(&id).map(|binding| binding.subscriber.clone())
    }
}

impl RequestHandler for HostState {
    fn on_remote_request(&self, code: u32, data: &mut ParcelReader<'_>) -> Result<Parcel> {
        data.expect_interface_token(OBSERVER_TOKEN)?;
        let command = ObserverCommand::from_code(code).ok_or(DataShareError::UnknownCommand(code))?;
        let id = data.read_u64()?;

        match command {
            ObserverCommand::OnChange => {
                let uri: Uri = data.read()?;
                self.on_change(id, &uri);
            }
            ObserverCommand::OnRdbChange => {
                let node: RdbChangeNode = data.read()?;
                match self.subscriber(id) {
                    Some(Subscriber::Rdb(observer)) => observer.on_rdb_change(&node),
                    _ => debug!(id, uri = %node.uri, "rdb change for unknown subscriber dropped"),
                }
            }
            ObserverCommand::OnPublishedChange => {
                let node: PublishedDataChangeNode = data.read()?;
                match self.subscriber(id) {
                    Some(Subscriber::Published(observer)) => observer.on_published_change(&node),
                    _ => debug!(id, bundle = %node.bundle_name, "published change for unknown subscriber dropped"),
                }
            }
        }
        Ok(Parcel::new())
    }
}

/// Callback endpoint a provider pushes notifications to.
///
/// Runs a [`TcpServer`] on a background task for as long as the host lives.
/// Each observer registered here gets a host-local id; `(endpoint, id)` is
/// the [`ObserverRef`] handed to the provider.
pub struct ObserverHost {
    state: Arc<HostState>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl ObserverHost {
    /// Binds the callback server and starts serving. Must be called inside a
    /// tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `bind_addr` - Address to listen on; port 0 picks a free one
    /// * `listeners` - Single-slot listener registry shared with the helper
    ///
    /// # Errors
    ///
    /// `Transport` if the address cannot be bound.
    pub async fn start(bind_addr: &str, listeners: Arc<SubscriptionRegistry<ListenerEntry>>) -> Result<Self> {
        let server = TcpServer::bind(bind_addr).await?;
        let endpoint = server.local_addr()?.to_string();
        info!(%endpoint, "observer host listening");

        let state = Arc::new(HostState {
            endpoint,
            next_id: AtomicU64::new(1),
            listeners,
            subscribers: Mutex::new(Subscribers::default()),
        });

        let (tx, rx) = oneshot::channel::<()>();
        let handler = state.clone();
        tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = server.run_until(handler, shutdown).await {
                warn!(error = %e, "observer host stopped");
            }
        });

        Ok(Self { state, shutdown: Mutex::new(Some(tx)) })
    }

    pub fn endpoint(&self) -> &str {
        &self.state.endpoint
    }

    pub fn observer_ref(&self, id: u64) -> ObserverRef {
        ObserverRef::new(self.state.endpoint.clone(), id)
    }

    /// Allocates an id for a single-slot listener.
    pub fn listener_entry(&self, observer: Arc<dyn DataObserver>) -> ListenerEntry {
        ListenerEntry { id: self.state.next_id(), observer }
    }

    /// Binds an RDB callback under a fresh id.
    ///
    /// The binding receives pushes right away, so snapshots sent while the
    /// subscribe call is in flight are not lost. It holds no keys until
    /// [`confirm`](Self::confirm) records the ones the provider accepted.
    pub fn bind_rdb(&self, observer: Arc<dyn RdbObserver>) -> ObserverRef {
        self.bind(Subscriber::Rdb(observer))
    }

    /// Binds a published-data callback under a fresh id. See [`bind_rdb`](Self::bind_rdb).
    pub fn bind_published(&self, observer: Arc<dyn PublishedObserver>) -> ObserverRef {
        self.bind(Subscriber::Published(observer))
    }

    fn bind(&self, subscriber: Subscriber) -> ObserverRef {
        let id = self.state.next_id();
        let binding = Binding { subscriber, keys: HashSet::new() };
        self.state.subscribers.lock().by_id.insert(id, binding);
        self.observer_ref(id)
    }

    /// Records the keys the provider accepted for binding `id`.
    ///
    /// # Arguments
    ///
    /// * `id` - Host id returned by [`bind_rdb`](Self::bind_rdb) or [`bind_published`](Self::bind_published)
    /// * `keys` - Keys whose subscription succeeded; empty when the call failed
    ///
    /// A binding confirmed with no keys is dropped.
    pub fn confirm(&self, id: u64, keys: Vec<SubscriptionKey>) {
        let mut guard = self.state.subscribers.lock();
        let subscribers = &mut *guard;
        if keys.is_empty() {
            if subscribers.by_id.remove(&id).is_some() {
                debug!(id, "subscription rejected, binding dropped");
            }
            return;
        }
        let Some(binding) = subscribers.by_id.get_mut(&id) else {
            return;
        };
        for key in keys {
            if binding.keys.insert(key.clone()) {
                subscribers.by_key.entry(key).or_default().push(id);
            }
        }
    }

    /// Forgets every binding held under `keys` once the provider removed them.
    ///
    /// # Returns
    ///
    /// The number of bindings released because they were left without keys.
    pub fn release(&self, keys: &[SubscriptionKey]) -> usize {
        let mut guard = self.state.subscribers.lock();
        let subscribers = &mut *guard;
        let mut released = 0;
        for key in keys {
            for id in subscribers.by_key.remove(key).unwrap_or_default() {
                let Some(binding) = subscribers.by_id.get_mut(&id) else {
                    continue;
                };
                binding.keys.remove(key);
                if binding.keys.is_empty() {
                    subscribers.by_id.remove(&id);
                    released += 1;
                }
            }
        }
        if released > 0 {
            debug!(released, "subscriber bindings released");
        }
        released
    }

    /// Number of live subscriber bindings.
    pub fn subscriber_count(&self) -> usize {
        self.state.subscribers.lock().by_id.len()
    }

    /// Stops serving and closes open callback connections.
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ObserverHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datashare_common::protocol::{PublishedDataItem, PublishedValue};
    use std::sync::atomic::AtomicUsize;

    fn state() -> HostState {
        HostState {
            endpoint: "127.0.0.1:1".into(),
            next_id: AtomicU64::new(1),
            listeners: Arc::new(SubscriptionRegistry::new()),
            subscribers: Mutex::new(Subscribers::default()),
        }
    }

    fn request(command: ObserverCommand, id: u64, write: impl FnOnce(&mut Parcel)) -> (u32, Parcel) {
        let mut parcel = Parcel::with_interface_token(OBSERVER_TOKEN).unwrap();
        parcel.write_u64(id);
        write(&mut parcel);
        (command.code(), parcel)
    }

    #[test]
    fn test_on_change_reaches_only_current_listener() {
        let state = state();
        let uri = Uri::from("datashare:///a");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let entry = ListenerEntry {
            id: 5,
            observer: Arc::new(move |_: &Uri| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        };
        state.listeners.register_listener(&uri, entry);

        for id in [5, 4] {
            let (code, parcel) = request(ObserverCommand::OnChange, id, |p| p.write(&uri).unwrap());
            state.on_remote_request(code, &mut parcel.reader()).unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_published_callback_dispatch() {
        let state = state();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        state.subscribers.lock().by_id.insert(
            9,
            Binding {
                subscriber: Subscriber::Published(Arc::new(move |node: &PublishedDataChangeNode| {
                    s.lock().push(node.bundle_name.clone());
                })),
                keys: HashSet::new(),
            },
        );

        let node = PublishedDataChangeNode {
            bundle_name: "com.example".into(),
            items: vec![PublishedDataItem::new("k", 1, PublishedValue::String("v".into()))],
        };
        let (code, parcel) = request(ObserverCommand::OnPublishedChange, 9, |p| p.write(&node).unwrap());
        state.on_remote_request(code, &mut parcel.reader()).unwrap();

        assert_eq!(*seen.lock(), vec!["com.example".to_string()]);
    }

    #[test]
    fn test_bad_token_and_unknown_command_rejected() {
        let state = state();
        let mut parcel = Parcel::with_interface_token("someone.else").unwrap();
        parcel.write_u64(1);
        assert!(state.on_remote_request(1, &mut parcel.reader()).is_err());

        let parcel = Parcel::with_interface_token(OBSERVER_TOKEN).unwrap();
        let err = state.on_remote_request(42, &mut parcel.reader()).unwrap_err();
        assert!(matches!(err, DataShareError::UnknownCommand(42)));
    }

    fn rdb_key(uri: &str) -> SubscriptionKey {
        SubscriptionKey::Rdb(Uri::from(uri), TemplateId::new(1, "b"))
    }

    #[tokio::test]
    async fn test_every_bind_gets_its_own_id() {
        let host = ObserverHost::start("127.0.0.1:0", Arc::new(SubscriptionRegistry::new())).await.unwrap();

        let first = host.bind_rdb(Arc::new(|_: &RdbChangeNode| {}));
        let second = host.bind_rdb(Arc::new(|_: &RdbChangeNode| {}));
        let published = host.bind_published(Arc::new(|_: &PublishedDataChangeNode| {}));
        assert_ne!(first.id, second.id);
        assert_ne!(published.id, second.id);
        assert_eq!(published.endpoint, host.endpoint());
        assert_eq!(host.subscriber_count(), 3);
    }

    #[tokio::test]
    async fn test_confirm_without_keys_drops_binding() {
        let host = ObserverHost::start("127.0.0.1:0", Arc::new(SubscriptionRegistry::new())).await.unwrap();

        let kept = host.bind_rdb(Arc::new(|_: &RdbChangeNode| {}));
        host.confirm(kept.id, vec![rdb_key("datashare:///a")]);
        let rejected = host.bind_rdb(Arc::new(|_: &RdbChangeNode| {}));
        host.confirm(rejected.id, Vec::new());

        assert_eq!(host.subscriber_count(), 1);
        assert!(host.state.subscriber(kept.id).is_some());
        assert!(host.state.subscriber(rejected.id).is_none());
    }

    #[tokio::test]
    async fn test_release_drops_bindings_left_without_keys() {
        let host = ObserverHost::start("127.0.0.1:0", Arc::new(SubscriptionRegistry::new())).await.unwrap();
        let (a, b) = (rdb_key("datashare:///a"), rdb_key("datashare:///b"));

        let both = host.bind_rdb(Arc::new(|_: &RdbChangeNode| {}));
        host.confirm(both.id, vec![a.clone(), b.clone()]);
        let only_a = host.bind_rdb(Arc::new(|_: &RdbChangeNode| {}));
        host.confirm(only_a.id, vec![a.clone()]);

        assert_eq!(host.release(&[a.clone()]), 1);
        assert_eq!(host.subscriber_count(), 1);
        assert!(host.state.subscriber(both.id).is_some());

        // already gone
        assert_eq!(host.release(&[a]), 0);
        assert_eq!(host.release(&[b]), 1);
        assert_eq!(host.subscriber_count(), 0);
    }
}
