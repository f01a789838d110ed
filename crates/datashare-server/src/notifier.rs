use std::collections::HashMap;
use std::sync::Arc;

use datashare_common::protocol::{
    Marshal, ObserverCommand, ObserverRef, Parcel, PublishedDataChangeNode, RdbChangeNode, Result, Uri,
    OBSERVER_TOKEN,
};
use datashare_common::transport::{RemoteObject, TcpRemote};
use parking_lot::Mutex;
use tracing::debug;

/// Delivers notifications to observers. Calls block until the observer
/// has acknowledged.
pub trait Notifier: Send + Sync {
    fn on_change(&self, observer: &ObserverRef, uri: &Uri) -> Result<()>;

    fn on_rdb_change(&self, observer: &ObserverRef, node: &RdbChangeNode) -> Result<()>;

    fn on_published_change(&self, observer: &ObserverRef, node: &PublishedDataChangeNode) -> Result<()>;
}

/// Pushes notifications to observer hosts over TCP, keeping one connection
/// per endpoint.
#[derive(Default)]
pub struct RemoteNotifier {
    remotes: Mutex<HashMap<String, Arc<TcpRemote>>>,
}

impl RemoteNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn remote(&self, endpoint: &str) -> Result<Arc<TcpRemote>> {
        if let Some(remote) = self.remotes.lock().get(endpoint) {
            if remote.is_alive() {
                return Ok(remote.clone());
            }
        }
        // connect outside the lock; a racing connect just replaces the entry
        let remote = TcpRemote::connect(endpoint)?;
        self.remotes.lock().insert(endpoint.to_string(), remote.clone());
        Ok(remote)
    }

    fn push<T: Marshal + ?Sized>(&self, command: ObserverCommand, observer: &ObserverRef, payload: &T) -> Result<()> {
        let mut data = Parcel::with_interface_token(OBSERVER_TOKEN)?;
        data.write_u64(observer.id);
        data.write(payload)?;

        let remote = self.remote(&observer.endpoint)?;
        debug!(%command, %observer, "pushing notification");
        match remote.send_request(command.code(), &data) {
            Ok(_) => Ok(()),
            Err(e) => {
                if !remote.is_alive() {
                    self.remotes.lock().remove(&observer.endpoint);
                }
                Err(e)
            }
        }
    }

    /// Number of cached observer-host connections.
    pub fn connections(&self) -> usize {
        self.remotes.lock().len()
    }
}

impl Notifier for RemoteNotifier {
    fn on_change(&self, observer: &ObserverRef, uri: &Uri) -> Result<()> {
        self.push(ObserverCommand::OnChange, observer, uri)
    }

    fn on_rdb_change(&self, observer: &ObserverRef, node: &RdbChangeNode) -> Result<()> {
        self.push(ObserverCommand::OnRdbChange, observer, node)
    }

    fn on_published_change(&self, observer: &ObserverRef, node: &PublishedDataChangeNode) -> Result<()> {
        self.push(ObserverCommand::OnPublishedChange, observer, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datashare_common::protocol::{DataShareError, ParcelReader, TemplateId};
    use datashare_common::transport::{RequestHandler, TcpServer};
    use tokio::sync::oneshot;

    /// Decodes every push and records `(command, id, uri-or-bundle)`.
    #[derive(Default)]
    struct Sink {
        seen: Mutex<Vec<(u32, u64, String)>>,
    }

    impl RequestHandler for Sink {
        fn on_remote_request(&self, code: u32, data: &mut ParcelReader<'_>) -> Result<Parcel> {
            data.expect_interface_token(OBSERVER_TOKEN)?;
            let id = data.read_u64()?;
            let what = match ObserverCommand::from_code(code).ok_or(DataShareError::UnknownCommand(code))? {
                ObserverCommand::OnChange => data.read::<Uri>()?.into_string(),
                ObserverCommand::OnRdbChange => data.read::<RdbChangeNode>()?.uri,
                ObserverCommand::OnPublishedChange => data.read::<PublishedDataChangeNode>()?.bundle_name,
            };
            self.seen.lock().push((code, id, what));
            Ok(Parcel::new())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pushes_reach_observer_host() {
        let server = TcpServer::bind("127.0.0.1:0").await.unwrap();
        let endpoint = server.local_addr().unwrap().to_string();
        let sink = Arc::new(Sink::default());
        let (tx, rx) = oneshot::channel::<()>();
        let handler = sink.clone();
        tokio::spawn(async move {
            server
                .run_until(handler, async {
                    let _ = rx.await;
                })
                .await
        });

        let notifier = Arc::new(RemoteNotifier::new());
        let n = notifier.clone();
        let observer = ObserverRef::new(endpoint, 11);
        tokio::task::spawn_blocking(move || {
            n.on_change(&observer, &Uri::from("datashare:///a")).unwrap();
            let node = RdbChangeNode {
                uri: "datashare:///b".into(),
                template_id: TemplateId::new(1, "com.example"),
                data: vec!["{}".into()],
            };
            n.on_rdb_change(&observer, &node).unwrap();
        })
        .await
        .unwrap();

        assert_eq!(notifier.connections(), 1);
        assert_eq!(
            *sink.seen.lock(),
            vec![(1, 11, "datashare:///a".to_string()), (2, 11, "datashare:///b".to_string())]
        );
        let _ = tx.send(());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_observer_is_transport_error() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = tokio::task::spawn_blocking(move || {
            RemoteNotifier::new().on_change(&ObserverRef::new(endpoint, 1), &Uri::from("datashare:///a"))
        })
        .await
        .unwrap()
        .unwrap_err();
        assert!(err.is_transport());
    }
}
