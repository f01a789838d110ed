use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use datashare_common::protocol::Result;
use datashare_common::transport::TcpServer;
use tracing::info;

use crate::notifier::RemoteNotifier;
use crate::provider::InMemoryProvider;
use crate::service::DataShareService;
use crate::stub::DataShareStub;

/// Provider server configuration.
///
/// # Default Configuration
///
/// - `bind_addr`: `"127.0.0.1:7600"`
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the provider listens on
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "127.0.0.1:7600".to_string() }
    }
}

/// Serves a [`DataShareService`] over TCP.
///
/// # Example
///
/// ```no_run
/// use datashare_server::{ProviderServer, ServerConfig};
///
/// # async fn serve() -> datashare_common::Result<()> {
/// let server = ProviderServer::in_memory(&ServerConfig::default()).await?;
/// println!("listening on {}", server.local_addr()?);
/// server.run().await
/// # }
/// ```
pub struct ProviderServer<S: DataShareService + ?Sized> {
    server: TcpServer,
    stub: Arc<DataShareStub<S>>,
}

impl ProviderServer<InMemoryProvider> {
    /// Binds an [`InMemoryProvider`] that pushes notifications over TCP.
    pub async fn in_memory(config: &ServerConfig) -> Result<Self> {
        let provider = Arc::new(InMemoryProvider::new(Arc::new(RemoteNotifier::new())));
        Self::bind(config, provider).await
    }
}

impl<S: DataShareService + ?Sized> ProviderServer<S> {
    pub async fn bind(config: &ServerConfig, service: Arc<S>) -> Result<Self> {
        let server = TcpServer::bind(&config.bind_addr).await?;
        info!(addr = %server.local_addr()?, "provider bound");
        Ok(Self { server, stub: Arc::new(DataShareStub::new(service)) })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn service(&self) -> &Arc<S> {
        self.stub.service()
    }

    /// Serves until the process exits.
    pub async fn run(self) -> Result<()> {
        self.server.run(self.stub).await
    }

    /// Serves until `shutdown` resolves.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        self.server.run_until(self.stub, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datashare_common::protocol::{
        DataShareCommand, Parcel, Uri, ValuesBucket, DATA_SHARE_ERROR, INTERFACE_TOKEN,
    };
    use datashare_common::transport::{RemoteObject, TcpRemote};
    use tokio::sync::oneshot;

    #[test]
    fn test_default_config() {
        assert_eq!(ServerConfig::default().bind_addr, "127.0.0.1:7600");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serves_requests_until_shutdown() {
        let config = ServerConfig { bind_addr: "127.0.0.1:0".into() };
        let server = ProviderServer::in_memory(&config).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let provider = server.service().clone();

        let (tx, rx) = oneshot::channel::<()>();
        let serving = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        let uri = Uri::from("datashare:///com.example/notes");
        let row_id = tokio::task::spawn_blocking({
            let uri = uri.clone();
            move || {
                let remote = TcpRemote::connect(&addr).unwrap();
                let mut data = Parcel::with_interface_token(INTERFACE_TOKEN).unwrap();
                datashare_common::marshal!(data, uri, ValuesBucket::new().with("text", "hi")).unwrap();
                let reply = remote.send_request(DataShareCommand::Insert.code(), &data).unwrap();
                reply.reader().read_i32().unwrap_or(DATA_SHARE_ERROR)
            }
        })
        .await
        .unwrap();

        assert_eq!(row_id, 1);
        assert_eq!(provider.row_count(&uri), 1);

        tx.send(()).unwrap();
        serving.await.unwrap().unwrap();
    }
}
