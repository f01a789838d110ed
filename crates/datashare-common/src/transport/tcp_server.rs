use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::protocol::command::status;
use crate::protocol::error::{DataShareError, Result};
use crate::protocol::parcel::ParcelReader;
use crate::transport::codec::{FrameCodec, ReplyFrame};
use crate::transport::remote::RequestHandler;
use crate::transport::tcp::TcpTransportAsync;

/// Async TCP server dispatching frames to a [`RequestHandler`].
///
/// One task per connection; each connection serves requests in order until
/// the peer closes it. Handlers run on tokio's blocking pool.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    pub async fn bind(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| DataShareError::Transport(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| DataShareError::Transport(format!("Failed to get local addr: {}", e)))
    }

    /// Serves until the process exits.
    pub async fn run<H: RequestHandler + ?Sized>(self, handler: Arc<H>) -> Result<()> {
        self.run_until(handler, std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then closes every open connection.
    pub async fn run_until<H, F>(self, handler: Arc<H>, shutdown: F) -> Result<()>
    where
        H: RequestHandler + ?Sized,
        F: Future<Output = ()>,
    {
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(connections = connections.len(), "server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };
                    debug!(%peer_addr, "connection established");
                    stream.set_nodelay(true).ok();

                    let handler = handler.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, handler).await {
                            debug!(%peer_addr, error = %e, "connection closed with error");
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.shutdown().await;
        Ok(())
    }
}

/// Serves one connection until the peer closes it.
async fn handle_connection<H: RequestHandler + ?Sized>(mut stream: TcpStream, handler: Arc<H>) -> Result<()> {
    while let Some(body) = TcpTransportAsync::receive_message(&mut stream).await? {
        let reply = match FrameCodec::decode_request(&body) {
            Ok(frame) => dispatch(handler.clone(), frame.code, frame.payload).await,
            Err(e) => {
                warn!(error = %e, "undecodable request frame");
                ReplyFrame::error(status::ERR_INVALID_DATA)
            }
        };

        let encoded = match FrameCodec::encode_reply(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(size = reply.payload.len(), error = %e, "reply exceeds frame limit");
                FrameCodec::encode_reply(&ReplyFrame::error(status::ERR_REPLY_TOO_LARGE))?
            }
        };
        TcpTransportAsync::send_message(&mut stream, &encoded).await?;
    }
    debug!("connection closed by peer");
    Ok(())
}

async fn dispatch<H: RequestHandler + ?Sized>(handler: Arc<H>, code: u32, payload: Bytes) -> ReplyFrame {
    let joined = tokio::task::spawn_blocking(move || {
        let mut reader = ParcelReader::new(&payload);
        handler.on_remote_request(code, &mut reader)
    })
    .await;

    match joined {
        Ok(Ok(reply)) => ReplyFrame::ok(reply.freeze()),
        Ok(Err(e)) => {
            let status = status_for(&e);
            warn!(code, status, error = %e, "request failed");
            ReplyFrame::error(status)
        }
        Err(e) => {
            error!(code, error = %e, "request handler panicked");
            ReplyFrame::error(status::ERR_INTERNAL)
        }
    }
}

/// Reply status for a handler error.
pub fn status_for(err: &DataShareError) -> i32 {
    match err {
        DataShareError::UnknownCommand(_) => status::ERR_UNKNOWN_COMMAND,
        DataShareError::CorruptEncoding(_) | DataShareError::Parameter(_) => status::ERR_INVALID_DATA,
        _ => status::ERR_INTERNAL,
    }
}
