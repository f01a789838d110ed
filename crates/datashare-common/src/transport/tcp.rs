use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::protocol::error::{DataShareError, Result};
use crate::protocol::parcel::Parcel;
use crate::transport::codec::{FrameCodec, ReplyFrame};
use crate::transport::remote::{DeathRecipient, RemoteObject};

/// Default timeout for TCP operations (5 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Synchronous TCP transport.
///
/// Used from blocking workers: the proxy's execute phase and the provider's
/// observer pushes.
///
/// # Wire Protocol
///
/// ```text
/// [4-byte length, u32 big-endian] [frame body]
/// ```
///
/// See [`FrameCodec`] for the body layout.
pub struct TcpTransport;

impl TcpTransport {
    /// Connects to a remote endpoint, trying each resolved address in turn.
    ///
    /// The returned stream has 5 second read and write timeouts.
    pub fn connect(addr: &str) -> Result<TcpStream> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| DataShareError::Transport(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect_timeout(&socket_addr, DEFAULT_TIMEOUT) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(DEFAULT_TIMEOUT))
                        .map_err(|e| DataShareError::Transport(format!("Failed to set read timeout: {}", e)))?;
                    stream
                        .set_write_timeout(Some(DEFAULT_TIMEOUT))
                        .map_err(|e| DataShareError::Transport(format!("Failed to set write timeout: {}", e)))?;
                    stream.set_nodelay(true).ok();
                    return Ok(stream);
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }

        Err(DataShareError::Transport(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    /// Sends one request frame and blocks for its reply frame.
    pub fn call(stream: &mut TcpStream, code: u32, payload: &[u8]) -> Result<ReplyFrame> {
        let body = FrameCodec::encode_request(code, payload)?;
        Self::send_message(stream, &body)?;
        let reply = Self::receive_message(stream)?;
        FrameCodec::decode_reply(&reply)
    }

    /// Writes `[length][data]` and flushes.
    pub fn send_message(stream: &mut TcpStream, data: &[u8]) -> Result<()> {
        FrameCodec::check_size(data.len())?;
        let len = data.len() as u32;

        stream
            .write_all(&len.to_be_bytes())
            .map_err(|e| map_io_error(e, "writing length prefix"))?;
        stream.write_all(data).map_err(|e| map_io_error(e, "writing data"))?;
        stream.flush().map_err(|e| map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one length-prefixed message.
    ///
    /// The declared length is checked against [`MAX_FRAME_SIZE`] before the
    /// buffer is allocated.
    ///
    /// [`MAX_FRAME_SIZE`]: crate::transport::codec::MAX_FRAME_SIZE
    pub fn receive_message(stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .map_err(|e| map_io_error(e, "reading length prefix"))?;

        let len = u32::from_be_bytes(len_buf) as usize;
        FrameCodec::check_size(len)?;

        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).map_err(|e| map_io_error(e, "reading data"))?;

        Ok(buf)
    }
}

/// Async counterpart of [`TcpTransport`], used by the server side.
pub struct TcpTransportAsync;

impl TcpTransportAsync {
    pub async fn send_message(stream: &mut tokio::net::TcpStream, data: &[u8]) -> Result<()> {
        FrameCodec::check_size(data.len())?;
        let len = data.len() as u32;

        stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| map_io_error(e, "writing length prefix"))?;
        stream.write_all(data).await.map_err(|e| map_io_error(e, "writing data"))?;
        stream.flush().await.map_err(|e| map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one length-prefixed message. Returns `Ok(None)` when the peer
    /// closed the connection cleanly between messages.
    pub async fn receive_message(stream: &mut tokio::net::TcpStream) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(map_io_error(e, "reading length prefix")),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        FrameCodec::check_size(len)?;

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| map_io_error(e, "reading data"))?;

        Ok(Some(buf))
    }
}

/// Maps IO errors onto the protocol's transport errors.
///
/// - timeouts become `Timeout`
/// - a connection that went away becomes `PeerDied`
/// - anything else stays `Io`
fn map_io_error(err: std::io::Error, context: &str) -> DataShareError {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => DataShareError::Timeout(DEFAULT_TIMEOUT.as_millis() as u64),
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => {
            debug!(context, "connection lost");
            DataShareError::PeerDied
        }
        _ => DataShareError::Io(err),
    }
}

/// A [`RemoteObject`] over one TCP connection.
///
/// Request/reply pairs are serialized on the connection. Any failure of the
/// exchange itself (IO, timeout, undecodable reply) leaves the stream in an
/// unknown state, so the connection is dropped, the remote is marked dead and
/// every death recipient is notified once.
pub struct TcpRemote {
    endpoint: String,
    stream: Mutex<Option<TcpStream>>,
    alive: AtomicBool,
    recipients: Mutex<Vec<Arc<dyn DeathRecipient>>>,
}

impl TcpRemote {
    pub fn connect(endpoint: &str) -> Result<Arc<Self>> {
        let stream = TcpTransport::connect(endpoint)?;
        debug!(endpoint, "connected to remote");
        Ok(Arc::new(Self {
            endpoint: endpoint.to_string(),
            stream: Mutex::new(Some(stream)),
            alive: AtomicBool::new(true),
            recipients: Mutex::new(Vec::new()),
        }))
    }

    fn mark_dead(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        warn!(endpoint = %self.endpoint, "remote died");
        let recipients = std::mem::take(&mut *self.recipients.lock());
        for recipient in recipients {
            recipient.on_remote_died();
        }
    }
}

impl RemoteObject for TcpRemote {
    fn send_request(&self, code: u32, data: &Parcel) -> Result<Parcel> {
        if !self.is_alive() {
            return Err(DataShareError::PeerDied);
        }

        let result = {
            let mut guard = self.stream.lock();
            let Some(stream) = guard.as_mut() else {
                return Err(DataShareError::PeerDied);
            };
            let result = TcpTransport::call(stream, code, data.as_bytes());
            if result.is_err() {
                guard.take();
            }
            result
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.mark_dead();
                return Err(e);
            }
        };

        if !reply.is_ok() {
            return Err(DataShareError::Transport(format!(
                "command {} failed with reply status {}",
                code, reply.status
            )));
        }
        Ok(Parcel::from_bytes(&reply.payload))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn add_death_recipient(&self, recipient: Arc<dyn DeathRecipient>) -> bool {
        let mut recipients = self.recipients.lock();
        // checked under the lock so a concurrent mark_dead cannot miss it
        if !self.is_alive() {
            return false;
        }
        recipients.push(recipient);
        true
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for TcpRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpRemote")
            .field("endpoint", &self.endpoint)
            .field("alive", &self.is_alive())
            .finish()
    }
}
