//! Transport-agnostic seams of the protocol.
//!
//! The proxy and the service manager are written against [`RemoteObject`];
//! the stub and the observer host implement [`RequestHandler`]. The TCP
//! binding in this crate is one implementation of each side.

use std::sync::Arc;

use crate::protocol::error::Result;
use crate::protocol::parcel::{Parcel, ParcelReader};

/// Notified once when the peer behind a [`RemoteObject`] goes away.
pub trait DeathRecipient: Send + Sync {
    fn on_remote_died(&self);
}

/// Handle to a remote service.
///
/// `send_request` blocks until the reply arrives or the transport fails.
/// A reply whose status is not OK is reported as a transport error.
pub trait RemoteObject: Send + Sync {
    fn send_request(&self, code: u32, data: &Parcel) -> Result<Parcel>;

    fn is_alive(&self) -> bool;

    /// Registers a recipient for peer death. Returns false if the peer is
    /// already dead; the recipient is not called in that case.
    fn add_death_recipient(&self, recipient: Arc<dyn DeathRecipient>) -> bool;

    /// Address of the peer, for logging.
    fn endpoint(&self) -> &str;
}

/// Serves incoming requests on the receiving side of a transport.
///
/// Handlers run on a blocking worker and may themselves make blocking
/// transport calls.
pub trait RequestHandler: Send + Sync + 'static {
    fn on_remote_request(&self, code: u32, data: &mut ParcelReader<'_>) -> Result<Parcel>;
}

impl<F> DeathRecipient for F
where
    F: Fn() + Send + Sync,
{
    fn on_remote_died(&self) {
        self()
    }
}
