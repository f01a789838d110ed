//! DataShare caller side.
//!
//! - [`DataShareServiceProxy`] marshals each command and maps failures to
//!   sentinel values.
//! - [`ServiceManager`] caches the service handle and resolves it again when
//!   the provider dies.
//! - [`AsyncCall`] runs a blocking round-trip off the caller's task.
//! - [`ObserverHost`] receives notifications pushed by the provider.
//! - [`DataShareHelper`] ties these together into one async API.

pub mod async_call;
pub mod helper;
pub mod manager;
pub mod observer;
pub mod proxy;

pub use async_call::AsyncCall;
pub use helper::{DataShareHelper, HelperConfig};
pub use manager::{RetryConfig, ServiceManager, ServiceResolver, TcpResolver};
pub use observer::{DataObserver, ListenerEntry, ObserverHost, PublishedObserver, RdbObserver, SubscriptionKey};
pub use proxy::DataShareServiceProxy;
