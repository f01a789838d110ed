//! DataShare provider side.
//!
//! - [`DataShareStub`] decodes requests and dispatches them to a
//!   [`DataShareService`].
//! - [`ProviderServer`] serves a stub over TCP.
//! - [`InMemoryProvider`] is a complete reference service; it pushes change
//!   notifications through a [`Notifier`].

pub mod filter;
pub mod node;
pub mod notifier;
pub mod provider;
pub mod service;
pub mod stub;

pub use node::{ProviderServer, ServerConfig};
pub use notifier::{Notifier, RemoteNotifier};
pub use provider::InMemoryProvider;
pub use service::DataShareService;
pub use stub::DataShareStub;
