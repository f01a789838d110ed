use std::sync::{Arc, Weak};
use std::time::Duration;

use datashare_common::protocol::{DataShareError, Result};
use datashare_common::transport::{DeathRecipient, RemoteObject, TcpRemote};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::proxy::DataShareServiceProxy;

/// Produces a fresh handle to the remote service.
///
/// One call is one resolution attempt; retrying is the manager's job.
pub trait ServiceResolver: Send + Sync {
    fn resolve(&self) -> Result<Arc<dyn RemoteObject>>;
}

/// Resolves the service by connecting to a fixed TCP endpoint.
pub struct TcpResolver {
    addr: String,
}

impl TcpResolver {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl ServiceResolver for TcpResolver {
    fn resolve(&self) -> Result<Arc<dyn RemoteObject>> {
        let remote: Arc<dyn RemoteObject> = TcpRemote::connect(&self.addr)?;
        Ok(remote)
    }
}

/// Retry policy for service resolution.
///
/// # Default Configuration
///
/// - `attempts`: 3
/// - `interval`: 1 second
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Resolution attempts before giving up
    pub attempts: u32,
    /// Delay between consecutive attempts
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(1),
        }
    }
}

type Cache = Mutex<Option<Arc<DataShareServiceProxy>>>;

/// Acquires, caches and invalidates the service proxy.
///
/// Resolution, caching and invalidation share one lock, so concurrent
/// callers either get the cached proxy or wait for the single resolution in
/// flight. The lock is held across retry sleeps; call this from blocking
/// workers only.
pub struct ServiceManager {
    resolver: Arc<dyn ServiceResolver>,
    config: RetryConfig,
    cached: Arc<Cache>,
}

impl ServiceManager {
    /// Creates a manager with nothing cached.
    ///
    /// # Arguments
    ///
    /// * `resolver` - Where fresh handles come from
    /// * `config` - Attempts and spacing for resolution
    pub fn new(resolver: Arc<dyn ServiceResolver>, config: RetryConfig) -> Self {
        Self {
            resolver,
            config,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the cached proxy if its remote is alive, otherwise resolves a
    /// new one, retrying per [`RetryConfig`].
    ///
    /// # Returns
    ///
    /// A proxy whose remote had a death recipient registered on it.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` once every attempt has failed. A handle that dies
    /// while its death recipient is being registered counts as a failed
    /// attempt.
    pub fn get_service(&self) -> Result<Arc<DataShareServiceProxy>> {
        let mut cached = self.cached.lock();
        if let Some(proxy) = cached.as_ref() {
            if proxy.is_alive() {
                return Ok(proxy.clone());
            }
            debug!("cached service handle is dead, resolving again");
            *cached = None;
        }

        let attempts = self.config.attempts.max(1);
        for attempt in 1..=attempts {
            match self.resolver.resolve() {
                Ok(remote) => {
                    let proxy = Arc::new(DataShareServiceProxy::new(remote.clone()));
                    let recipient = Arc::new(ServiceDeathRecipient {
                        cache: Arc::downgrade(&self.cached),
                        proxy: Arc::downgrade(&proxy),
                    });
                    if !remote.add_death_recipient(recipient) {
                        warn!(attempt, "service died during resolution");
                    } else {
                        info!(attempt, endpoint = remote.endpoint(), "service handle acquired");
                        *cached = Some(proxy.clone());
                        return Ok(proxy);
                    }
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "service resolution failed");
                }
            }
            if attempt < attempts {
                std::thread::sleep(self.config.interval);
            }
        }

        Err(DataShareError::ServiceUnavailable { attempts })
    }

    /// Drops the cached proxy; the next call resolves again.
    pub fn reset(&self) {
        if self.cached.lock().take().is_some() {
            debug!("service handle reset");
        }
    }

    /// True if a proxy is cached, alive or not.
    pub fn is_cached(&self) -> bool {
        self.cached.lock().is_some()
    }
}

/// Clears the cache when the remote behind it dies, unless the cache has
/// since moved on to a different proxy.
struct ServiceDeathRecipient {
    cache: Weak<Cache>,
    proxy: Weak<DataShareServiceProxy>,
}

impl DeathRecipient for ServiceDeathRecipient {
    fn on_remote_died(&self) {
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        let mut cached = cache.lock();
        let is_current = cached
            .as_ref()
            .map(|current| std::ptr::eq(Arc::as_ptr(current), self.proxy.as_ptr()))
            .unwrap_or(false);
        if is_current {
            warn!("service died, invalidating cached handle");
            *cached = None;
        }
    }
}
