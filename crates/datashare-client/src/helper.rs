//! Caller-facing entry point.
//!
//! [`DataShareHelper`] wraps every proxy call in an [`AsyncCall`]: arguments
//! are checked inline, the blocking round-trip runs on a worker with a
//! service handle from the [`ServiceManager`], and the proxy's sentinels are
//! turned back into errors on completion.

use std::sync::Arc;

use datashare_common::protocol::{
    Data, DataShareError, ObserverRef, OperationResult, Predicates, Result, ResultSet, Template, TemplateId, Uri,
    ValuesBucket, DATA_SHARE_ERROR,
};
use datashare_common::registry::SubscriptionRegistry;
use tracing::{debug, warn};

use crate::async_call::AsyncCall;
use crate::manager::{RetryConfig, ServiceManager, ServiceResolver, TcpResolver};
use crate::observer::{DataObserver, ListenerEntry, ObserverHost, PublishedObserver, RdbObserver, SubscriptionKey};
use crate::proxy::DataShareServiceProxy;

/// Helper configuration.
///
/// # Default Configuration
///
/// - `bundle_name`: `"datashare.client"`
/// - `retry`: [`RetryConfig::default`]
/// - `observer_bind`: `"127.0.0.1:0"` (any free port)
#[derive(Debug, Clone)]
pub struct HelperConfig {
    /// Bundle this caller publishes under and builds template ids with
    pub bundle_name: String,
    /// Service resolution policy
    pub retry: RetryConfig,
    /// Address the observer host listens on for provider pushes
    pub observer_bind: String,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            bundle_name: "datashare.client".to_string(),
            retry: RetryConfig::default(),
            observer_bind: "127.0.0.1:0".to_string(),
        }
    }
}

/// Async client for one data-share provider.
pub struct DataShareHelper {
    config: HelperConfig,
    manager: Arc<ServiceManager>,
    listeners: Arc<SubscriptionRegistry<ListenerEntry>>,
    host: ObserverHost,
}

impl DataShareHelper {
    /// Connects lazily to the provider at `addr`; the first call resolves
    /// the service.
    ///
    /// # Arguments
    ///
    /// * `addr` - Provider address, e.g. `"127.0.0.1:7600"`
    /// * `config` - Bundle name, retry policy and observer host address
    ///
    /// # Errors
    ///
    /// `Transport` if the observer host cannot bind `config.observer_bind`.
    pub async fn connect(addr: &str, config: HelperConfig) -> Result<Self> {
        Self::with_resolver(Arc::new(TcpResolver::new(addr)), config).await
    }

    /// Like [`connect`](Self::connect), with a custom way of finding the
    /// service.
    pub async fn with_resolver(resolver: Arc<dyn ServiceResolver>, config: HelperConfig) -> Result<Self> {
        let listeners = Arc::new(SubscriptionRegistry::new());
        let host = ObserverHost::start(&config.observer_bind, listeners.clone()).await?;
        let manager = Arc::new(ServiceManager::new(resolver, config.retry.clone()));
        Ok(Self { config, manager, listeners, host })
    }

    pub fn bundle_name(&self) -> &str {
        &self.config.bundle_name
    }

    /// Template id for `subscriber_id` under this helper's bundle.
    pub fn template_id(&self, subscriber_id: i64) -> TemplateId {
        TemplateId::new(subscriber_id, self.config.bundle_name.clone())
    }

    /// Endpoint providers push notifications to.
    pub fn observer_endpoint(&self) -> &str {
        self.host.endpoint()
    }

    pub fn service_manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }

    /// Number of RDB and published-data callbacks the observer host holds.
    pub fn subscriber_count(&self) -> usize {
        self.host.subscriber_count()
    }

    async fn call<I, R, T>(
        &self,
        validate: impl FnOnce() -> Result<I>,
        execute: impl FnOnce(&DataShareServiceProxy, I) -> R + Send + 'static,
        complete: impl FnOnce(R) -> Result<T>,
    ) -> Result<T>
    where
        I: Send + 'static,
        R: Send + 'static,
    {
        let manager = self.manager.clone();
        AsyncCall::new(
            validate,
            move |input| manager.get_service().map(|proxy| execute(&proxy, input)),
            |raw: Result<R>| complete(raw?),
        )
        .call()
        .await
    }

    // ---- Data ----

    /// Inserts one row.
    ///
    /// # Returns
    ///
    /// The provider's id for the new row.
    ///
    /// # Errors
    ///
    /// - `Parameter` for a malformed URI or an empty bucket, before any
    ///   round trip
    /// - `Provider` with the provider's negative code
    /// - `Transport` or `ServiceUnavailable` if the call never completed
    pub async fn insert(&self, uri: &str, bucket: &ValuesBucket) -> Result<i32> {
        self.call(
            || Ok((Uri::parse(uri)?, non_empty(bucket)?.clone())),
            |proxy, (uri, bucket)| proxy.insert(&uri, &bucket),
            count,
        )
        .await
    }

    /// Updates matching rows; returns the number changed.
    pub async fn update(&self, uri: &str, predicates: &Predicates, bucket: &ValuesBucket) -> Result<i32> {
        self.call(
            || Ok((Uri::parse(uri)?, predicates.clone(), non_empty(bucket)?.clone())),
            |proxy, (uri, predicates, bucket)| proxy.update(&uri, &predicates, &bucket),
            count,
        )
        .await
    }

    /// Deletes matching rows; returns the number removed.
    pub async fn delete(&self, uri: &str, predicates: &Predicates) -> Result<i32> {
        self.call(
            || Ok((Uri::parse(uri)?, predicates.clone())),
            |proxy, (uri, predicates)| proxy.delete(&uri, &predicates),
            count,
        )
        .await
    }

    /// Queries rows. An empty `columns` selects every column.
    pub async fn query(&self, uri: &str, predicates: &Predicates, columns: &[&str]) -> Result<ResultSet> {
        self.call(
            || {
                let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
                Ok((Uri::parse(uri)?, predicates.clone(), columns))
            },
            |proxy, (uri, predicates, columns)| proxy.query(&uri, &predicates, &columns),
            |(code, result)| match (code, result) {
                (0, Some(result)) => Ok(result),
                (0, None) | (DATA_SHARE_ERROR, None) => Err(round_trip_failed()),
                (code, _) => Err(DataShareError::Provider(code)),
            },
        )
        .await
    }

    /// Inserts several rows; returns the number inserted.
    pub async fn batch_insert(&self, uri: &str, buckets: &[ValuesBucket]) -> Result<i32> {
        self.call(
            || {
                if buckets.is_empty() {
                    return Err(DataShareError::Parameter("no rows to insert".into()));
                }
                Ok((Uri::parse(uri)?, buckets.to_vec()))
            },
            |proxy, (uri, buckets)| proxy.batch_insert(&uri, &buckets),
            count,
        )
        .await
    }

    /// Tells the provider to notify every observer of `uri`.
    pub async fn notify_change(&self, uri: &str) -> Result<()> {
        self.call(|| Uri::parse(uri), |proxy, uri| proxy.notify_observers(&uri), acknowledged).await
    }

    pub async fn normalize_uri(&self, uri: &str) -> Result<String> {
        self.call(|| Uri::parse(uri), |proxy, uri| proxy.normalize_uri(&uri), Ok).await
    }

    pub async fn denormalize_uri(&self, uri: &str) -> Result<String> {
        self.call(|| Uri::parse(uri), |proxy, uri| proxy.denormalize_uri(&uri), Ok).await
    }

    /// MIME type of the resource; empty if the provider does not say.
    pub async fn get_type(&self, uri: &str) -> Result<String> {
        self.call(|| Uri::parse(uri), |proxy, uri| proxy.get_type(&uri), Ok).await
    }

    // ---- Change listeners ----

    /// Sets the change listener for `uri`, replacing any previous one.
    ///
    /// The new listener is registered with the provider first. Only once the
    /// provider accepted it does it take the local slot, and the listener it
    /// replaced is unregistered. The host delivers to the slot's occupant
    /// only, so the overlap never reaches both.
    ///
    /// # Errors
    ///
    /// - `Parameter` if `uri` is malformed
    /// - `ServiceUnavailable` if the provider cannot be resolved
    /// - `Transport` if the provider did not accept the registration; the
    ///   previous listener stays in place
    pub async fn on(&self, uri: &str, observer: Arc<dyn DataObserver>) -> Result<()> {
        let listeners = self.listeners.clone();
        let endpoint = self.host.endpoint().to_string();
        self.call(
            || Ok((Uri::parse(uri)?, self.host.listener_entry(observer))),
            move |proxy, (uri, entry): (Uri, ListenerEntry)| {
                if !proxy.register_observer(&uri, &ObserverRef::new(endpoint.clone(), entry.id)) {
                    return false;
                }
                if let Some(previous) = listeners.register_listener(&uri, entry) {
                    debug!(%uri, id = previous.id, "replacing change listener");
                    let previous = ObserverRef::new(endpoint, previous.id);
                    if !proxy.unregister_observer(&uri, &previous) {
                        warn!(%uri, observer = %previous, "could not unregister replaced listener");
                    }
                }
                true
            },
            acknowledged,
        )
        .await
    }

    /// Clears the change listener for `uri`. Returns false if none was set.
    pub async fn off(&self, uri: &str) -> Result<bool> {
        let listeners = self.listeners.clone();
        let endpoint = self.host.endpoint().to_string();
        self.call(
            || Uri::parse(uri),
            move |proxy, uri| match listeners.unregister_listener(&uri) {
                Some(previous) => Some(proxy.unregister_observer(&uri, &ObserverRef::new(endpoint, previous.id))),
                None => None,
            },
            |released| match released {
                Some(acked) => acknowledged(acked).map(|_| true),
                None => Ok(false),
            },
        )
        .await
    }

    // ---- Templates ----

    pub async fn add_template(&self, uri: &str, id: &TemplateId, template: &Template) -> Result<()> {
        self.call(
            || Ok((Uri::parse(uri)?, id.clone(), template.clone())),
            |proxy, (uri, id, template)| proxy.add_template(&uri, &id, &template),
            |code| registry_code(uri, code),
        )
        .await
    }

    /// Deletes a template. Subscriptions made with it stay registered but
    /// receive nothing until the template is added again.
    pub async fn del_template(&self, uri: &str, id: &TemplateId) -> Result<()> {
        self.call(
            || Ok((Uri::parse(uri)?, id.clone())),
            |proxy, (uri, id)| proxy.del_template(&uri, &id),
            |code| registry_code(uri, code),
        )
        .await
    }

    // ---- RDB subscriptions ----

    /// Subscribes `observer` to the template's results on each URI.
    ///
    /// Every call registers its own observer, so subscriptions made with the
    /// same template id on other URIs keep their callbacks.
    ///
    /// # Arguments
    ///
    /// * `uris` - URIs to subscribe; malformed ones fail individually
    /// * `id` - Template the provider evaluates on change
    /// * `observer` - Callback for the URIs that were accepted
    ///
    /// # Returns
    ///
    /// One [`OperationResult`] per URI, in input order. The callback is kept
    /// only if at least one URI was accepted.
    pub async fn subscribe_rdb(
        &self,
        uris: &[&str],
        id: &TemplateId,
        observer: Arc<dyn RdbObserver>,
    ) -> Result<Vec<OperationResult>> {
        let mut bound = None;
        let results = self
            .call(
                || {
                    let uris = uri_list(uris)?;
                    let observer = self.host.bind_rdb(observer);
                    bound = Some(observer.id);
                    Ok((uris, id.clone(), observer))
                },
                |proxy, (uris, id, observer)| per_uri(uris.len(), proxy.subscribe_rdb(&uris, &id, &observer)),
                |results| results,
            )
            .await;
        if let Some(host_id) = bound {
            self.host.confirm(host_id, accepted(&results, |uri| SubscriptionKey::Rdb(uri, id.clone())));
        }
        results
    }

    /// Removes the subscriptions under `id` on each URI, with every callback
    /// attached to them.
    pub async fn unsubscribe_rdb(&self, uris: &[&str], id: &TemplateId) -> Result<Vec<OperationResult>> {
        let results = self
            .call(
                || Ok((uri_list(uris)?, id.clone())),
                |proxy, (uris, id)| per_uri(uris.len(), proxy.unsubscribe_rdb(&uris, &id)),
                |results| results,
            )
            .await;
        self.host.release(&accepted(&results, |uri| SubscriptionKey::Rdb(uri, id.clone())));
        results
    }

    pub async fn enable_subscribe_rdb(&self, uris: &[&str], id: &TemplateId) -> Result<Vec<OperationResult>> {
        self.call(
            || Ok((uri_list(uris)?, id.clone())),
            |proxy, (uris, id)| per_uri(uris.len(), proxy.enable_subscribe_rdb(&uris, &id)),
            |results| results,
        )
        .await
    }

    pub async fn disable_subscribe_rdb(&self, uris: &[&str], id: &TemplateId) -> Result<Vec<OperationResult>> {
        self.call(
            || Ok((uri_list(uris)?, id.clone())),
            |proxy, (uris, id)| per_uri(uris.len(), proxy.disable_subscribe_rdb(&uris, &id)),
            |results| results,
        )
        .await
    }

    // ---- Published data ----

    /// Publishes `data` under this helper's bundle.
    pub async fn publish(&self, data: &Data) -> Result<Vec<OperationResult>> {
        let bundle_name = self.config.bundle_name.clone();
        self.call(
            || {
                if data.items.is_empty() {
                    return Err(DataShareError::Parameter("nothing to publish".into()));
                }
                Ok(data.clone())
            },
            move |proxy, data| per_uri(data.items.len(), proxy.publish(&data, &bundle_name)),
            |results| results,
        )
        .await
    }

    pub async fn get_published_data(&self, bundle_name: &str) -> Result<Data> {
        self.call(
            || {
                if bundle_name.is_empty() {
                    return Err(DataShareError::Parameter("bundle name is empty".into()));
                }
                Ok(bundle_name.to_string())
            },
            |proxy, bundle_name| proxy.get_published_data(&bundle_name),
            |reply| match reply {
                Some((data, 0)) => Ok(data),
                Some((_, code)) => Err(DataShareError::Provider(code)),
                None => Err(round_trip_failed()),
            },
        )
        .await
    }

    /// Subscribes `observer` to published data under each key. Binding
    /// follows [`subscribe_rdb`](Self::subscribe_rdb).
    pub async fn subscribe_published(
        &self,
        uris: &[&str],
        subscriber_id: i64,
        observer: Arc<dyn PublishedObserver>,
    ) -> Result<Vec<OperationResult>> {
        let mut bound = None;
        let results = self
            .call(
                || {
                    let uris = uri_list(uris)?;
                    let observer = self.host.bind_published(observer);
                    bound = Some(observer.id);
                    Ok((uris, observer))
                },
                move |proxy, (uris, observer)| {
                    per_uri(uris.len(), proxy.subscribe_published(&uris, subscriber_id, &observer))
                },
                |results| results,
            )
            .await;
        if let Some(host_id) = bound {
            self.host.confirm(host_id, accepted(&results, |uri| SubscriptionKey::Published(uri, subscriber_id)));
        }
        results
    }

    pub async fn unsubscribe_published(&self, uris: &[&str], subscriber_id: i64) -> Result<Vec<OperationResult>> {
        let results = self
            .call(
                || uri_list(uris),
                move |proxy, uris| per_uri(uris.len(), proxy.unsubscribe_published(&uris, subscriber_id)),
                |results| results,
            )
            .await;
        self.host.release(&accepted(&results, |uri| SubscriptionKey::Published(uri, subscriber_id)));
        results
    }

    pub async fn enable_subscribe_published(&self, uris: &[&str], subscriber_id: i64) -> Result<Vec<OperationResult>> {
        self.call(
            || uri_list(uris),
            move |proxy, uris| per_uri(uris.len(), proxy.enable_subscribe_published(&uris, subscriber_id)),
            |results| results,
        )
        .await
    }

    pub async fn disable_subscribe_published(&self, uris: &[&str], subscriber_id: i64) -> Result<Vec<OperationResult>> {
        self.call(
            || uri_list(uris),
            move |proxy, uris| per_uri(uris.len(), proxy.disable_subscribe_published(&uris, subscriber_id)),
            |results| results,
        )
        .await
    }
}

fn round_trip_failed() -> DataShareError {
    DataShareError::Transport("request failed, see logs".into())
}

/// Maps a count-style reply: the sentinel is a transport failure, any other
/// negative value a provider error.
fn count(code: i32) -> Result<i32> {
    match code {
        DATA_SHARE_ERROR => Err(round_trip_failed()),
        n if n < 0 => Err(DataShareError::Provider(n)),
        n => Ok(n),
    }
}

/// Maps a template reply: positive codes are registry result codes.
fn registry_code(uri: &str, code: i32) -> Result<()> {
    match code {
        0 => Ok(()),
        code if code > 0 => Err(DataShareError::Registry { uri: uri.to_string(), code }),
        code => count(code).map(|_| ()),
    }
}

fn acknowledged(ok: bool) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(round_trip_failed())
    }
}

/// An empty batch reply for a non-empty request means the round-trip failed.
fn per_uri(requested: usize, results: Vec<OperationResult>) -> Result<Vec<OperationResult>> {
    if results.is_empty() && requested > 0 {
        return Err(round_trip_failed());
    }
    Ok(results)
}

/// Keys of the URIs a batch call succeeded for; none if the call failed.
fn accepted(results: &Result<Vec<OperationResult>>, key: impl Fn(Uri) -> SubscriptionKey) -> Vec<SubscriptionKey> {
    results
        .iter()
        .flatten()
        .filter(|result| result.is_ok())
        .map(|result| key(Uri::new(result.uri.clone())))
        .collect()
}

fn non_empty(bucket: &ValuesBucket) -> Result<&ValuesBucket> {
    if bucket.is_empty() {
        return Err(DataShareError::Parameter("values bucket is empty".into()));
    }
    Ok(bucket)
}

fn uri_list(uris: &[&str]) -> Result<Vec<Uri>> {
    if uris.is_empty() {
        return Err(DataShareError::Parameter("no uris given".into()));
    }
    Ok(uris.iter().map(|uri| Uri::new(*uri)).collect())
}
