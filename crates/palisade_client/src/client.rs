// Copyright (c) Microsoft Corporation.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use palisade_breaker::{BreakerRegistry, CircuitBreaker};
use palisade_cache::{CacheOptions, DurableStore, TieredCache, generate_key};
use palisade_clock::Clock;
use palisade_flight::Flight;
use pct_str::{PctString, UriReserved};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{CORS_PROXY_SERVICE, ServiceConfig, ServiceRegistry};
use crate::errors::ClientError;
use crate::options::{RequestOptions, ResponseKind};
use crate::result::{CacheOrigin, HealthStatus, RequestResult};
use crate::rnd::Rnd;
use crate::transport::{Transport, TransportResponse};

/// Default per-attempt time budget when neither the call nor the service
/// configuration overrides it.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Maximum jitter added to a backoff delay, in milliseconds.
const JITTER_MS: f64 = 500.0;

/// The request orchestrator.
///
/// For every call it consults the [`ServiceRegistry`] for policy, the cache
/// for a possibly-satisfying value, the circuit breaker for permission to
/// call out, and the in-flight ledger to avoid duplicate network work; it
/// then executes the network call with bounded timeout and
/// exponential-backoff retries, updates breaker and cache, and falls back to
/// stale cache data if the network ultimately fails.
///
/// Cloning is cheap and clones share all state; construct one per
/// composition root and pass it by reference or clone.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    registry: ServiceRegistry,
    cache: TieredCache<Value>,
    breakers: BreakerRegistry,
    flight: Flight<String, Result<RequestResult, ClientError>>,
    transport: Arc<dyn Transport>,
    rnd: Rnd,
}

impl ServiceClient {
    /// Creates a client.
    ///
    /// `durable` is the origin-scoped store backing the cache's second tier;
    /// pass `None` where no such substrate exists and the cache degrades to
    /// memory-only.
    #[must_use]
    pub fn new(
        registry: ServiceRegistry,
        transport: Arc<dyn Transport>,
        durable: Option<Arc<dyn DurableStore>>,
        clock: Clock,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                cache: TieredCache::new(CacheOptions::default(), durable, clock.clone()),
                breakers: BreakerRegistry::new(clock),
                flight: Flight::new(),
                transport,
                rnd: Rnd::default(),
            }),
        }
    }

    /// Performs a request against a registered service.
    ///
    /// The returned envelope is self-describing: it says whether the payload
    /// came from the network, a cache tier, or a fallback path, and carries
    /// the last network error when a fallback was served.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownService`] for an unregistered `service_id`;
    /// [`ClientError::CircuitOpen`] when the breaker denies the call and no
    /// cached value of any staleness exists; otherwise the last network or
    /// timeout error once retries are exhausted and no fallback exists.
    pub async fn request(
        &self,
        service_id: &str,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<RequestResult, ClientError> {
        let config = self
            .inner
            .registry
            .get(service_id)
            .ok_or_else(|| ClientError::UnknownService(service_id.to_owned()))?
            .clone();

        let url = build_url(&config, endpoint, &options);
        let cache_key = generate_key(&url, &options.params);

        // 1. cache, unless disabled for this call or unconfigured for this
        //    service
        if options.use_cache {
            if let Some(policy) = &config.cache {
                if let Some(hit) = self.inner.cache.get(&cache_key) {
                    if !hit.is_stale {
                        return Ok(RequestResult {
                            data: hit.data,
                            from_cache: hit.source.into(),
                            stale: false,
                            circuit_open: false,
                            attempt: None,
                            error: None,
                        });
                    }
                    if policy.stale_while_revalidate {
                        self.spawn_revalidation(&config, &url, &options, &cache_key);
                        return Ok(RequestResult {
                            data: hit.data,
                            from_cache: hit.source.into(),
                            stale: true,
                            circuit_open: false,
                            attempt: None,
                            error: None,
                        });
                    }
                }
            }
        }

        // 2. breaker gate, with any-staleness fallback
        let breaker = self
            .inner
            .breakers
            .get_or_create(&config.id, config.breaker.clone().unwrap_or_default());
        if !breaker.can_request() {
            if let Some(hit) = self.inner.cache.get(&cache_key) {
                return Ok(RequestResult {
                    data: hit.data,
                    from_cache: CacheOrigin::Fallback,
                    stale: false,
                    circuit_open: true,
                    attempt: None,
                    error: None,
                });
            }
            return Err(ClientError::CircuitOpen {
                service: config.id.clone(),
            });
        }

        // 3. collapse concurrent identical requests onto one execution
        let inner = Arc::clone(&self.inner);
        let execution = {
            let config = config.clone();
            let url = url.clone();
            let options = options.clone();
            let cache_key = cache_key.clone();
            move || Inner::execute(inner, config, url, options, cache_key, breaker)
        };
        self.inner.flight.work(cache_key, execution).await
    }

    /// Fetches `target_url` through the configured proxy front-ends, first
    /// to last, returning the first response that does not look like an HTML
    /// error page.
    ///
    /// # Errors
    ///
    /// The last proxy's error when every front-end fails, or
    /// [`ClientError::AllProxiesFailed`] when they all returned error pages.
    pub async fn fetch_with_proxy(&self, target_url: &str, options: RequestOptions) -> Result<String, ClientError> {
        let config = self
            .inner
            .registry
            .get(CORS_PROXY_SERVICE)
            .ok_or_else(|| ClientError::UnknownService(CORS_PROXY_SERVICE.to_owned()))?
            .clone();

        let mut last_error = None;
        for (index, proxy) in self.inner.registry.cors_proxies().iter().enumerate() {
            let proxy_url = format!("{proxy}{}", PctString::encode(target_url.chars(), UriReserved::Any));

            let mut proxied = options.clone();
            proxied.accept = Some("application/rss+xml, application/xml, text/xml, */*".to_owned());
            proxied.kind = ResponseKind::Text;

            match self.inner.fetch_with_timeout(&proxy_url, &proxied, &config).await {
                Ok(Value::String(body)) => {
                    if body.contains("<!DOCTYPE html>") || body.contains("error code:") {
                        debug!(proxy = index + 1, "proxy returned an error page");
                    } else {
                        return Ok(body);
                    }
                }
                Ok(_) => debug!(proxy = index + 1, "proxy returned a non-text payload"),
                Err(err) => {
                    debug!(proxy = index + 1, %err, "proxy failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(ClientError::AllProxiesFailed))
    }

    /// Aggregate diagnostics for the health panel.
    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus {
            circuit_breakers: self.inner.breakers.status_map(),
            open_circuits: self.inner.breakers.open_count(),
            in_flight_requests: self.inner.flight.len(),
            cache_stats: self.inner.cache.stats(),
        }
    }

    /// Drops cached entries whose key contains `pattern`.
    pub fn clear_service_cache(&self, pattern: &str) {
        self.inner.cache.invalidate(pattern);
    }

    /// Forces every circuit breaker back to closed.
    pub fn reset_circuit_breakers(&self) {
        self.inner.breakers.reset_all();
    }

    /// Launches a detached refresh of a stale entry. The refresh runs the
    /// normal execution pipeline; its outcome is logged and never surfaces
    /// to the caller that was served stale data.
    fn spawn_revalidation(&self, config: &ServiceConfig, url: &str, options: &RequestOptions, cache_key: &str) {
        let inner = Arc::clone(&self.inner);
        let breaker = inner
            .breakers
            .get_or_create(&config.id, config.breaker.clone().unwrap_or_default());
        let config = config.clone();
        let url = url.to_owned();
        let options = options.clone();
        let cache_key = cache_key.to_owned();

        drop(tokio::spawn(async move {
            let service = config.id.clone();
            match Inner::execute(inner, config, url, options, cache_key, breaker).await {
                Ok(_) => debug!(%service, "background revalidation complete"),
                Err(err) => debug!(%service, %err, "background revalidation failed"),
            }
        }));
    }
}

impl Inner {
    /// The retry loop: up to `retries + 1` time-bounded attempts with
    /// exponential backoff, breaker bookkeeping, cache writes on success,
    /// and a stale-fallback search once the budget is exhausted.
    async fn execute(
        inner: Arc<Self>,
        config: ServiceConfig,
        url: String,
        options: RequestOptions,
        cache_key: String,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<RequestResult, ClientError> {
        let retries = options.retries.unwrap_or(config.retries);
        let mut last_error = None;

        for attempt in 0..=retries {
            if attempt > 0 {
                debug!(service = %config.id, attempt, "retrying request");
            }

            breaker.track_half_open_probe();
            match inner.fetch_with_timeout(&url, &options, &config).await {
                Ok(data) => {
                    breaker.record_success();

                    if let Some(policy) = &config.cache {
                        inner
                            .cache
                            .set(&cache_key, data.clone(), policy.ttl, policy.stale_while_revalidate);
                    }

                    return Ok(RequestResult {
                        data,
                        from_cache: CacheOrigin::Network,
                        stale: false,
                        circuit_open: false,
                        attempt: Some(attempt),
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(
                        service = %config.id,
                        attempt = attempt + 1,
                        attempts = retries + 1,
                        %err,
                        "request failed"
                    );

                    let retryable = err.is_retryable();
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                    if attempt < retries {
                        tokio::time::sleep(backoff_delay(attempt, &inner.rnd)).await;
                    }
                }
            }
        }

        breaker.record_failure();
        // the loop always runs at least one attempt
        let last_error = last_error.unwrap_or(ClientError::Transport {
            message: "no attempts were executed".to_owned(),
        });

        // any cached value, however stale, beats propagating the error
        if let Some(hit) = inner.cache.get(&cache_key) {
            warn!(
                service = %config.id,
                attempts = retries + 1,
                "returning stale cache after exhausting retries"
            );
            return Ok(RequestResult {
                data: hit.data,
                from_cache: CacheOrigin::StaleFallback,
                stale: false,
                circuit_open: false,
                attempt: None,
                error: Some(last_error.to_string()),
            });
        }

        Err(last_error)
    }

    /// One time-bounded network attempt, decoded to the payload value.
    async fn fetch_with_timeout(
        &self,
        url: &str,
        options: &RequestOptions,
        config: &ServiceConfig,
    ) -> Result<Value, ClientError> {
        let budget = options.timeout.unwrap_or(if config.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            config.timeout
        });
        let accept = options.accept.as_deref().unwrap_or("application/json");

        let response = match tokio::time::timeout(budget, self.transport.fetch(url, accept)).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Err(ClientError::Timeout {
                    url: url.to_owned(),
                    timeout: budget,
                });
            }
        };

        if !response.status.is_success() {
            return Err(ClientError::Http {
                status: response.status,
                url: url.to_owned(),
            });
        }

        decode_body(options.kind, response)
    }
}

/// Decodes a response body into the payload value: text and XML bodies are
/// carried as strings, everything else is parsed as JSON.
fn decode_body(kind: ResponseKind, response: TransportResponse) -> Result<Value, ClientError> {
    let content_type = response.content_type.unwrap_or_default();
    if kind == ResponseKind::Text || content_type.contains("text/") || content_type.contains("xml") {
        return Ok(Value::String(response.body));
    }

    serde_json::from_str(&response.body).map_err(|err| ClientError::Transport {
        message: format!("invalid JSON payload: {err}"),
    })
}

/// Builds the full request address from the service base, the endpoint, and
/// the query parameters. Absolute endpoints bypass the base address so that
/// proxy passthrough calls work unchanged.
fn build_url(config: &ServiceConfig, endpoint: &str, options: &RequestOptions) -> String {
    let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        ""
    } else {
        config.base_url.as_str()
    };

    let mut url = format!("{base}{endpoint}");
    let mut sep = if url.contains('?') { '&' } else { '?' };
    for (name, value) in &options.params {
        let _ = write!(
            url,
            "{sep}{}={}",
            PctString::encode(name.chars(), UriReserved::Any),
            PctString::encode(value.chars(), UriReserved::Any)
        );
        sep = '&';
    }
    url
}

/// Exponential backoff with jitter: `2^attempt` seconds plus 0-500ms of
/// random jitter, capped at [`MAX_BACKOFF`].
fn backoff_delay(attempt: u32, rnd: &Rnd) -> Duration {
    let base_ms = 1000u64.saturating_mul(2u64.saturating_pow(attempt));
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "jitter is bounded to [0, 500)"
    )]
    let jitter_ms = (rnd.next_f64() * JITTER_MS) as u64;
    Duration::from_millis(base_ms.saturating_add(jitter_ms)).min(MAX_BACKOFF)
}
