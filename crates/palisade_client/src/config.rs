// Copyright (c) Microsoft Corporation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use palisade_breaker::BreakerOptions;

/// Identifier of the pseudo-service describing the proxy front-ends.
pub const CORS_PROXY_SERVICE: &str = "cors_proxy";

/// Caching policy of a service.
#[derive(Clone, Debug)]
pub struct CachePolicy {
    /// Freshness window of cached responses.
    pub ttl: Duration,
    /// Whether expired entries may be served while a background refresh runs.
    pub stale_while_revalidate: bool,
}

/// Immutable per-service configuration record.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Service identifier; also the registry key.
    pub id: String,
    /// Base address prefixed to relative endpoints. Empty for the proxy
    /// pseudo-service, which only carries `proxies`.
    pub base_url: String,
    /// Per-call time budget.
    pub timeout: Duration,
    /// Default number of retries after the first attempt.
    pub retries: u32,
    /// Cache policy; `None` disables caching for the service.
    pub cache: Option<CachePolicy>,
    /// Circuit-breaker tuning; `None` uses the breaker defaults.
    pub breaker: Option<BreakerOptions>,
    /// Ordered proxy front-end prefixes, tried first to last.
    pub proxies: Vec<String>,
}

/// Static, read-only table mapping service identifiers to policy.
///
/// Built once at startup and never mutated; lookups are pure reads. The
/// compiled-in [`builtin`][ServiceRegistry::builtin] table captures each
/// upstream's reliability characteristics — short TTLs with
/// stale-while-revalidate and a hair-trigger breaker for real-time feeds,
/// hour-long TTLs for slow-moving statistics, patient breakers for flaky
/// aggregators. Alternative tables can be assembled from any source as long
/// as the same fields are honored.
#[derive(Clone, Debug)]
pub struct ServiceRegistry {
    services: Arc<HashMap<String, ServiceConfig>>,
}

impl ServiceRegistry {
    /// Builds a registry from an arbitrary set of service configurations.
    #[must_use]
    pub fn new(configs: impl IntoIterator<Item = ServiceConfig>) -> Self {
        Self {
            services: Arc::new(configs.into_iter().map(|c| (c.id.clone(), c)).collect()),
        }
    }

    /// The compiled-in table for the dashboard's upstream services.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new([
            // real-time news: fail fast, recover fast
            ServiceConfig {
                id: "gdelt".to_owned(),
                base_url: "https://api.gdeltproject.org".to_owned(),
                timeout: Duration::from_secs(15),
                retries: 1,
                cache: Some(CachePolicy {
                    ttl: Duration::from_secs(3 * 60),
                    stale_while_revalidate: true,
                }),
                breaker: Some(BreakerOptions {
                    failure_threshold: 2,
                    reset_timeout: Duration::from_secs(60),
                    ..BreakerOptions::default()
                }),
                proxies: Vec::new(),
            },
            // crypto prices move by the minute and the API can be flaky
            ServiceConfig {
                id: "coingecko".to_owned(),
                base_url: "https://api.coingecko.com".to_owned(),
                timeout: Duration::from_secs(10),
                retries: 2,
                cache: Some(CachePolicy {
                    ttl: Duration::from_secs(60),
                    stale_while_revalidate: false,
                }),
                breaker: Some(BreakerOptions {
                    failure_threshold: 3,
                    reset_timeout: Duration::from_secs(120),
                    ..BreakerOptions::default()
                }),
                proxies: Vec::new(),
            },
            // weekly statistical series: long TTL
            ServiceConfig {
                id: "fred".to_owned(),
                base_url: "https://fred.stlouisfed.org".to_owned(),
                timeout: Duration::from_secs(10),
                retries: 2,
                cache: Some(CachePolicy {
                    ttl: Duration::from_secs(60 * 60),
                    stale_while_revalidate: true,
                }),
                breaker: Some(BreakerOptions {
                    failure_threshold: 3,
                    reset_timeout: Duration::from_secs(60),
                    ..BreakerOptions::default()
                }),
                proxies: Vec::new(),
            },
            ServiceConfig {
                id: "usgs".to_owned(),
                base_url: "https://earthquake.usgs.gov".to_owned(),
                timeout: Duration::from_secs(10),
                retries: 2,
                cache: Some(CachePolicy {
                    ttl: Duration::from_secs(5 * 60),
                    stale_while_revalidate: true,
                }),
                breaker: Some(BreakerOptions {
                    failure_threshold: 3,
                    reset_timeout: Duration::from_secs(60),
                    ..BreakerOptions::default()
                }),
                proxies: Vec::new(),
            },
            // proxy fan-out already provides fallback, so retry less and
            // tolerate more failures before breaking
            ServiceConfig {
                id: CORS_PROXY_SERVICE.to_owned(),
                base_url: String::new(),
                timeout: Duration::from_secs(12),
                retries: 1,
                cache: Some(CachePolicy {
                    ttl: Duration::from_secs(5 * 60),
                    stale_while_revalidate: true,
                }),
                breaker: Some(BreakerOptions {
                    failure_threshold: 5,
                    reset_timeout: Duration::from_secs(120),
                    ..BreakerOptions::default()
                }),
                proxies: vec![
                    "https://situation-monitor-proxy.seanthielen-e.workers.dev/?url=".to_owned(),
                    "https://api.allorigins.win/raw?url=".to_owned(),
                ],
            },
        ])
    }

    /// Looks up the configuration for `service_id`.
    #[must_use]
    pub fn get(&self, service_id: &str) -> Option<&ServiceConfig> {
        self.services.get(service_id)
    }

    /// Whether `service_id` is registered.
    #[must_use]
    pub fn has(&self, service_id: &str) -> bool {
        self.services.contains_key(service_id)
    }

    /// All registered configurations.
    #[must_use]
    pub fn get_all(&self) -> Vec<&ServiceConfig> {
        self.services.values().collect()
    }

    /// All registered service identifiers.
    #[must_use]
    pub fn service_ids(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    /// The ordered proxy front-end list, empty when no proxy pseudo-service
    /// is registered.
    #[must_use]
    pub fn cors_proxies(&self) -> &[String] {
        self.services
            .get(CORS_PROXY_SERVICE)
            .map_or(&[], |config| config.proxies.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_registers_the_five_services() {
        let registry = ServiceRegistry::builtin();

        for id in ["gdelt", "coingecko", "fred", "usgs", "cors_proxy"] {
            assert!(registry.has(id), "{id} missing");
        }
        assert_eq!(registry.get_all().len(), 5);
        assert_eq!(registry.service_ids().len(), 5);
    }

    #[test]
    fn unknown_service_lookup_returns_none() {
        let registry = ServiceRegistry::builtin();
        assert!(registry.get("nope").is_none());
        assert!(!registry.has("nope"));
    }

    #[test]
    fn coingecko_disables_stale_while_revalidate() {
        let registry = ServiceRegistry::builtin();
        let cache = registry.get("coingecko").unwrap().cache.as_ref().unwrap();

        assert!(!cache.stale_while_revalidate);
        assert_eq!(cache.ttl, Duration::from_secs(60));
    }

    #[test]
    fn proxy_list_is_ordered() {
        let registry = ServiceRegistry::builtin();
        let proxies = registry.cors_proxies();

        assert_eq!(proxies.len(), 2);
        assert!(proxies[0].contains("workers.dev"));
    }

    #[test]
    fn custom_registries_carry_their_own_services() {
        let registry = ServiceRegistry::new([ServiceConfig {
            id: "local".to_owned(),
            base_url: "http://localhost:8080".to_owned(),
            timeout: Duration::from_secs(1),
            retries: 0,
            cache: None,
            breaker: None,
            proxies: Vec::new(),
        }]);

        assert!(registry.has("local"));
        assert!(registry.cors_proxies().is_empty());
    }
}
