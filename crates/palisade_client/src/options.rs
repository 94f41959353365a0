// Copyright (c) Microsoft Corporation.

use std::collections::BTreeMap;
use std::time::Duration;

/// How a response body should be decoded into the result payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseKind {
    /// Parse the body as JSON (the default). Bodies whose content type says
    /// text or XML are carried as strings regardless.
    #[default]
    Json,
    /// Carry the body as a string without parsing.
    Text,
}

/// Per-call options for [`ServiceClient::request`][crate::ServiceClient::request].
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// Query parameters, keyed by name. The map is ordered so equivalent
    /// requests produce identical addresses and cache keys.
    pub params: BTreeMap<String, String>,
    /// Whether the cache may satisfy this call before the network is
    /// consulted. Successful responses are stored regardless, so a
    /// cache-bypassing call still refreshes the entry. Defaults to true.
    pub use_cache: bool,
    /// Retry budget override; defaults to the service configuration.
    pub retries: Option<u32>,
    /// Time budget override per attempt; defaults to the service
    /// configuration.
    pub timeout: Option<Duration>,
    /// `Accept` header override; defaults to `application/json`.
    pub accept: Option<String>,
    /// Body decoding; defaults to JSON.
    pub kind: ResponseKind,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            params: BTreeMap::new(),
            use_cache: true,
            retries: None,
            timeout: None,
            accept: None,
            kind: ResponseKind::Json,
        }
    }
}

impl RequestOptions {
    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Disables cache reads for this call, forcing the network path.
    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Overrides the retry budget for this call.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Overrides the per-attempt time budget for this call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
