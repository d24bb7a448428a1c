//! Gateway configuration.

use std::time::Duration;
use travio_ratelimit::RateLimitConfig;

/// How the rate-limit middleware budgets requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitMode {
    /// Budget from the caller's tier, cost from the endpoint table.
    Tiered,
    /// One fixed budget per identity, every request costing 1.
    Global(RateLimitConfig),
    /// No rate limiting.
    Disabled,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Deadline of one request; exceeded requests get 408.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Path prefixes that require an admission ticket.
    ///
    /// Default: `/v1/holds`, `/v1/orders`
    pub protected_prefixes: Vec<String>,

    /// Rate-limit budgeting.
    ///
    /// Default: [`RateLimitMode::Tiered`]
    pub rate_limit: RateLimitMode,
}

impl GatewayConfig {
    /// Create a configuration.
    #[must_use]
    pub const fn new(
        request_timeout: Duration,
        protected_prefixes: Vec<String>,
        rate_limit: RateLimitMode,
    ) -> Self {
        Self {
            request_timeout,
            protected_prefixes,
            rate_limit,
        }
    }

    /// Set the request deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Replace the protected path prefixes.
    #[must_use]
    pub fn with_protected_prefixes<I, P>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.protected_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the rate-limit mode.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitMode) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Whether `path` needs an admission ticket.
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(30),
            vec!["/v1/holds".to_string(), "/v1/orders".to_string()],
            RateLimitMode::Tiered,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_prefixes_match_whole_segments() {
        let config = GatewayConfig::default();
        assert!(config.is_protected("/v1/holds"));
        assert!(config.is_protected("/v1/orders/123"));
        assert!(!config.is_protected("/v1/holdsx"));
        assert!(!config.is_protected("/v1/pricing/calculate"));
    }
}
