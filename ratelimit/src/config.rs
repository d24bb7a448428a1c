//! Limiter configuration: the plain window budget, the tier table and the
//! endpoint cost table.

use crate::error::{RateLimitError, Result};
use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Window used by tiered checks.
pub const TIERED_WINDOW: Duration = Duration::from_secs(60);

/// Budget for the plain sliding-window limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per window.
    pub requests: u64,
    /// Window length.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a budget of `requests` per `window`.
    #[must_use]
    pub const fn new(requests: u64, window: Duration) -> Self {
        Self { requests, window }
    }

    /// Set the request budget.
    #[must_use]
    pub const fn with_requests(mut self, requests: u64) -> Self {
        self.requests = requests;
        self
    }

    /// Set the window length.
    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Reject empty budgets and windows shorter than a millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        if self.requests == 0 {
            return Err(RateLimitError::InvalidConfig(
                "requests must be positive".to_string(),
            ));
        }
        if self.window < Duration::from_millis(1) {
            return Err(RateLimitError::InvalidConfig(
                "window must be at least 1ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

/// Budget of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Sustained requests per minute.
    pub requests_per_minute: u64,
    /// Extra headroom on top of the sustained rate.
    pub burst: u64,
    /// Applied to endpoint costs, rounded up.
    pub cost_multiplier: f64,
}

impl TierConfig {
    /// Create a tier budget with a cost multiplier of 1.
    #[must_use]
    pub const fn new(requests_per_minute: u64, burst: u64) -> Self {
        Self {
            requests_per_minute,
            burst,
            cost_multiplier: 1.0,
        }
    }

    /// Set the cost multiplier.
    #[must_use]
    pub const fn with_cost_multiplier(mut self, cost_multiplier: f64) -> Self {
        self.cost_multiplier = cost_multiplier;
        self
    }

    /// Limit enforced per window.
    #[must_use]
    pub const fn effective_limit(&self) -> u64 {
        self.requests_per_minute + self.burst
    }

    /// Cost of a request to an endpoint of weight `endpoint_cost`:
    /// `ceil(endpoint_cost × multiplier)`, never below 1.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )] // costs are small positive integers
    pub fn request_cost(&self, endpoint_cost: u64) -> u64 {
        let scaled = (endpoint_cost as f64 * self.cost_multiplier).ceil();
        if scaled.is_finite() && scaled >= 1.0 {
            scaled as u64
        } else {
            1
        }
    }

    fn validate(&self, tier: Tier) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(RateLimitError::InvalidConfig(format!(
                "tier {tier}: requests_per_minute must be positive"
            )));
        }
        if !self.cost_multiplier.is_finite() || self.cost_multiplier <= 0.0 {
            return Err(RateLimitError::InvalidConfig(format!(
                "tier {tier}: cost_multiplier must be positive"
            )));
        }
        Ok(())
    }
}

/// Budgets per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    tiers: HashMap<Tier, TierConfig>,
}

impl TierTable {
    const ANONYMOUS: TierConfig = TierConfig::new(30, 10);

    /// Empty table; every lookup falls back to the anonymous defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tiers: HashMap::new(),
        }
    }

    /// Set the budget of one tier.
    #[must_use]
    pub fn with_tier(mut self, tier: Tier, config: TierConfig) -> Self {
        self.tiers.insert(tier, config);
        self
    }

    /// Budget of `tier`, falling back to the anonymous budget.
    #[must_use]
    pub fn get(&self, tier: Tier) -> TierConfig {
        self.tiers
            .get(&tier)
            .or_else(|| self.tiers.get(&Tier::Anonymous))
            .copied()
            .unwrap_or(Self::ANONYMOUS)
    }

    /// Validate every configured tier.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`] naming the offending tier.
    pub fn validate(&self) -> Result<()> {
        for (tier, config) in &self.tiers {
            config.validate(*tier)?;
        }
        Ok(())
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::new()
            .with_tier(Tier::Anonymous, Self::ANONYMOUS)
            .with_tier(Tier::Free, TierConfig::new(60, 20))
            .with_tier(Tier::Premium, TierConfig::new(300, 50))
            .with_tier(Tier::Business, TierConfig::new(1000, 100))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum PathMatch {
    Prefix(String),
    Suffix(String),
}

impl PathMatch {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => path.ends_with(suffix.as_str()),
        }
    }
}

/// Relative weight of endpoints. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCosts {
    rules: Vec<(PathMatch, u64)>,
    default_cost: u64,
}

impl EndpointCosts {
    /// Table with no rules; every endpoint costs `default_cost`.
    #[must_use]
    pub const fn new(default_cost: u64) -> Self {
        Self {
            rules: Vec::new(),
            default_cost,
        }
    }

    /// Weight paths starting with `prefix`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>, cost: u64) -> Self {
        self.rules.push((PathMatch::Prefix(prefix.into()), cost));
        self
    }

    /// Weight paths ending with `suffix`.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>, cost: u64) -> Self {
        self.rules.push((PathMatch::Suffix(suffix.into()), cost));
        self
    }

    /// Weight of `path`.
    #[must_use]
    pub fn cost_for(&self, path: &str) -> u64 {
        self.rules
            .iter()
            .find(|(matcher, _)| matcher.matches(path))
            .map_or(self.default_cost, |(_, cost)| *cost)
    }
}

impl Default for EndpointCosts {
    fn default() -> Self {
        Self::new(1)
            .with_prefix("/v1/trips/search", 1)
            .with_suffix("/seatmap", 2)
            .with_prefix("/v1/holds", 5)
            .with_prefix("/v1/orders", 10)
    }
}
