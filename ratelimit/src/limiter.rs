//! Sliding-window and tiered checks over a [`RateLimitStore`].

use crate::config::{EndpointCosts, RateLimitConfig, TIERED_WINDOW, TierTable};
use crate::error::{RateLimitError, Result};
use crate::providers::{Acquire, RateLimitStore};
use crate::tier::Tier;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use travio_core::environment::Clock;

/// Tier label of keys checked by the plain sliding-window limiter.
pub const GLOBAL_LABEL: &str = "global";

/// Cache key of a window: `ratelimit:<label>:<identity>`.
#[must_use]
pub fn window_key(label: &str, identity: &str) -> String {
    format!("ratelimit:{label}:{identity}")
}

/// Result of a rate-limit check, carrying everything the response headers
/// need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Effective limit of the window.
    pub limit: u64,
    /// Budget left after this request.
    pub remaining: u64,
    /// When the window resets.
    pub reset_at: DateTime<Utc>,
    /// Seconds a denied client should wait.
    pub retry_after_secs: u64,
    /// Tier of a tiered check.
    pub tier: Option<Tier>,
}

impl Decision {
    /// Turn a denial into [`RateLimitError::Exceeded`].
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Exceeded`] when the request was denied.
    pub fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(RateLimitError::Exceeded {
                limit: self.limit,
                reset_at: self.reset_at,
            })
        }
    }
}

/// Rate limiter.
///
/// Two styles share one store:
///
/// - [`check`](Self::check): every request costs 1 against a caller-chosen
///   budget and window
/// - [`check_tiered`](Self::check_tiered): the budget comes from the tier
///   table, the cost from the endpoint table, the window is one minute
///
/// # Example
///
/// ```rust,ignore
/// let limiter = RateLimiter::new(store, SystemClock);
/// let decision = limiter.check_tiered("user:42", Tier::Free, "/v1/holds").await?;
/// if !decision.allowed {
///     // 429
/// }
/// ```
pub struct RateLimiter<S, C> {
    store: S,
    clock: C,
    tiers: TierTable,
    costs: EndpointCosts,
    seq: AtomicU64,
}

impl<S: RateLimitStore, C: Clock> RateLimiter<S, C> {
    /// Create a limiter with the default tier and endpoint tables.
    #[must_use]
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            tiers: TierTable::default(),
            costs: EndpointCosts::default(),
            seq: AtomicU64::new(0),
        }
    }

    /// Replace the tier table.
    #[must_use]
    pub fn with_tiers(mut self, tiers: TierTable) -> Self {
        self.tiers = tiers;
        self
    }

    /// Replace the endpoint cost table.
    #[must_use]
    pub fn with_costs(mut self, costs: EndpointCosts) -> Self {
        self.costs = costs;
        self
    }

    /// Tier table in use.
    #[must_use]
    pub const fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Plain sliding-window check of `identity` against `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Cache`] when the store fails; callers are
    /// expected to fail open.
    pub async fn check(&self, identity: &str, config: &RateLimitConfig) -> Result<Decision> {
        let key = window_key(GLOBAL_LABEL, identity);
        self.acquire(&key, config.requests, 1, config.window, None)
            .await
    }

    /// Tiered check of `identity` calling `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Cache`] when the store fails.
    pub async fn check_tiered(&self, identity: &str, tier: Tier, path: &str) -> Result<Decision> {
        let budget = self.tiers.get(tier);
        let cost = budget.request_cost(self.costs.cost_for(path));
        let key = window_key(tier.as_str(), identity);
        self.acquire(&key, budget.effective_limit(), cost, TIERED_WINDOW, Some(tier))
            .await
    }

    /// Usage of a window key right now.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Cache`] when the store fails.
    pub async fn usage(&self, key: &str, window: Duration) -> Result<u64> {
        self.store.usage(key, window, self.clock.now()).await
    }

    /// Clear a window key.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Cache`] when the store fails.
    pub async fn reset(&self, key: &str) -> Result<()> {
        self.store.reset(key).await?;
        tracing::info!(key = %key, "Rate limit window reset");
        Ok(())
    }

    async fn acquire(
        &self,
        key: &str,
        limit: u64,
        cost: u64,
        window: Duration,
        tier: Option<Tier>,
    ) -> Result<Decision> {
        let now = self.clock.now();
        let member = self.member(now, cost);
        let state = self
            .store
            .acquire(
                &Acquire {
                    key,
                    member: &member,
                    cost,
                    limit,
                    window,
                },
                now,
            )
            .await?;

        let outcome = if state.allowed { "allowed" } else { "denied" };
        metrics::counter!("rate_limit.checks", "outcome" => outcome).increment(1);

        let remaining = if state.allowed {
            limit.saturating_sub(state.used + cost)
        } else {
            tracing::debug!(key = %key, used = state.used, cost, limit, "Rate limit exceeded");
            0
        };

        Ok(Decision {
            allowed: state.allowed,
            limit,
            remaining,
            reset_at: now + TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            retry_after_secs: window.as_secs() + u64::from(window.subsec_nanos() > 0),
            tier,
        })
    }

    fn member(&self, now: DateTime<Utc>, cost: u64) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros());
        format!("{nanos}-{seq}:{cost}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::TierConfig;
    use crate::mocks::MockRateLimitStore;
    use travio_testing::mocks::{ManualClock, test_clock};

    fn limiter() -> (RateLimiter<MockRateLimitStore, ManualClock>, ManualClock) {
        let clock = ManualClock::starting_at(test_clock().now());
        (RateLimiter::new(MockRateLimitStore::new(), clock.clone()), clock)
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let (limiter, _) = limiter();
        let config = RateLimitConfig::new(3, Duration::from_secs(1));

        let remaining: Vec<u64> = [
            limiter.check("ip:1", &config).await.unwrap(),
            limiter.check("ip:1", &config).await.unwrap(),
            limiter.check("ip:1", &config).await.unwrap(),
        ]
        .iter()
        .map(|d| d.remaining)
        .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check("ip:1", &config).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after_secs, 1);
        assert!(denied.into_result().is_err());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (limiter, _) = limiter();
        let config = RateLimitConfig::new(1, Duration::from_secs(60));
        assert!(limiter.check("ip:1", &config).await.unwrap().allowed);
        assert!(limiter.check("ip:2", &config).await.unwrap().allowed);
        assert!(!limiter.check("ip:1", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn tiered_cost_is_weighed_against_the_limit() {
        let (limiter, _) = limiter();
        let limiter =
            limiter.with_tiers(TierTable::new().with_tier(Tier::Free, TierConfig::new(10, 2)));

        let first = limiter.check_tiered("user:1", Tier::Free, "/v1/orders").await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.limit, 12);
        assert_eq!(first.remaining, 2);
        assert_eq!(first.tier, Some(Tier::Free));

        assert!(!limiter.check_tiered("user:1", Tier::Free, "/v1/holds").await.unwrap().allowed);
        assert!(limiter.check_tiered("user:1", Tier::Free, "/v1/trips/x/seatmap").await.unwrap().allowed);
        let usage = limiter
            .usage(&window_key("free", "user:1"), TIERED_WINDOW)
            .await
            .unwrap();
        assert_eq!(usage, 12);
    }

    #[tokio::test]
    async fn tiers_have_separate_windows() {
        let (limiter, _) = limiter();
        let limiter = limiter.with_tiers(
            TierTable::new()
                .with_tier(Tier::Anonymous, TierConfig::new(1, 0))
                .with_tier(Tier::Free, TierConfig::new(1, 0)),
        );
        assert!(limiter.check_tiered("x", Tier::Anonymous, "/").await.unwrap().allowed);
        assert!(limiter.check_tiered("x", Tier::Free, "/").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let (limiter, _) = limiter();
        let config = RateLimitConfig::new(1, Duration::from_secs(60));
        limiter.check("ip:1", &config).await.unwrap();
        limiter.reset(&window_key(GLOBAL_LABEL, "ip:1")).await.unwrap();
        assert!(limiter.check("ip:1", &config).await.unwrap().allowed);
    }

    #[test]
    fn members_are_unique_per_instant() {
        let (limiter, clock) = limiter();
        let now = clock.now();
        assert_ne!(limiter.member(now, 1), limiter.member(now, 1));
        assert!(limiter.member(now, 5).ends_with(":5"));
    }
}
