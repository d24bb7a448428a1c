//! Shared state of the gateway handlers.

use crate::backend::{AdmissionBackend, IdentityBackend, PricingBackend, RateLimitBackend};
use crate::config::GatewayConfig;
use std::sync::Arc;
use travio_ratelimit::{RoleTierResolver, TierResolver};

/// Application state shared across all HTTP handlers.
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Registration, login and token validation.
    pub identity: Arc<dyn IdentityBackend>,
    /// Waiting room.
    pub queue: Arc<dyn AdmissionBackend>,
    /// Rate limiter.
    pub limiter: Arc<dyn RateLimitBackend>,
    /// Pricing rules engine.
    pub pricing: Arc<dyn PricingBackend>,
    /// Maps a caller's role to a rate-limit tier.
    pub tiers: Arc<dyn TierResolver>,
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// Create the state with the default role-to-tier mapping.
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityBackend>,
        queue: Arc<dyn AdmissionBackend>,
        limiter: Arc<dyn RateLimitBackend>,
        pricing: Arc<dyn PricingBackend>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            identity,
            queue,
            limiter,
            pricing,
            tiers: Arc::new(RoleTierResolver),
            config: Arc::new(config),
        }
    }

    /// Replace the tier resolver.
    #[must_use]
    pub fn with_tier_resolver(mut self, tiers: Arc<dyn TierResolver>) -> Self {
        self.tiers = tiers;
        self
    }
}
