//! Pricing service configuration.

use std::time::Duration;

/// Pricing service configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    /// Insert the default rule set when the rule table is empty.
    ///
    /// Default: true
    pub seed_defaults: bool,

    /// Period of the background reload that picks up rules changed by
    /// other nodes.
    ///
    /// Default: 5 minutes
    pub reload_interval: Duration,
}

impl PricingConfig {
    /// Create a configuration.
    #[must_use]
    pub const fn new(seed_defaults: bool, reload_interval: Duration) -> Self {
        Self {
            seed_defaults,
            reload_interval,
        }
    }

    /// Set whether default rules are seeded.
    #[must_use]
    pub const fn with_seed_defaults(mut self, seed_defaults: bool) -> Self {
        self.seed_defaults = seed_defaults;
        self
    }

    /// Set the reload period.
    #[must_use]
    pub const fn with_reload_interval(mut self, reload_interval: Duration) -> Self {
        self.reload_interval = reload_interval;
        self
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self::new(true, Duration::from_secs(300))
    }
}
