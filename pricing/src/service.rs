//! Pricing service.
//!
//! [`PricingService`] owns the published rule sets. Every mutation goes to
//! the repository first and then republishes from it, so the engine never
//! holds a rule the store does not.

use crate::config::PricingConfig;
use crate::engine::{Evaluation, RulesEngine};
use crate::environment::PricingEnvironment;
use crate::error::{PricingError, Result};
use crate::expr;
use crate::model::{CalculatePriceRequest, PriceQuote, Rule, RuleInput, new_rule_id};
use crate::providers::{RuleRepository, RuleScope};
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use std::sync::Arc;
use travio_core::environment::Clock;
use travio_runtime::Worker;

/// Rules inserted into an empty rule table.
#[must_use]
pub fn default_rules() -> Vec<RuleInput> {
    vec![
        RuleInput::new(
            "Weekend Surge",
            r#"day_of_week == "Saturday" || day_of_week == "Sunday""#,
            1.20,
            10,
        )
        .with_description("20% surge on weekends"),
        RuleInput::new("Early Bird Discount", "days_until_departure > 30", 0.85, 20)
            .with_description("15% off when booking more than 30 days ahead"),
        RuleInput::new("Last Minute Surge", "days_until_departure < 3", 1.50, 5)
            .with_description("50% surge within 3 days of departure"),
        RuleInput::new("High Demand Surge", "occupancy_rate > 0.8", 1.25, 15)
            .with_description("25% surge above 80% occupancy"),
        RuleInput::new("Business Class Premium", r#"seat_class == "business""#, 1.40, 1)
            .with_description("40% premium for business class"),
    ]
}

/// Pricing service over a rule repository.
pub struct PricingService<R, C> {
    repository: R,
    clock: C,
    engine: RulesEngine,
    config: PricingConfig,
}

impl<R, C> PricingService<R, C>
where
    R: RuleRepository,
    C: Clock,
{
    /// Create the service with no rules published; call
    /// [`PricingService::load`] before serving.
    #[must_use]
    pub fn new(repository: R, clock: C, config: PricingConfig) -> Self {
        Self {
            repository,
            clock,
            engine: RulesEngine::new(),
            config,
        }
    }

    /// The published rule sets.
    #[must_use]
    pub const fn engine(&self) -> &RulesEngine {
        &self.engine
    }

    /// Seed the default rules if configured and the table is empty, then
    /// publish.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Database`] if the repository fails.
    pub async fn load(&self) -> Result<()> {
        if self.config.seed_defaults && self.repository.count().await? == 0 {
            self.seed_defaults().await?;
        }
        self.reload().await?;
        Ok(())
    }

    async fn seed_defaults(&self) -> Result<()> {
        let now = self.clock.now();
        let defaults = default_rules();
        let seeded = defaults.len();
        for input in defaults {
            self.repository.create(&input.into_rule(new_rule_id(), now)).await?;
        }
        tracing::info!(rules = seeded, "Seeded default pricing rules");
        Ok(())
    }

    /// Read every active rule and publish. Returns the number of global
    /// rules now live.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Database`] if the repository fails; the
    /// previous rule sets stay published.
    pub async fn reload(&self) -> Result<usize> {
        let rules = self.repository.list(&RuleScope::All, false).await?;
        self.engine.publish(&rules);
        Ok(self.engine.global_rule_count())
    }

    /// Price a request against its organization's rule set.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Validation`] for a quantity below 1, a
    /// negative base price, an occupancy outside `0..=1`, or a total that
    /// overflows.
    pub fn calculate_price(&self, request: &CalculatePriceRequest) -> Result<PriceQuote> {
        validate_request(request)?;

        let organization_id = request.organization_id.as_deref().filter(|org| !org.is_empty());
        let ruleset = self.engine.ruleset_for(organization_id);
        let mut env = build_environment(request, self.clock.now());
        let Evaluation {
            final_price,
            applied,
        } = ruleset.evaluate(request.base_price_paisa, &mut env);

        let total_price = final_price
            .checked_mul(request.quantity)
            .ok_or_else(|| PricingError::Validation("total price overflows".to_string()))?;

        tracing::debug!(
            base_price = request.base_price_paisa,
            unit_price = final_price,
            rules_applied = applied.len(),
            "Price calculated"
        );

        Ok(PriceQuote {
            base_price: request.base_price_paisa,
            unit_price: final_price,
            quantity: request.quantity,
            total_price,
            applied_rules: applied,
        })
    }

    /// List rules.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Database`] if the repository fails.
    pub async fn list_rules(&self, scope: &RuleScope, include_inactive: bool) -> Result<Vec<Rule>> {
        self.repository.list(scope, include_inactive).await
    }

    /// Fetch one rule.
    ///
    /// # Errors
    ///
    /// - [`PricingError::RuleNotFound`] if no rule has `id`
    /// - [`PricingError::Database`] if the repository fails
    pub async fn get_rule(&self, id: &str) -> Result<Rule> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| PricingError::RuleNotFound(id.to_string()))
    }

    /// Validate, store and publish a new rule.
    ///
    /// # Errors
    ///
    /// - [`PricingError::Validation`] or [`PricingError::Compile`] if the
    ///   rule is rejected by [`PricingService::validate_rule`]
    /// - [`PricingError::Database`] if the repository fails
    pub async fn create_rule(&self, input: RuleInput) -> Result<Rule> {
        let rule = input.into_rule(new_rule_id(), self.clock.now());
        self.validate_rule(&rule).await?;
        self.repository.create(&rule).await?;
        tracing::info!(rule_id = %rule.id, rule = %rule.name, "Pricing rule created");
        self.reload().await?;
        Ok(rule)
    }

    /// Replace a rule and publish.
    ///
    /// # Errors
    ///
    /// - [`PricingError::RuleNotFound`] if no rule has `id`
    /// - [`PricingError::Validation`] or [`PricingError::Compile`] if the
    ///   new version is rejected
    /// - [`PricingError::Database`] if the repository fails
    pub async fn update_rule(&self, id: &str, input: RuleInput) -> Result<Rule> {
        let existing = self.get_rule(id).await?;
        let mut rule = input.into_rule(existing.id, self.clock.now());
        rule.created_at = existing.created_at;
        self.validate_rule(&rule).await?;

        if !self.repository.update(&rule).await? {
            return Err(PricingError::RuleNotFound(id.to_string()));
        }
        tracing::info!(rule_id = %rule.id, rule = %rule.name, "Pricing rule updated");
        self.reload().await?;
        Ok(rule)
    }

    /// Delete a rule and publish.
    ///
    /// # Errors
    ///
    /// - [`PricingError::RuleNotFound`] if no rule has `id`
    /// - [`PricingError::Database`] if the repository fails
    pub async fn delete_rule(&self, id: &str) -> Result<()> {
        if !self.repository.delete(id).await? {
            return Err(PricingError::RuleNotFound(id.to_string()));
        }
        tracing::info!(rule_id = %id, "Pricing rule deleted");
        self.reload().await?;
        Ok(())
    }

    /// Check a rule before it is stored.
    ///
    /// Rejects an empty name, a multiplier that is not a positive finite
    /// number, a condition that does not compile, and a condition already
    /// used by another rule of the same organization.
    ///
    /// # Errors
    ///
    /// - [`PricingError::Validation`] for the field checks and duplicates
    /// - [`PricingError::Compile`] for a bad condition
    /// - [`PricingError::Database`] if the repository fails
    pub async fn validate_rule(&self, rule: &Rule) -> Result<()> {
        if rule.name.trim().is_empty() {
            return Err(PricingError::Validation("rule name is required".to_string()));
        }
        if !rule.multiplier.is_finite() || rule.multiplier <= 0.0 {
            return Err(PricingError::Validation(format!(
                "multiplier must be positive, got {}",
                rule.multiplier
            )));
        }
        expr::compile(&rule.condition)?;

        let scope = RuleScope::owned_by(rule.organization_id.as_deref());
        let siblings = self.repository.list(&scope, true).await?;
        if let Some(duplicate) = siblings
            .iter()
            .find(|other| other.id != rule.id && other.condition.trim() == rule.condition.trim())
        {
            return Err(PricingError::Validation(format!(
                "condition already used by rule '{}'",
                duplicate.name
            )));
        }
        Ok(())
    }
}

impl<R, C> PricingService<R, C>
where
    R: RuleRepository + 'static,
    C: Clock + 'static,
{
    /// Start the background job that republishes every `reload_interval`,
    /// picking up rules changed through other nodes.
    #[must_use]
    pub fn spawn_reload(self: &Arc<Self>) -> Worker {
        let service = Arc::clone(self);
        let interval = self.config.reload_interval;

        Worker::spawn("pricing-reload", move |cancel| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = service.reload().await {
                            tracing::error!(error = %e, "Pricing rule reload failed");
                        }
                    }
                }
            }
        })
    }
}

fn validate_request(request: &CalculatePriceRequest) -> Result<()> {
    if request.quantity < 1 {
        return Err(PricingError::Validation("quantity must be at least 1".to_string()));
    }
    if request.base_price_paisa < 0 {
        return Err(PricingError::Validation("base price cannot be negative".to_string()));
    }
    if !(0.0..=1.0).contains(&request.occupancy_rate) {
        return Err(PricingError::Validation(
            "occupancy rate must be between 0 and 1".to_string(),
        ));
    }
    Ok(())
}

/// Environment for `request` as seen at `now`.
///
/// `days_until_departure` counts whole days from `now` to the start of the
/// travel date and is clamped at zero; `hour`/`minute` come from the
/// departure time, or from `now` when it is absent.
#[must_use]
pub fn build_environment(request: &CalculatePriceRequest, now: DateTime<Utc>) -> PricingEnvironment {
    let travel_day = request.date.and_time(NaiveTime::MIN).and_utc();
    let at = request.departure_time.unwrap_or(now);

    PricingEnvironment {
        base_price: request.base_price_paisa,
        seat_class: request.seat_class.clone(),
        seat_category: request.seat_category.clone(),
        day_of_week: weekday_name(request.date.weekday()).to_string(),
        days_until_departure: (travel_day - now).num_days().max(0),
        occupancy_rate: request.occupancy_rate,
        quantity: request.quantity,
        is_holiday: request.is_holiday,
        hour: i64::from(at.hour()),
        minute: i64::from(at.minute()),
        trip_id: request.trip_id.clone(),
        route_id: request.route_id.clone(),
        schedule_id: request.schedule_id.clone(),
        from_station_id: request.from_station_id.clone(),
        to_station_id: request.to_station_id.clone(),
        vehicle_type: request.vehicle_type.clone(),
        vehicle_class: request.vehicle_class.clone(),
        promo_code: request.promo_code.clone(),
    }
}

const fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::MockRuleRepository;
    use chrono::NaiveDate;
    use travio_testing::mocks::{ManualClock, test_clock};

    fn service() -> (PricingService<MockRuleRepository, ManualClock>, MockRuleRepository) {
        let repo = MockRuleRepository::new();
        let clock = ManualClock::starting_at(test_clock().now());
        let service = PricingService::new(repo.clone(), clock, PricingConfig::default());
        (service, repo)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn environment_from_request() {
        let now = test_clock().now(); // Wednesday 2025-01-01 00:00
        let mut request = CalculatePriceRequest::new(50_000, date(2025, 2, 15));
        request.departure_time = Some(date(2025, 2, 15).and_hms_opt(21, 30, 0).unwrap().and_utc());

        let env = build_environment(&request, now);
        assert_eq!(env.day_of_week, "Saturday");
        assert_eq!(env.days_until_departure, 45);
        assert_eq!((env.hour, env.minute), (21, 30));

        let past = CalculatePriceRequest::new(50_000, date(2024, 12, 1));
        let env = build_environment(&past, now);
        assert_eq!(env.days_until_departure, 0);
        assert_eq!(env.day_of_week, "Sunday");
        assert_eq!(env.hour, 0);
    }

    #[tokio::test]
    async fn load_seeds_defaults_once() {
        let (service, repo) = service();
        service.load().await.unwrap();
        service.load().await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 5);
        assert_eq!(service.engine().global_rule_count(), 5);
    }

    #[tokio::test]
    async fn load_without_seeding_publishes_nothing() {
        let repo = MockRuleRepository::new();
        let service = PricingService::new(
            repo,
            test_clock(),
            PricingConfig::default().with_seed_defaults(false),
        );
        service.load().await.unwrap();
        assert_eq!(service.engine().global_rule_count(), 0);
    }

    #[test]
    fn request_validation() {
        let (service, _) = service();
        let mut request = CalculatePriceRequest::new(1_000, date(2025, 3, 1));

        request.quantity = 0;
        assert!(matches!(service.calculate_price(&request), Err(PricingError::Validation(_))));

        request.quantity = 1;
        request.occupancy_rate = 1.5;
        assert!(matches!(service.calculate_price(&request), Err(PricingError::Validation(_))));

        request.occupancy_rate = 0.5;
        request.base_price_paisa = -1;
        assert!(matches!(service.calculate_price(&request), Err(PricingError::Validation(_))));
    }

    #[tokio::test]
    async fn validate_rule_rejections() {
        let (service, _) = service();
        service.load().await.unwrap();
        let now = test_clock().now();

        let zero = RuleInput::new("Free", "true", 0.0, 1).into_rule(new_rule_id(), now);
        assert!(matches!(service.validate_rule(&zero).await, Err(PricingError::Validation(_))));

        let bad = RuleInput::new("Bad", "seat == 1", 1.1, 1).into_rule(new_rule_id(), now);
        assert!(matches!(service.validate_rule(&bad).await, Err(PricingError::Compile(_))));

        let duplicate = RuleInput::new("Again", "days_until_departure > 30", 0.9, 1)
            .into_rule(new_rule_id(), now);
        assert!(matches!(
            service.validate_rule(&duplicate).await,
            Err(PricingError::Validation(msg)) if msg.contains("Early Bird Discount")
        ));

        // The same condition is fine for an organization.
        let scoped = RuleInput::new("Again", "days_until_departure > 30", 0.9, 1)
            .with_organization("org-a")
            .into_rule(new_rule_id(), now);
        service.validate_rule(&scoped).await.unwrap();
    }

    #[tokio::test]
    async fn mutation_failure_keeps_published_rules() {
        let (service, repo) = service();
        service.load().await.unwrap();

        repo.set_unavailable(true);
        let err = service
            .create_rule(RuleInput::new("Night", "hour >= 22", 1.1, 3))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), travio_core::ErrorKind::ProviderUnavailable);
        assert_eq!(service.engine().global_rule_count(), 5);
    }

    #[tokio::test]
    async fn unknown_rule_is_not_found() {
        let (service, _) = service();
        assert!(matches!(service.delete_rule("nope").await, Err(PricingError::RuleNotFound(_))));
        assert!(matches!(
            service.update_rule("nope", RuleInput::new("X", "true", 1.0, 1)).await,
            Err(PricingError::RuleNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_worker_picks_up_external_changes() {
        let repo = MockRuleRepository::new();
        let config = PricingConfig::default()
            .with_seed_defaults(false)
            .with_reload_interval(std::time::Duration::from_secs(60));
        let service = Arc::new(PricingService::new(repo.clone(), test_clock(), config));
        service.load().await.unwrap();
        let worker = service.spawn_reload();

        repo.create(&RuleInput::new("Night", "hour >= 22", 1.1, 3).into_rule(new_rule_id(), test_clock().now()))
            .await
            .unwrap();
        assert_eq!(service.engine().global_rule_count(), 0);

        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        assert_eq!(service.engine().global_rule_count(), 1);

        worker.stop().await;
    }
}
