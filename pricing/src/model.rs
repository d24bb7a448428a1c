//! Pricing rules and price quotes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored pricing rule.
///
/// `organization_id = None` marks a global rule. An organization's
/// effective rule set is the global set with same-named organization rules
/// replacing globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule id (UUID string).
    pub id: String,
    /// Owning organization, `None` for global rules.
    pub organization_id: Option<String>,
    /// Display name; also the override key within an organization.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Boolean condition in the rule language.
    pub condition: String,
    /// Factor applied to the running price when the condition holds.
    pub multiplier: f64,
    /// Lower runs earlier.
    pub priority: i32,
    /// Inactive rules are stored but never evaluated.
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Whether the rule belongs to `organization_id` (`None` = global).
    #[must_use]
    pub fn is_scoped_to(&self, organization_id: Option<&str>) -> bool {
        self.organization_id.as_deref() == organization_id
    }
}

/// Input for creating or replacing a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleInput {
    /// Owning organization, `None` for a global rule.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Condition source.
    pub condition: String,
    /// Price factor, must be positive.
    pub multiplier: f64,
    /// Evaluation order.
    #[serde(default)]
    pub priority: i32,
    /// Whether the rule is evaluated.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl RuleInput {
    /// A new active global rule.
    #[must_use]
    pub fn new(name: impl Into<String>, condition: impl Into<String>, multiplier: f64, priority: i32) -> Self {
        Self {
            organization_id: None,
            name: name.into(),
            description: String::new(),
            condition: condition.into(),
            multiplier,
            priority,
            is_active: true,
        }
    }

    /// Scope the rule to an organization.
    #[must_use]
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set whether the rule is active.
    #[must_use]
    pub const fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Materialise into a stored rule.
    #[must_use]
    pub fn into_rule(self, id: String, now: DateTime<Utc>) -> Rule {
        Rule {
            id,
            organization_id: self.organization_id.filter(|org| !org.is_empty()),
            name: self.name,
            description: self.description,
            condition: self.condition,
            multiplier: self.multiplier,
            priority: self.priority,
            is_active: self.is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// New random rule id.
#[must_use]
pub fn new_rule_id() -> String {
    Uuid::new_v4().to_string()
}

/// A rule that fired during an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRule {
    /// Rule id.
    pub rule_id: String,
    /// Rule name.
    pub rule_name: String,
    /// Factor that was applied.
    pub multiplier: f64,
}

/// A price calculation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatePriceRequest {
    /// Base price of one seat in paisa.
    pub base_price_paisa: i64,
    /// Travel date.
    pub date: NaiveDate,
    /// Departure instant; supplies `hour`/`minute` when present.
    #[serde(default)]
    pub departure_time: Option<DateTime<Utc>>,
    /// Number of seats.
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    /// Share of seats already sold, `0.0..=1.0`.
    #[serde(default)]
    pub occupancy_rate: f64,
    /// Organization whose rule set applies; global rules otherwise.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Whether the travel date is a holiday.
    #[serde(default)]
    pub is_holiday: bool,
    /// Seat class.
    #[serde(default)]
    pub seat_class: String,
    /// Seat category.
    #[serde(default)]
    pub seat_category: String,
    /// Trip id.
    #[serde(default)]
    pub trip_id: String,
    /// Route id.
    #[serde(default)]
    pub route_id: String,
    /// Schedule id.
    #[serde(default)]
    pub schedule_id: String,
    /// Origin station.
    #[serde(default)]
    pub from_station_id: String,
    /// Destination station.
    #[serde(default)]
    pub to_station_id: String,
    /// Vehicle type.
    #[serde(default)]
    pub vehicle_type: String,
    /// Vehicle class.
    #[serde(default)]
    pub vehicle_class: String,
    /// Promo code.
    #[serde(default)]
    pub promo_code: String,
}

const fn default_quantity() -> i64 {
    1
}

impl CalculatePriceRequest {
    /// A one-seat request for `date`.
    #[must_use]
    pub fn new(base_price_paisa: i64, date: NaiveDate) -> Self {
        Self {
            base_price_paisa,
            date,
            departure_time: None,
            quantity: 1,
            occupancy_rate: 0.0,
            organization_id: None,
            is_holiday: false,
            seat_class: String::new(),
            seat_category: String::new(),
            trip_id: String::new(),
            route_id: String::new(),
            schedule_id: String::new(),
            from_station_id: String::new(),
            to_station_id: String::new(),
            vehicle_type: String::new(),
            vehicle_class: String::new(),
            promo_code: String::new(),
        }
    }
}

/// The priced result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Base price of one seat.
    pub base_price: i64,
    /// Price of one seat after rules.
    pub unit_price: i64,
    /// Seats priced.
    pub quantity: i64,
    /// `unit_price × quantity`.
    pub total_price: i64,
    /// Rules that fired, in evaluation order.
    pub applied_rules: Vec<AppliedRule>,
}
