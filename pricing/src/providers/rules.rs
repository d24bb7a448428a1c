//! Rule storage.

use crate::error::Result;
use crate::model::Rule;
use std::future::Future;

/// Which rules a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    /// Global and organization rules alike.
    All,
    /// Rules with no organization.
    Global,
    /// Rules owned by one organization.
    Organization(String),
}

impl RuleScope {
    /// Scope of rules owned by `organization_id` (`None` = global).
    #[must_use]
    pub fn owned_by(organization_id: Option<&str>) -> Self {
        organization_id.map_or(Self::Global, |org| Self::Organization(org.to_string()))
    }

    /// Whether `rule` falls in this scope.
    #[must_use]
    pub fn contains(&self, rule: &Rule) -> bool {
        match self {
            Self::All => true,
            Self::Global => rule.organization_id.is_none(),
            Self::Organization(org) => rule.organization_id.as_deref() == Some(org.as_str()),
        }
    }
}

/// Repository for pricing rules.
///
/// Listings are ordered by priority ascending, then by creation time.
pub trait RuleRepository: Send + Sync {
    /// List rules in `scope`, optionally including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Database` if the store fails.
    fn list(&self, scope: &RuleScope, include_inactive: bool)
    -> impl Future<Output = Result<Vec<Rule>>> + Send;

    /// Fetch one rule.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Database` if the store fails.
    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Rule>>> + Send;

    /// Insert a rule.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Database` if the store fails.
    fn create(&self, rule: &Rule) -> impl Future<Output = Result<()>> + Send;

    /// Replace a rule's mutable fields. Returns `false` if no rule has
    /// `rule.id`.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Database` if the store fails.
    fn update(&self, rule: &Rule) -> impl Future<Output = Result<bool>> + Send;

    /// Delete a rule. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Database` if the store fails.
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Number of stored rules, active or not.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Database` if the store fails.
    fn count(&self) -> impl Future<Output = Result<u64>> + Send;
}
