//! In-memory rule repository for testing.

use crate::error::{PricingError, Result};
use crate::model::Rule;
use crate::providers::{RuleRepository, RuleScope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock rule repository.
#[derive(Debug, Clone, Default)]
pub struct MockRuleRepository {
    rules: Arc<Mutex<HashMap<String, Rule>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockRuleRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding `rules`.
    #[must_use]
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let repo = Self::new();
        if let Ok(mut map) = repo.rules.lock() {
            map.extend(rules.into_iter().map(|rule| (rule.id.clone(), rule)));
        }
        repo
    }

    /// Simulate a database outage: every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn with_rules_mut<T>(&self, f: impl FnOnce(&mut HashMap<String, Rule>) -> T) -> Result<T> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PricingError::Database("connection refused".to_string()));
        }
        let mut rules = self
            .rules
            .lock()
            .map_err(|_| PricingError::Database("mock rule repository poisoned".to_string()))?;
        Ok(f(&mut rules))
    }
}

impl RuleRepository for MockRuleRepository {
    async fn list(&self, scope: &RuleScope, include_inactive: bool) -> Result<Vec<Rule>> {
        self.with_rules_mut(|rules| {
            let mut listed: Vec<Rule> = rules
                .values()
                .filter(|rule| include_inactive || rule.is_active)
                .filter(|rule| scope.contains(rule))
                .cloned()
                .collect();
            listed.sort_by(|a, b| {
                (a.priority, a.created_at, &a.id).cmp(&(b.priority, b.created_at, &b.id))
            });
            listed
        })
    }

    async fn get(&self, id: &str) -> Result<Option<Rule>> {
        self.with_rules_mut(|rules| rules.get(id).cloned())
    }

    async fn create(&self, rule: &Rule) -> Result<()> {
        self.with_rules_mut(|rules| {
            if rules.contains_key(&rule.id) {
                return Err(PricingError::Database(format!("duplicate key: {}", rule.id)));
            }
            rules.insert(rule.id.clone(), rule.clone());
            Ok(())
        })?
    }

    async fn update(&self, rule: &Rule) -> Result<bool> {
        self.with_rules_mut(|rules| match rules.get_mut(&rule.id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = rule.clone();
                existing.created_at = created_at;
                true
            }
            None => false,
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.with_rules_mut(|rules| rules.remove(id).is_some())
    }

    async fn count(&self) -> Result<u64> {
        self.with_rules_mut(|rules| rules.len() as u64)
    }
}
