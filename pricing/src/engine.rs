//! Compiled rule sets and the published per-organization snapshot.
//!
//! ```text
//!   active rules ──► compile each once ──► global set (org = NULL)
//!                                      └─► per org: globals, same-named
//!                                          org rules replace in place,
//!                                          the rest appended
//!                                      └─► Snapshot ─swap─► RulesEngine
//! ```
//!
//! Readers clone the current `Arc<Snapshot>` under a short read lock and
//! evaluate without holding it, so a publish is seen entirely or not at all.

use crate::environment::PricingEnvironment;
use crate::expr::{self, Program};
use crate::model::{AppliedRule, Rule};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A rule whose condition compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Rule id.
    pub id: String,
    /// Rule name.
    pub name: String,
    /// Price factor.
    pub multiplier: f64,
    /// Evaluation order.
    pub priority: i32,
    program: Program,
}

impl CompiledRule {
    /// Compile one rule.
    ///
    /// # Errors
    ///
    /// Returns the [`expr::CompileError`] of its condition.
    pub fn compile(rule: &Rule) -> Result<Self, expr::CompileError> {
        Ok(Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            multiplier: rule.multiplier,
            priority: rule.priority,
            program: expr::compile(&rule.condition)?,
        })
    }

    /// The compiled condition.
    #[must_use]
    pub const fn program(&self) -> &Program {
        &self.program
    }
}

/// Outcome of evaluating a rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// `floor(base × Π multipliers)`.
    pub final_price: i64,
    /// Rules that fired, in evaluation order.
    pub applied: Vec<AppliedRule>,
}

/// Rules in ascending priority, ready to evaluate.
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    /// Order `rules` by priority. Equal priorities keep their input order.
    #[must_use]
    pub fn new(mut rules: Vec<CompiledRule>) -> Self {
        rules.sort_by_key(|rule| rule.priority);
        Self { rules }
    }

    /// Compile the active rules of `rules`; a rule that fails to compile is
    /// logged and left out.
    #[must_use]
    pub fn compile(rules: &[Rule]) -> Self {
        Self::new(rules.iter().filter_map(compile_logged).collect())
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Price `base_price` against `env`.
    ///
    /// Sets `env.base_price`, then multiplies the running price by every
    /// rule whose condition holds. A rule whose condition fails at runtime
    /// is skipped.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn evaluate(&self, base_price: i64, env: &mut PricingEnvironment) -> Evaluation {
        env.base_price = base_price;
        let mut price = base_price as f64;
        let mut applied = Vec::new();

        for rule in &self.rules {
            match rule.program.evaluate(env) {
                Ok(true) => {
                    price *= rule.multiplier;
                    applied.push(AppliedRule {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        multiplier: rule.multiplier,
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, rule = %rule.name, error = %e, "Rule skipped");
                }
            }
        }

        Evaluation {
            final_price: price.floor() as i64,
            applied,
        }
    }
}

fn compile_logged(rule: &Rule) -> Option<CompiledRule> {
    if !rule.is_active {
        return None;
    }
    match CompiledRule::compile(rule) {
        Ok(compiled) => {
            metrics::counter!("pricing.rules_compiled").increment(1);
            Some(compiled)
        }
        Err(e) => {
            metrics::counter!("pricing.rules_rejected").increment(1);
            tracing::error!(
                rule_id = %rule.id,
                rule = %rule.name,
                condition = %rule.condition,
                error = %e,
                "Rule failed to compile, excluded"
            );
            None
        }
    }
}

/// Everything one publish produced.
#[derive(Debug, Default)]
struct Snapshot {
    global: Arc<CompiledRuleSet>,
    organizations: HashMap<String, Arc<CompiledRuleSet>>,
}

impl Snapshot {
    fn build(rules: &[Rule]) -> Self {
        let mut global = Vec::new();
        let mut scoped: HashMap<&str, Vec<CompiledRule>> = HashMap::new();
        for rule in rules {
            let Some(compiled) = compile_logged(rule) else {
                continue;
            };
            match rule.organization_id.as_deref() {
                None => global.push(compiled),
                Some(org) => scoped.entry(org).or_default().push(compiled),
            }
        }

        let organizations = scoped
            .into_iter()
            .map(|(org, overrides)| {
                let mut merged = global.clone();
                for rule in overrides {
                    match merged.iter_mut().find(|existing| existing.name == rule.name) {
                        Some(existing) => *existing = rule,
                        None => merged.push(rule),
                    }
                }
                (org.to_string(), Arc::new(CompiledRuleSet::new(merged)))
            })
            .collect();

        Self {
            global: Arc::new(CompiledRuleSet::new(global)),
            organizations,
        }
    }
}

/// The live rule sets, replaced wholesale on every publish.
#[derive(Debug, Default)]
pub struct RulesEngine {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RulesEngine {
    /// An engine with no rules; every price passes through unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `rules` and atomically replace the published sets.
    pub fn publish(&self, rules: &[Rule]) {
        let snapshot = Arc::new(Snapshot::build(rules));
        tracing::info!(
            global_rules = snapshot.global.len(),
            organizations = snapshot.organizations.len(),
            "Published pricing rules"
        );
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Rule set for `organization_id`; organizations without their own
    /// rules get the global set.
    #[must_use]
    pub fn ruleset_for(&self, organization_id: Option<&str>) -> Arc<CompiledRuleSet> {
        let snapshot = Arc::clone(&*self.snapshot.read().unwrap_or_else(PoisonError::into_inner));
        organization_id
            .and_then(|org| snapshot.organizations.get(org))
            .map_or_else(|| Arc::clone(&snapshot.global), Arc::clone)
    }

    /// Number of published global rules.
    #[must_use]
    pub fn global_rule_count(&self) -> usize {
        self.ruleset_for(None).len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::RuleInput;
    use travio_core::environment::Clock;
    use travio_testing::mocks::test_clock;

    fn rule(id: &str, input: RuleInput) -> Rule {
        input.into_rule(id.to_string(), test_clock().now())
    }

    fn weekend_early_bird() -> Vec<Rule> {
        vec![
            rule(
                "early",
                RuleInput::new("Early Bird Discount", "days_until_departure > 30", 0.85, 20),
            ),
            rule(
                "weekend",
                RuleInput::new(
                    "Weekend Surge",
                    r#"day_of_week == "Saturday" || day_of_week == "Sunday""#,
                    1.20,
                    10,
                ),
            ),
        ]
    }

    fn saturday(days_out: i64) -> PricingEnvironment {
        PricingEnvironment {
            day_of_week: "Saturday".into(),
            days_until_departure: days_out,
            quantity: 1,
            ..PricingEnvironment::default()
        }
    }

    #[test]
    fn rules_compose_in_priority_order() {
        let set = CompiledRuleSet::compile(&weekend_early_bird());
        let result = set.evaluate(100_000, &mut saturday(45));

        assert_eq!(result.final_price, 102_000);
        let names: Vec<_> = result.applied.iter().map(|a| a.rule_name.as_str()).collect();
        assert_eq!(names, ["Weekend Surge", "Early Bird Discount"]);
    }

    #[test]
    fn bad_and_inactive_rules_are_excluded() {
        let mut rules = weekend_early_bird();
        rules.push(rule("broken", RuleInput::new("Broken", "seat > 1", 2.0, 0)));
        rules.push(rule(
            "off",
            RuleInput::new("Off", "true", 3.0, 0).with_active(false),
        ));

        let set = CompiledRuleSet::compile(&rules);
        assert_eq!(set.len(), 2);
        assert_eq!(set.evaluate(100_000, &mut saturday(45)).final_price, 102_000);
    }

    #[test]
    fn runtime_error_skips_only_that_rule() {
        let rules = vec![
            rule("div", RuleInput::new("Per Minute", "base_price / minute > 1", 2.0, 1)),
            rule("all", RuleInput::new("Always", "true", 1.5, 2)),
        ];
        let result = CompiledRuleSet::compile(&rules).evaluate(1_000, &mut saturday(0));
        assert_eq!(result.final_price, 1_500);
        assert_eq!(result.applied.len(), 1);
    }

    #[test]
    fn empty_set_returns_base_price() {
        let result = CompiledRuleSet::default().evaluate(12_345, &mut saturday(1));
        assert_eq!(result.final_price, 12_345);
        assert!(result.applied.is_empty());
    }

    #[test]
    fn organization_rules_override_by_name_and_append() {
        let mut rules = weekend_early_bird();
        rules.push(rule(
            "org-weekend",
            RuleInput::new("Weekend Surge", r#"day_of_week == "Saturday""#, 1.50, 10)
                .with_organization("org-a"),
        ));
        rules.push(rule(
            "org-extra",
            RuleInput::new("Holiday", "is_holiday", 2.0, 30).with_organization("org-a"),
        ));

        let engine = RulesEngine::new();
        engine.publish(&rules);

        let org = engine.ruleset_for(Some("org-a"));
        let ids: Vec<_> = org.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["org-weekend", "early", "org-extra"]);

        // Unknown organizations and global callers see the global set.
        assert_eq!(engine.ruleset_for(Some("org-b")).len(), 2);
        assert_eq!(engine.global_rule_count(), 2);
    }

    #[test]
    fn publish_replaces_the_whole_snapshot() {
        let engine = RulesEngine::new();
        engine.publish(&weekend_early_bird());
        let before = engine.ruleset_for(None);

        engine.publish(&[]);

        assert_eq!(before.len(), 2);
        assert!(engine.ruleset_for(None).is_empty());
    }
}
