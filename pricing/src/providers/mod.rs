//! Provider traits for pricing.

mod rules;

pub use rules::{RuleRepository, RuleScope};
