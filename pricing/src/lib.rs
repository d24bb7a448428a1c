//! # Travio Pricing
//!
//! Dynamic pricing rules. Each rule is a boolean condition over a fixed
//! [`PricingEnvironment`] and a multiplier; rules that hold are applied in
//! ascending priority to the base price.
//!
//! Conditions are compiled and type-checked once, when rules are published,
//! and evaluated per request without touching the store.
//!
//! ## Example
//!
//! ```rust,ignore
//! use travio_pricing::*;
//!
//! let service = PricingService::new(repo, SystemClock, PricingConfig::default());
//! service.load().await?;
//!
//! let quote = service.calculate_price(&CalculatePriceRequest::new(100_000, date))?;
//! println!("{} ({} rules)", quote.total_price, quote.applied_rules.len());
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod expr;
pub mod model;
pub mod providers;
pub mod service;
pub mod stores;

// Mock repository (for testing)
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::PricingConfig;
pub use engine::{CompiledRule, CompiledRuleSet, Evaluation, RulesEngine};
pub use environment::{Field, PricingEnvironment, Type};
pub use error::{PricingError, Result};
pub use expr::{CompileError, EvalError, Program, compile};
pub use model::{AppliedRule, CalculatePriceRequest, PriceQuote, Rule, RuleInput};
pub use providers::{RuleRepository, RuleScope};
pub use service::{PricingService, build_environment, default_rules};
