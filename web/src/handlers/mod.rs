//! HTTP request handlers, organized by component.

pub mod auth;
pub mod health;
pub mod pricing;
pub mod protected;
pub mod queue;

pub use health::health_check;
