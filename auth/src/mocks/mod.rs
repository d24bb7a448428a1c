//! Mock provider implementations for testing.
//!
//! In-memory implementations of every identity provider trait, for unit and
//! integration tests and for running the gateway without infrastructure.

pub mod blacklist;
pub mod refresh_token;
pub mod user;

pub use blacklist::MockTokenBlacklist;
pub use refresh_token::MockRefreshTokenRepository;
pub use user::MockUserRepository;
