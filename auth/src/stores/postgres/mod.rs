//! PostgreSQL stores for users and refresh-token records.
//!
//! Both repositories share one pool and one migration set; run
//! [`PostgresUserRepository::migrate`] once at startup.

mod refresh_token;
mod user;

pub use refresh_token::PostgresRefreshTokenRepository;
pub use user::PostgresUserRepository;
