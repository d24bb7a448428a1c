//! Identity providers.
//!
//! Traits for every external dependency of the identity service. The
//! service depends only on these traits; `stores` holds the production
//! implementations (PostgreSQL, Redis) and `mocks` the in-memory ones.
//!
//! ```text
//! AuthService ──► UserRepository          (PostgreSQL: users)
//!             ├─► RefreshTokenRepository  (PostgreSQL: refresh_tokens)
//!             └─► TokenBlacklist          (Redis: identity:revoked:<jti>)
//! ```

pub mod blacklist;
pub mod refresh_token;
pub mod user;

pub use blacklist::TokenBlacklist;
pub use refresh_token::{RefreshTokenRepository, RotateOutcome};
pub use user::UserRepository;
