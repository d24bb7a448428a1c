//! # Travio Identity
//!
//! Password authentication with short-lived access tokens and single-use
//! refresh tokens grouped into rotation families.
//!
//! ## Features
//!
//! - **Argon2id** password hashing with tunable work factors
//! - **HS256 JWTs** signed with separate access and refresh keys
//! - **Reuse detection**: replaying any revoked refresh token revokes the
//!   whole family, ending the session for both the thief and the victim
//! - **Access-token blacklist** for explicit logout
//! - **Pluggable providers**: PostgreSQL and Redis in production, in-memory
//!   mocks for tests
//!
//! ## Architecture
//!
//! ```text
//! Gateway ──► AuthService ──► UserRepository
//!                         ├─► RefreshTokenRepository (rotate = CAS + insert)
//!                         └─► TokenBlacklist
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use travio_identity::*;
//!
//! let service = AuthService::new(config, users, refresh_tokens, blacklist, SystemClock)?;
//! service.register("alice@example.com", "correct horse", None).await?;
//!
//! let pair = service.login("alice@example.com", "correct horse", &client).await?;
//! let next = service.refresh_tokens(&pair.refresh_token, &client).await?;
//!
//! // Replaying the first refresh token now ends the session.
//! assert_eq!(
//!     service.refresh_tokens(&pair.refresh_token, &client).await,
//!     Err(IdentityError::RefreshReused)
//! );
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod error;
pub mod model;
pub mod password;
pub mod providers;
pub mod service;
pub mod stores;
pub mod tokens;
pub mod utils;

// Mock providers (for testing)
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-exports
pub use config::{IdentityConfig, PasswordHashingConfig};
pub use error::{IdentityError, Result};
pub use model::{ClientInfo, RefreshTokenRecord, Role, SessionInfo, TokenPair, User, UserId};
pub use service::AuthService;
pub use tokens::{AccessClaims, RefreshClaims, TokenIssuer};
