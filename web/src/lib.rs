//! HTTP gateway for the Travio backbone.
//!
//! One axum router fronts the identity, waiting-room, rate-limit and
//! pricing components. The components are generic over their stores; the
//! gateway sees them through the object-safe traits in [`backend`], so the
//! same router serves production stores and in-memory mocks.
//!
//! # Request Flow
//!
//! 1. **Trace** span and **request id** (`X-Request-ID`) are attached
//! 2. The request **deadline** starts
//! 3. A bearer token, if present, is **verified** and its claims stored
//! 4. The caller's **rate limit** budget is charged
//! 5. Protected paths require a live **admission ticket**
//! 6. The **handler** calls the component and maps errors through [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(
//!     Arc::new(auth_service),
//!     Arc::new(admission),
//!     Arc::new(limiter),
//!     Arc::new(pricing),
//!     GatewayConfig::default(),
//! );
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, travio_gateway::router(state)).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use backend::{AdmissionBackend, IdentityBackend, PricingBackend, RateLimitBackend};
pub use config::{GatewayConfig, RateLimitMode};
pub use error::AppError;
pub use extractors::{AdminUser, AuthUser, Client, ClientIp, MaybeAuthUser, RequestId, UserAgent};
pub use middleware::{REQUEST_ID_HEADER, request_id_layer};
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
