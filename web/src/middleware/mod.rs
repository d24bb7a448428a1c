//! Gateway middleware, outermost first:
//!
//! ```text
//! TraceLayer ─► request id ─► timeout ─► authenticate ─► rate limit ─► admission ─► handler
//! ```
//!
//! Authentication only verifies a bearer token when one is sent; handlers
//! that need a caller use the [`AuthUser`](crate::extractors::AuthUser)
//! extractor.

mod admission;
mod auth;
mod rate_limit;
mod request_id;

pub use admission::{
    AdmissionToken, QUEUE_EVENT_ID_HEADER, QUEUE_TOKEN_HEADER, QUEUE_TOKEN_QUERY,
    QUEUE_USER_ID_HEADER, require_admission,
};
pub use auth::authenticate;
pub use rate_limit::{apply_rate_limit_headers, rate_limit};
pub use request_id::{REQUEST_ID_HEADER, RequestIdLayer, RequestIdMiddleware, request_id_layer};
