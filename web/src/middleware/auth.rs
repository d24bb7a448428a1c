//! Optional bearer authentication.

use crate::error::AppError;
use crate::extractors::bearer_token;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Verify the bearer token when one is present and store its
/// [`AccessClaims`](travio_identity::AccessClaims) in request extensions.
///
/// Requests without an `Authorization` header pass through anonymously; a
/// malformed, expired or revoked token is rejected with 401.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if !req.headers().contains_key(header::AUTHORIZATION) {
        return next.run(req).await;
    }

    let Some(token) = bearer_token(req.headers()) else {
        return AppError::unauthorized("Expected a bearer token").into_response();
    };

    match state.identity.validate(token).await {
        Ok(claims) => {
            tracing::debug!(user_id = %claims.sub, role = %claims.role, "Authenticated");
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::from(e).into_response()
        }
    }
}
