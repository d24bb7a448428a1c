//! Waiting-room admission guard.
//!
//! Requests under a protected prefix must present an admission ticket in the
//! `X-Queue-Token` header or the `queue_token` query parameter. The ticket
//! is checked but not consumed; the admitted identity is forwarded in the
//! `X-Queue-User-ID` and `X-Queue-Event-ID` request headers and as a
//! [`Ticket`] extension.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use travio_queue::{QueueError, Ticket};

/// Header carrying the admission ticket.
pub const QUEUE_TOKEN_HEADER: &str = "X-Queue-Token";
/// Query parameter carrying the admission ticket.
pub const QUEUE_TOKEN_QUERY: &str = "queue_token";
/// Request header set to the admitted user.
pub const QUEUE_USER_ID_HEADER: &str = "X-Queue-User-ID";
/// Request header set to the admitted event.
pub const QUEUE_EVENT_ID_HEADER: &str = "X-Queue-Event-ID";

const JOIN_URL: &str = "/v1/queue/join";

/// Raw ticket string of an admitted request, for handlers that consume it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionToken(pub String);

#[derive(Debug, Serialize)]
struct QueueRequired {
    error: &'static str,
    message: &'static str,
    queue_url: &'static str,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    queue_token: Option<String>,
}

/// Reject protected requests that do not carry a live admission ticket.
pub async fn require_admission(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if !state.config.is_protected(req.uri().path()) {
        return next.run(req).await;
    }

    let Some(token) = ticket_from(&req) else {
        return (
            StatusCode::PRECONDITION_REQUIRED,
            Json(QueueRequired {
                error: "queue_required",
                message: "This event requires joining the queue first",
                queue_url: JOIN_URL,
            }),
        )
            .into_response();
    };

    let ticket = match state.queue.require_ticket(&token).await {
        Ok(ticket) => ticket,
        Err(QueueError::TicketInvalid | QueueError::TicketExpired) => {
            return AppError::new(
                StatusCode::FORBIDDEN,
                "token_invalid",
                "Queue token is invalid or expired".to_string(),
            )
            .into_response();
        }
        Err(e) => return AppError::from(e).into_response(),
    };

    forward_identity(&mut req, &ticket);
    req.extensions_mut().insert(AdmissionToken(token));
    req.extensions_mut().insert(ticket);
    next.run(req).await
}

fn ticket_from(req: &Request) -> Option<String> {
    let header = req
        .headers()
        .get(QUEUE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = header {
        return Some(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(query)| query.queue_token)
        .filter(|token| !token.is_empty())
}

fn forward_identity(req: &mut Request, ticket: &Ticket) {
    let headers = req.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&ticket.user_id) {
        headers.insert(QUEUE_USER_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&ticket.event_id) {
        headers.insert(QUEUE_EVENT_ID_HEADER, value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn header_wins_over_query() {
        let req = Request::builder()
            .uri("/v1/holds?queue_token=from-query")
            .header(QUEUE_TOKEN_HEADER, "from-header")
            .body(Body::empty())
            .unwrap();
        assert_eq!(ticket_from(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn query_parameter_is_accepted() {
        let req = Request::builder()
            .uri("/v1/orders?trip=9&queue_token=abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(ticket_from(&req).as_deref(), Some("abc"));
    }

    #[test]
    fn blank_tokens_count_as_missing() {
        let req = Request::builder()
            .uri("/v1/holds?queue_token=")
            .header(QUEUE_TOKEN_HEADER, "  ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(ticket_from(&req), None);
    }
}
