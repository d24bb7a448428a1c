//! Waiting-room endpoints under `/v1/queue`.

use crate::error::AppError;
use crate::extractors::{AdminUser, AuthUser};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use travio_queue::{JoinOutcome, JoinStatus, QueueConfig, QueueEntry, QueueError, QueueStats};

/// `POST /v1/queue/join` body.
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    /// Event to queue for.
    pub event_id: String,
    /// Client session; the access token's id when omitted.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Body or query naming an event.
#[derive(Debug, Deserialize)]
pub struct EventQuery {
    /// Event id.
    pub event_id: String,
}

/// `POST /v1/queue/validate` body.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// Admission ticket.
    pub token: String,
}

/// `POST /v1/queue/validate` response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidateResponse {
    /// Whether the ticket is live.
    pub valid: bool,
    /// Admitted user, when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Event the ticket admits to, when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Ticket expiry, when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Join an event's queue as the authenticated caller.
///
/// Returns 201 for a new entry and 200 when the caller was already queued
/// or admitted.
///
/// # Errors
///
/// 401 without a valid access token, 503 `queue_full` at capacity.
pub async fn join(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(body): Json<JoinRequest>,
) -> Result<(StatusCode, Json<JoinOutcome>), AppError> {
    if body.event_id.trim().is_empty() {
        return Err(AppError::bad_request("event_id is required"));
    }
    let session_id = body.session_id.unwrap_or_else(|| claims.jti.clone());

    let outcome = state.queue.join(&body.event_id, &claims.sub, &session_id).await?;
    let status = match outcome.status {
        JoinStatus::New => StatusCode::CREATED,
        JoinStatus::Existing => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// The caller's entry, with its current position or admission ticket.
///
/// # Errors
///
/// 404 `not_in_queue` when the caller has no live entry.
pub async fn position(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<EventQuery>,
) -> Result<Json<QueueEntry>, AppError> {
    Ok(Json(state.queue.position(&query.event_id, &claims.sub).await?))
}

/// Leave an event's queue.
///
/// # Errors
///
/// 401 without a valid access token.
pub async fn leave(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(body): Json<EventQuery>,
) -> Result<StatusCode, AppError> {
    state.queue.leave(&body.event_id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check an admission ticket without consuming it.
///
/// # Errors
///
/// 503 when the queue store is unavailable; an invalid ticket is a
/// `valid: false` body, not an error.
pub async fn validate(
    State(state): State<AppState>,
    Json(body): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    match state.queue.require_ticket(&body.token).await {
        Ok(ticket) => Ok(Json(ValidateResponse {
            valid: true,
            user_id: Some(ticket.user_id),
            event_id: Some(ticket.event_id),
            expires_at: Some(ticket.expires_at),
        })),
        Err(QueueError::TicketInvalid | QueueError::TicketExpired) => Ok(Json(ValidateResponse {
            valid: false,
            user_id: None,
            event_id: None,
            expires_at: None,
        })),
        Err(e) => Err(e.into()),
    }
}

/// Queue statistics of an event.
///
/// # Errors
///
/// 503 when the queue store is unavailable.
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Result<Json<QueueStats>, AppError> {
    Ok(Json(state.queue.stats(&query.event_id).await?))
}

/// Stored configuration of an event.
///
/// # Errors
///
/// 403 for non-administrators.
pub async fn get_config(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<EventQuery>,
) -> Result<Json<QueueConfig>, AppError> {
    Ok(Json(state.queue.config(&query.event_id).await?))
}

/// Replace an event's configuration and restart its admission worker.
///
/// # Errors
///
/// 403 for non-administrators, 400 for an invalid configuration.
pub async fn put_config(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(config): Json<QueueConfig>,
) -> Result<Json<QueueConfig>, AppError> {
    state.queue.configure(config.clone()).await?;
    tracing::info!(
        event_id = %config.event_id,
        admin = %admin.sub,
        batch_size = config.batch_size,
        enabled = config.enabled,
        "Queue reconfigured"
    );
    Ok(Json(config))
}
