//! Admission-protected placeholders for the booking flow.
//!
//! The real hold and order services sit behind the gateway; these handlers
//! answer with the identity the admission guard forwarded.

use crate::error::AppError;
use crate::middleware::AdmissionToken;
use crate::state::AppState;
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use travio_queue::Ticket;

/// Echo of an admitted request.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admission {
    /// `"held"` or `"ordered"`.
    pub status: String,
    /// Admitted user.
    pub user_id: String,
    /// Event admitted to.
    pub event_id: String,
    /// Ticket expiry.
    pub expires_at: DateTime<Utc>,
}

impl Admission {
    fn new(status: &str, ticket: Ticket) -> Self {
        Self {
            status: status.to_string(),
            user_id: ticket.user_id,
            event_id: ticket.event_id,
            expires_at: ticket.expires_at,
        }
    }
}

/// `POST /v1/holds`: the ticket stays valid for the order that follows.
#[allow(clippy::unused_async)]
pub async fn create_hold(Extension(ticket): Extension<Ticket>) -> Json<Admission> {
    Json(Admission::new("held", ticket))
}

/// `POST /v1/orders`: placing the order uses up the ticket.
///
/// # Errors
///
/// 503 when the queue store is unavailable.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(ticket): Extension<Ticket>,
    Extension(AdmissionToken(token)): Extension<AdmissionToken>,
) -> Result<Json<Admission>, AppError> {
    state.queue.consume_ticket(&token).await?;
    tracing::info!(user_id = %ticket.user_id, event_id = %ticket.event_id, "Admission ticket consumed");
    Ok(Json(Admission::new("ordered", ticket)))
}
