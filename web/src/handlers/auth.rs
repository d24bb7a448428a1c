//! Identity endpoints under `/v1/auth`.

use crate::error::AppError;
use crate::extractors::{AuthUser, Client, bearer_token};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use travio_identity::{SessionInfo, TokenPair, UserId};

/// `POST /v1/auth/register` body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Email address.
    pub email: String,
    /// Plain-text password.
    pub password: String,
    /// Organization to join.
    #[serde(default)]
    pub organization_id: Option<String>,
}

/// `POST /v1/auth/register` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// New user id.
    pub user_id: UserId,
}

/// `POST /v1/auth/login` body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address.
    pub email: String,
    /// Plain-text password.
    pub password: String,
}

/// Body of `refresh` and `logout`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token issued by login or a previous refresh.
    pub refresh_token: String,
}

/// `POST /v1/auth/logout-all` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutAllResponse {
    /// Sessions revoked.
    pub revoked: u64,
}

/// Register a user.
///
/// # Errors
///
/// 400 for a malformed email or short password, 409 if the email is taken.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let user_id = state
        .identity
        .register(&body.email, &body.password, body.organization_id)
        .await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

/// Log in with email and password.
///
/// # Errors
///
/// 401 `invalid_credentials` for an unknown email or wrong password.
pub async fn login(
    State(state): State<AppState>,
    Client(client): Client,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let tokens = state.identity.login(&body.email, &body.password, &client).await?;
    Ok(Json(tokens))
}

/// Rotate a refresh token.
///
/// # Errors
///
/// 401 `invalid_token` for an unknown or expired token, 401
/// `refresh_reused` when a revoked token is replayed.
pub async fn refresh(
    State(state): State<AppState>,
    Client(client): Client,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let tokens = state.identity.refresh(&body.refresh_token, &client).await?;
    Ok(Json(tokens))
}

/// Revoke a refresh token; a bearer access token sent along is blacklisted.
///
/// # Errors
///
/// 401 `invalid_token` for a refresh token that does not verify.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    state
        .identity
        .logout(&body.refresh_token, bearer_token(&headers))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke every session of the caller.
///
/// # Errors
///
/// 401 without a valid access token.
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<LogoutAllResponse>, AppError> {
    let revoked = state.identity.logout_all(user.user_id()?).await?;
    Ok(Json(LogoutAllResponse { revoked }))
}

/// Active sessions of the caller.
///
/// # Errors
///
/// 401 without a valid access token.
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<SessionInfo>>, AppError> {
    Ok(Json(state.identity.sessions(user.user_id()?).await?))
}

/// Revoke one of the caller's sessions.
///
/// # Errors
///
/// 401 without a valid access token, 404 for a session the caller does not own.
pub async fn revoke_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .identity
        .revoke_session(user.user_id()?, &session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
