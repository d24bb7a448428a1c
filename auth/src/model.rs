//! Identity data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Role carried in access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Organization administrator.
    Admin,
    /// Operator staff selling on behalf of an organization.
    Agent,
    /// End customer.
    #[default]
    User,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Agent => "agent",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "agent" => Ok(Self::Agent),
            "user" => Ok(Self::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Account id.
    pub id: UserId,
    /// Normalised (trimmed, lower-case) email.
    pub email: String,
    /// PHC-format Argon2id hash.
    pub password_hash: String,
    /// Owning organization, if any.
    pub organization_id: Option<String>,
    /// Role.
    pub role: Role,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Server-side record of one issued refresh token.
///
/// `id` equals the token's `jti`. Records derived by rotation from the same
/// login share `family_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    /// Token id (jti).
    pub id: String,
    /// Owner.
    pub user_id: UserId,
    /// Rotation family.
    pub family_id: String,
    /// SHA-256 of the issued token string.
    pub token_hash: String,
    /// Whether the token may no longer be used.
    pub revoked: bool,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last rotation or issuance time.
    pub last_used_at: DateTime<Utc>,
    /// Client user agent at issuance.
    pub user_agent: String,
    /// Client IP at issuance.
    pub ip_address: String,
}

impl RefreshTokenRecord {
    /// Whether the record may still be rotated at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// Tokens returned by login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Single-use rotation token.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Always `Bearer`.
    pub token_type: String,
}

/// Active session as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Record id of the current refresh token.
    pub id: String,
    /// Rotation family.
    pub family_id: String,
    /// Human-readable device label derived from the user agent.
    pub device: String,
    /// Client IP.
    pub ip_address: String,
    /// Last activity.
    pub last_active: DateTime<Utc>,
    /// Session start.
    pub created_at: DateTime<Utc>,
}

impl From<&RefreshTokenRecord> for SessionInfo {
    fn from(record: &RefreshTokenRecord) -> Self {
        Self {
            id: record.id.clone(),
            family_id: record.family_id.clone(),
            device: crate::utils::parse_device_name(&record.user_agent),
            ip_address: record.ip_address.clone(),
            last_active: record.last_used_at,
            created_at: record.created_at,
        }
    }
}

/// Client metadata recorded with refresh tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// User agent header.
    pub user_agent: String,
    /// Client IP address.
    pub ip_address: String,
}

impl ClientInfo {
    /// Create client metadata.
    #[must_use]
    pub fn new(user_agent: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip_address: ip_address.into(),
        }
    }
}
