//! Access and refresh token minting and verification.
//!
//! Both token kinds are HS256 JWTs signed with **different** keys, so a
//! leaked access key cannot forge refresh tokens and vice versa. Expiry is
//! checked against the injected clock rather than the library's wall clock.

use crate::config::IdentityConfig;
use crate::error::{IdentityError, Result};
use crate::model::{User, UserId};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id).
    pub sub: String,
    /// User id, duplicated for older clients.
    pub uid: String,
    /// Organization id, empty when the user has none.
    pub oid: String,
    /// Role name.
    pub role: String,
    /// Token id; key of the blacklist entry on logout.
    pub jti: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

impl AccessClaims {
    /// Seconds of validity left at `now`, never negative.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.exp - now.timestamp()).max(0)
    }

    /// Parse the subject as a [`UserId`].
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidToken`] if the subject is not a UUID.
    pub fn user_id(&self) -> Result<UserId> {
        self.sub.parse().map_err(|_| IdentityError::InvalidToken)
    }
}

/// Claims of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user id).
    pub sub: String,
    /// User id.
    pub uid: String,
    /// Rotation family id.
    pub fid: String,
    /// Token id; primary key of the server-side record.
    pub jti: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// A freshly signed token together with its claims.
#[derive(Debug, Clone)]
pub struct Minted<C> {
    /// Encoded JWT.
    pub token: String,
    /// Claims inside it.
    pub claims: C,
}

/// Signs and verifies both token kinds.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build an issuer from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Validation`] if the configuration is unsafe.
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        })
    }

    /// Access token lifetime in seconds.
    #[must_use]
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation
    }

    /// Mint an access token for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Internal`] if signing fails.
    pub fn mint_access(&self, user: &User, now: DateTime<Utc>) -> Result<Minted<AccessClaims>> {
        let claims = AccessClaims {
            sub: user.id.to_string(),
            uid: user.id.to_string(),
            oid: user.organization_id.clone().unwrap_or_default(),
            role: user.role.to_string(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| IdentityError::Internal(format!("jwt encode: {e}")))?;
        Ok(Minted { token, claims })
    }

    /// Mint a refresh token.
    ///
    /// `family` continues an existing rotation chain; `None` opens a new
    /// family whose id equals the new token's jti.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Internal`] if signing fails.
    pub fn mint_refresh(
        &self,
        user_id: UserId,
        family: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Minted<RefreshClaims>> {
        let jti = Uuid::new_v4().to_string();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            uid: user_id.to_string(),
            fid: family.map_or_else(|| jti.clone(), ToString::to_string),
            jti,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| IdentityError::Internal(format!("jwt encode: {e}")))?;
        Ok(Minted { token, claims })
    }

    /// Verify an access token's signature, issuer and expiry.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidToken`] on any failure.
    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims> {
        let claims = decode::<AccessClaims>(token, &self.access_decoding, &self.validation())
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                IdentityError::InvalidToken
            })?
            .claims;
        if claims.exp <= now.timestamp() {
            return Err(IdentityError::InvalidToken);
        }
        Ok(claims)
    }

    /// Verify a refresh token's signature, issuer and expiry.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidToken`] on any failure.
    pub fn verify_refresh(&self, token: &str, now: DateTime<Utc>) -> Result<RefreshClaims> {
        let claims = decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation())
            .map_err(|e| {
                tracing::debug!(error = %e, "Refresh token rejected");
                IdentityError::InvalidToken
            })?
            .claims;
        if claims.exp <= now.timestamp() {
            return Err(IdentityError::InvalidToken);
        }
        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::Role;
    use chrono::Duration;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&IdentityConfig::new("access-key", "refresh-key")).unwrap()
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            organization_id: Some("org-1".into()),
            role: Role::Agent,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn access_token_carries_identity_claims() {
        let issuer = issuer();
        let user = user();
        let now = Utc::now();

        let minted = issuer.mint_access(&user, now).unwrap();
        let claims = issuer.verify_access(&minted.token, now).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.oid, "org-1");
        assert_eq!(claims.role, "agent");
        assert_eq!(claims.iss, "travio-identity");
        assert_eq!(claims.exp - claims.iat, 900);
        assert_eq!(claims.user_id().unwrap(), user.id);
    }

    #[test]
    fn new_family_uses_jti_and_rotation_keeps_it() {
        let issuer = issuer();
        let now = Utc::now();
        let id = UserId::new();

        let first = issuer.mint_refresh(id, None, now).unwrap();
        assert_eq!(first.claims.fid, first.claims.jti);

        let child = issuer.mint_refresh(id, Some(&first.claims.fid), now).unwrap();
        assert_eq!(child.claims.fid, first.claims.fid);
        assert_ne!(child.claims.jti, first.claims.jti);
    }

    #[test]
    fn keys_are_not_interchangeable() {
        let issuer = issuer();
        let now = Utc::now();
        let access = issuer.mint_access(&user(), now).unwrap();
        let refresh = issuer.mint_refresh(UserId::new(), None, now).unwrap();

        assert!(issuer.verify_refresh(&access.token, now).is_err());
        assert!(issuer.verify_access(&refresh.token, now).is_err());
    }

    #[test]
    fn expiry_follows_the_supplied_clock() {
        let issuer = issuer();
        let now = Utc::now();
        let minted = issuer.mint_access(&user(), now).unwrap();

        assert!(issuer.verify_access(&minted.token, now + Duration::minutes(14)).is_ok());
        assert_eq!(
            issuer.verify_access(&minted.token, now + Duration::minutes(15)),
            Err(IdentityError::InvalidToken)
        );
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let now = Utc::now();
        let other = TokenIssuer::new(
            &IdentityConfig::new("access-key", "refresh-key").with_issuer("someone-else"),
        )
        .unwrap();
        let minted = other.mint_access(&user(), now).unwrap();
        assert!(issuer().verify_access(&minted.token, now).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let issuer = issuer();
        let now = Utc::now();
        let mut token = issuer.mint_access(&user(), now).unwrap().token;
        token.push('x');
        assert!(issuer.verify_access(&token, now).is_err());
    }
}
