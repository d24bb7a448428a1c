//! Authentication service.
//!
//! [`AuthService`] ties the providers together and implements registration,
//! login, refresh-token rotation with family-wide reuse detection, logout
//! and session management.
//!
//! # Rotation
//!
//! ```text
//! Login            → family F opened, record R1 (active)
//! Refresh(R1)      → R1 revoked, R2 (active, family F)
//! Refresh(R1) again→ R1 already revoked ⇒ every record of F revoked,
//!                    RefreshReused
//! Refresh(R2)      → R2 revoked by the previous step ⇒ RefreshReused
//! ```

use crate::config::IdentityConfig;
use crate::error::{IdentityError, Result};
use crate::model::{ClientInfo, RefreshTokenRecord, Role, SessionInfo, TokenPair, User, UserId};
use crate::password::PasswordHasher;
use crate::providers::{RefreshTokenRepository, RotateOutcome, TokenBlacklist, UserRepository};
use crate::tokens::{AccessClaims, Minted, RefreshClaims, TokenIssuer};
use crate::utils::{hash_token, is_valid_email, normalize_email};
use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use std::sync::Arc;
use travio_core::environment::Clock;
use travio_runtime::Worker;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Authentication service over pluggable providers.
pub struct AuthService<U, R, B, C> {
    users: U,
    refresh_tokens: R,
    blacklist: B,
    clock: C,
    tokens: TokenIssuer,
    hasher: PasswordHasher,
    config: IdentityConfig,
}

impl<U, R, B, C> AuthService<U, R, B, C>
where
    U: UserRepository,
    R: RefreshTokenRepository,
    B: TokenBlacklist,
    C: Clock,
{
    /// Create the service.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Validation`] if the configuration is unsafe
    /// (empty or identical signing keys, non-positive lifetimes, invalid
    /// Argon2 parameters).
    pub fn new(
        config: IdentityConfig,
        users: U,
        refresh_tokens: R,
        blacklist: B,
        clock: C,
    ) -> Result<Self> {
        let tokens = TokenIssuer::new(&config)?;
        let hasher = PasswordHasher::new(config.hashing)?;
        Ok(Self {
            users,
            refresh_tokens,
            blacklist,
            clock,
            tokens,
            hasher,
            config,
        })
    }

    /// Service configuration.
    #[must_use]
    pub const fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Register a user with the default role.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::Validation`] for a malformed email or short password
    /// - [`IdentityError::AlreadyExists`] if the email is taken
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        organization_id: Option<String>,
    ) -> Result<UserId> {
        self.register_with_role(email, password, organization_id, Role::User).await
    }

    /// Register a user with an explicit role.
    ///
    /// # Errors
    ///
    /// See [`AuthService::register`].
    pub async fn register_with_role(
        &self,
        email: &str,
        password: &str,
        organization_id: Option<String>,
        role: Role,
    ) -> Result<UserId> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(IdentityError::Validation("malformed email".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(IdentityError::AlreadyExists);
        }

        let password_hash = self.hasher.hash(password).await?;
        let now = self.clock.now();
        let user = User {
            id: UserId::new(),
            email,
            password_hash,
            organization_id: organization_id.filter(|org| !org.is_empty()),
            role,
            created_at: now,
            updated_at: now,
        };
        self.users.create(&user).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user.id)
    }

    /// Authenticate with email and password and open a new session family.
    ///
    /// Unknown emails still run one password verification against a dummy
    /// hash before failing.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidCredentials`] for an unknown email or
    /// a wrong password.
    pub async fn login(&self, email: &str, password: &str, client: &ClientInfo) -> Result<TokenPair> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.hasher.verify_dummy(password).await?;
            metrics::counter!("identity.logins", "outcome" => "failure").increment(1);
            return Err(IdentityError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash).await? {
            metrics::counter!("identity.logins", "outcome" => "failure").increment(1);
            tracing::debug!(user_id = %user.id, "Password mismatch");
            return Err(IdentityError::InvalidCredentials);
        }

        let now = self.clock.now();
        let access = self.tokens.mint_access(&user, now)?;
        let refresh = self.tokens.mint_refresh(user.id, None, now)?;
        let record = Self::record_for(&refresh, user.id, client, now);
        self.refresh_tokens.create(&record).await?;

        metrics::counter!("identity.logins", "outcome" => "success").increment(1);
        tracing::info!(user_id = %user.id, family_id = %record.family_id, "User logged in");

        Ok(self.pair(access, refresh))
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The presented token becomes unusable. Replaying any revoked token of a
    /// family revokes the whole family. The rotation runs under its own
    /// deadline (`rotation_timeout`).
    ///
    /// # Errors
    ///
    /// - [`IdentityError::InvalidToken`] for bad signature, expiry or an unknown record
    /// - [`IdentityError::RefreshReused`] when reuse is detected
    /// - [`IdentityError::Timeout`] if the deadline elapses
    pub async fn refresh_tokens(&self, refresh_token: &str, client: &ClientInfo) -> Result<TokenPair> {
        tokio::time::timeout(
            self.config.rotation_timeout,
            self.rotate(refresh_token, client),
        )
        .await
        .map_err(|_| {
            tracing::warn!("Refresh rotation timed out");
            IdentityError::Timeout
        })?
    }

    async fn rotate(&self, refresh_token: &str, client: &ClientInfo) -> Result<TokenPair> {
        let now = self.clock.now();
        let claims = self.tokens.verify_refresh(refresh_token, now)?;
        let record = self.lookup_record(&claims, refresh_token).await?;

        if record.revoked {
            return Err(self.reuse_detected(&record).await);
        }
        if !record.is_active(now) {
            return Err(IdentityError::InvalidToken);
        }

        let Some(user) = self.users.find_by_id(record.user_id).await? else {
            return Err(IdentityError::InvalidToken);
        };

        let access = self.tokens.mint_access(&user, now)?;
        let refresh = self.tokens.mint_refresh(user.id, Some(&record.family_id), now)?;
        let mut child = Self::record_for(&refresh, user.id, client, now);
        child.created_at = record.created_at;

        match self.refresh_tokens.rotate(&record.id, &child, now).await? {
            RotateOutcome::Rotated => {
                tracing::debug!(
                    user_id = %user.id,
                    family_id = %record.family_id,
                    "Refresh token rotated"
                );
                Ok(self.pair(access, refresh))
            }
            RotateOutcome::AlreadyRevoked => Err(self.reuse_detected(&record).await),
        }
    }

    async fn reuse_detected(&self, record: &RefreshTokenRecord) -> IdentityError {
        metrics::counter!("identity.refresh_reuse_detected").increment(1);
        match self.refresh_tokens.revoke_family(&record.family_id).await {
            Ok(revoked) => tracing::warn!(
                user_id = %record.user_id,
                family_id = %record.family_id,
                revoked,
                "Refresh token reuse detected, family revoked"
            ),
            Err(e) => {
                tracing::error!(
                    family_id = %record.family_id,
                    error = %e,
                    "Refresh token reuse detected but family revocation failed"
                );
                return e;
            }
        }
        IdentityError::RefreshReused
    }

    async fn lookup_record(&self, claims: &RefreshClaims, token: &str) -> Result<RefreshTokenRecord> {
        let record = self
            .refresh_tokens
            .find(&claims.jti)
            .await?
            .ok_or(IdentityError::InvalidToken)?;

        let presented = hash_token(token);
        if !constant_time_eq(presented.as_bytes(), record.token_hash.as_bytes())
            || record.family_id != claims.fid
        {
            return Err(IdentityError::InvalidToken);
        }
        Ok(record)
    }

    /// Revoke the session behind `refresh_token`, and blacklist the access
    /// token if one is supplied.
    ///
    /// Invalid, expired or unknown tokens succeed silently.
    ///
    /// # Errors
    ///
    /// Returns provider errors only.
    pub async fn logout(&self, refresh_token: &str, access_token: Option<&str>) -> Result<()> {
        let now = self.clock.now();

        if let Ok(claims) = self.tokens.verify_refresh(refresh_token, now) {
            match self.lookup_record(&claims, refresh_token).await {
                Ok(record) => {
                    self.refresh_tokens.revoke(&record.id).await?;
                    tracing::info!(user_id = %record.user_id, family_id = %record.family_id, "User logged out");
                }
                Err(IdentityError::InvalidToken) => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(access) = access_token.and_then(|t| self.tokens.verify_access(t, now).ok()) {
            self.blacklist_access(&access, now).await?;
        }

        Ok(())
    }

    async fn blacklist_access(&self, claims: &AccessClaims, now: DateTime<Utc>) -> Result<()> {
        let remaining = u64::try_from(claims.remaining_secs(now)).unwrap_or(0);
        self.blacklist
            .revoke(&claims.jti, std::time::Duration::from_secs(remaining))
            .await
    }

    /// Revoke every session of a user. Returns the number of records revoked.
    ///
    /// # Errors
    ///
    /// Returns provider errors.
    pub async fn logout_all(&self, user_id: UserId) -> Result<u64> {
        let revoked = self.refresh_tokens.revoke_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "All sessions revoked");
        Ok(revoked)
    }

    /// Active sessions of a user, most recently used first.
    ///
    /// # Errors
    ///
    /// Returns provider errors.
    pub async fn list_active_sessions(&self, user_id: UserId) -> Result<Vec<SessionInfo>> {
        let now = self.clock.now();
        let records = self.refresh_tokens.list_active(user_id, now).await?;
        Ok(records.iter().map(SessionInfo::from).collect())
    }

    /// End one session of `user_id`.
    ///
    /// `session_id` is the id reported by [`AuthService::list_active_sessions`];
    /// the whole rotation family behind it is revoked.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SessionNotFound`] if the session does not
    /// exist or belongs to another user.
    pub async fn revoke_session(&self, user_id: UserId, session_id: &str) -> Result<()> {
        let record = self
            .refresh_tokens
            .find(session_id)
            .await?
            .filter(|record| record.user_id == user_id)
            .ok_or(IdentityError::SessionNotFound)?;

        let revoked = self.refresh_tokens.revoke_family(&record.family_id).await?;
        tracing::info!(user_id = %user_id, family_id = %record.family_id, revoked, "Session revoked");
        Ok(())
    }

    /// Verify an access token and check the blacklist.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidToken`] if verification fails or the
    /// token was blacklisted by a logout.
    pub async fn validate_access_token(&self, token: &str) -> Result<AccessClaims> {
        let claims = self.tokens.verify_access(token, self.clock.now())?;
        if self.blacklist.is_revoked(&claims.jti).await? {
            return Err(IdentityError::InvalidToken);
        }
        Ok(claims)
    }

    /// Delete refresh records that have expired.
    ///
    /// # Errors
    ///
    /// Returns provider errors.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let deleted = self.refresh_tokens.delete_expired(self.clock.now()).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Expired refresh tokens purged");
        }
        Ok(deleted)
    }

    fn record_for(
        refresh: &Minted<RefreshClaims>,
        user_id: UserId,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: refresh.claims.jti.clone(),
            user_id,
            family_id: refresh.claims.fid.clone(),
            token_hash: hash_token(&refresh.token),
            revoked: false,
            expires_at: DateTime::from_timestamp(refresh.claims.exp, 0).unwrap_or(now),
            created_at: now,
            last_used_at: now,
            user_agent: client.user_agent.clone(),
            ip_address: client.ip_address.clone(),
        }
    }

    fn pair(&self, access: Minted<AccessClaims>, refresh: Minted<RefreshClaims>) -> TokenPair {
        TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: self.tokens.access_ttl_secs(),
            token_type: "Bearer".to_string(),
        }
    }
}

impl<U, R, B, C> AuthService<U, R, B, C>
where
    U: UserRepository + 'static,
    R: RefreshTokenRepository + 'static,
    B: TokenBlacklist + 'static,
    C: Clock + 'static,
{
    /// Start the background job that purges expired refresh records every
    /// `cleanup_interval`.
    #[must_use]
    pub fn spawn_cleanup(self: &Arc<Self>) -> Worker {
        let service = Arc::clone(self);
        let interval = self.config.cleanup_interval;

        Worker::spawn("identity-cleanup", move |cancel| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = service.cleanup_expired().await {
                            tracing::error!(error = %e, "Refresh token cleanup failed");
                        }
                    }
                }
            }
        })
    }
}
