//! Object-safe views of the services the gateway fronts.
//!
//! The services are generic over their stores and clock; these traits erase
//! those parameters so [`AppState`](crate::AppState) can hold them as
//! `Arc<dyn …>`. Each trait has a blanket implementation for its service.

use futures::future::BoxFuture;
use travio_core::environment::Clock;
use travio_identity::providers::{RefreshTokenRepository, TokenBlacklist, UserRepository};
use travio_identity::{
    AccessClaims, AuthService, ClientInfo, IdentityError, SessionInfo, TokenPair, UserId,
};
use travio_pricing::{
    CalculatePriceRequest, PriceQuote, PricingError, PricingService, Rule, RuleInput,
    RuleRepository, RuleScope,
};
use travio_queue::{
    AdmissionController, JoinOutcome, QueueConfig, QueueEntry, QueueError, QueueStats, QueueStore,
    Ticket,
};
use travio_ratelimit::{Decision, RateLimitConfig, RateLimitError, RateLimitStore, RateLimiter, Tier};

/// Identity operations.
pub trait IdentityBackend: Send + Sync {
    /// Register a user.
    fn register<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        organization_id: Option<String>,
    ) -> BoxFuture<'a, Result<UserId, IdentityError>>;

    /// Exchange credentials for a token pair.
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        client: &'a ClientInfo,
    ) -> BoxFuture<'a, Result<TokenPair, IdentityError>>;

    /// Rotate a refresh token.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        client: &'a ClientInfo,
    ) -> BoxFuture<'a, Result<TokenPair, IdentityError>>;

    /// Revoke a refresh token and optionally blacklist an access token.
    fn logout<'a>(
        &'a self,
        refresh_token: &'a str,
        access_token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), IdentityError>>;

    /// Revoke every session of a user.
    fn logout_all(&self, user_id: UserId) -> BoxFuture<'_, Result<u64, IdentityError>>;

    /// Active sessions of a user.
    fn sessions(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<SessionInfo>, IdentityError>>;

    /// Revoke one session of a user.
    fn revoke_session<'a>(
        &'a self,
        user_id: UserId,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<(), IdentityError>>;

    /// Verify an access token.
    fn validate<'a>(&'a self, access_token: &'a str)
    -> BoxFuture<'a, Result<AccessClaims, IdentityError>>;
}

impl<U, R, B, C> IdentityBackend for AuthService<U, R, B, C>
where
    U: UserRepository,
    R: RefreshTokenRepository,
    B: TokenBlacklist,
    C: Clock,
{
    fn register<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        organization_id: Option<String>,
    ) -> BoxFuture<'a, Result<UserId, IdentityError>> {
        Box::pin(AuthService::register(self, email, password, organization_id))
    }

    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        client: &'a ClientInfo,
    ) -> BoxFuture<'a, Result<TokenPair, IdentityError>> {
        Box::pin(AuthService::login(self, email, password, client))
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        client: &'a ClientInfo,
    ) -> BoxFuture<'a, Result<TokenPair, IdentityError>> {
        Box::pin(self.refresh_tokens(refresh_token, client))
    }

    fn logout<'a>(
        &'a self,
        refresh_token: &'a str,
        access_token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), IdentityError>> {
        Box::pin(AuthService::logout(self, refresh_token, access_token))
    }

    fn logout_all(&self, user_id: UserId) -> BoxFuture<'_, Result<u64, IdentityError>> {
        Box::pin(AuthService::logout_all(self, user_id))
    }

    fn sessions(&self, user_id: UserId) -> BoxFuture<'_, Result<Vec<SessionInfo>, IdentityError>> {
        Box::pin(self.list_active_sessions(user_id))
    }

    fn revoke_session<'a>(
        &'a self,
        user_id: UserId,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<(), IdentityError>> {
        Box::pin(AuthService::revoke_session(self, user_id, session_id))
    }

    fn validate<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<AccessClaims, IdentityError>> {
        Box::pin(self.validate_access_token(access_token))
    }
}

/// Waiting-room operations.
pub trait AdmissionBackend: Send + Sync {
    /// Join an event's queue.
    fn join<'a>(
        &'a self,
        event_id: &'a str,
        user_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<JoinOutcome, QueueError>>;

    /// Current entry of a user.
    fn position<'a>(
        &'a self,
        event_id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<QueueEntry, QueueError>>;

    /// Leave an event's queue.
    fn leave<'a>(&'a self, event_id: &'a str, user_id: &'a str) -> BoxFuture<'a, Result<(), QueueError>>;

    /// Check a ticket without consuming it.
    fn require_ticket<'a>(&'a self, ticket: &'a str) -> BoxFuture<'a, Result<Ticket, QueueError>>;

    /// Consume a ticket.
    fn consume_ticket<'a>(&'a self, ticket: &'a str) -> BoxFuture<'a, Result<(), QueueError>>;

    /// Queue statistics.
    fn stats<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, Result<QueueStats, QueueError>>;

    /// Stored configuration of an event.
    fn config<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, Result<QueueConfig, QueueError>>;

    /// Replace an event's configuration.
    fn configure(&self, config: QueueConfig) -> BoxFuture<'_, Result<(), QueueError>>;
}

impl<S, C> AdmissionBackend for AdmissionController<S, C>
where
    S: QueueStore + 'static,
    C: Clock + 'static,
{
    fn join<'a>(
        &'a self,
        event_id: &'a str,
        user_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<JoinOutcome, QueueError>> {
        Box::pin(AdmissionController::join(self, event_id, user_id, session_id))
    }

    fn position<'a>(
        &'a self,
        event_id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<QueueEntry, QueueError>> {
        Box::pin(AdmissionController::position(self, event_id, user_id))
    }

    fn leave<'a>(&'a self, event_id: &'a str, user_id: &'a str) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(AdmissionController::leave(self, event_id, user_id))
    }

    fn require_ticket<'a>(&'a self, ticket: &'a str) -> BoxFuture<'a, Result<Ticket, QueueError>> {
        Box::pin(AdmissionController::require_ticket(self, ticket))
    }

    fn consume_ticket<'a>(&'a self, ticket: &'a str) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(AdmissionController::consume_ticket(self, ticket))
    }

    fn stats<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, Result<QueueStats, QueueError>> {
        Box::pin(AdmissionController::stats(self, event_id))
    }

    fn config<'a>(&'a self, event_id: &'a str) -> BoxFuture<'a, Result<QueueConfig, QueueError>> {
        Box::pin(AdmissionController::config(self, event_id))
    }

    fn configure(&self, config: QueueConfig) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(AdmissionController::configure(self, config))
    }
}

/// Rate-limit checks.
pub trait RateLimitBackend: Send + Sync {
    /// Sliding-window check against an explicit budget.
    fn check<'a>(
        &'a self,
        identity: &'a str,
        config: &'a RateLimitConfig,
    ) -> BoxFuture<'a, Result<Decision, RateLimitError>>;

    /// Tiered check with the endpoint cost of `path`.
    fn check_tiered<'a>(
        &'a self,
        identity: &'a str,
        tier: Tier,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Decision, RateLimitError>>;
}

impl<S, C> RateLimitBackend for RateLimiter<S, C>
where
    S: RateLimitStore,
    C: Clock,
{
    fn check<'a>(
        &'a self,
        identity: &'a str,
        config: &'a RateLimitConfig,
    ) -> BoxFuture<'a, Result<Decision, RateLimitError>> {
        Box::pin(RateLimiter::check(self, identity, config))
    }

    fn check_tiered<'a>(
        &'a self,
        identity: &'a str,
        tier: Tier,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Decision, RateLimitError>> {
        Box::pin(RateLimiter::check_tiered(self, identity, tier, path))
    }
}

/// Pricing operations.
pub trait PricingBackend: Send + Sync {
    /// Price a request.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::Validation`] for malformed requests.
    fn calculate(&self, request: &CalculatePriceRequest) -> Result<PriceQuote, PricingError>;

    /// List rules.
    fn list_rules<'a>(
        &'a self,
        scope: &'a RuleScope,
        include_inactive: bool,
    ) -> BoxFuture<'a, Result<Vec<Rule>, PricingError>>;

    /// Fetch one rule.
    fn get_rule<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Rule, PricingError>>;

    /// Create a rule.
    fn create_rule(&self, input: RuleInput) -> BoxFuture<'_, Result<Rule, PricingError>>;

    /// Replace a rule.
    fn update_rule<'a>(&'a self, id: &'a str, input: RuleInput)
    -> BoxFuture<'a, Result<Rule, PricingError>>;

    /// Delete a rule.
    fn delete_rule<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), PricingError>>;
}

impl<R, C> PricingBackend for PricingService<R, C>
where
    R: RuleRepository,
    C: Clock,
{
    fn calculate(&self, request: &CalculatePriceRequest) -> Result<PriceQuote, PricingError> {
        self.calculate_price(request)
    }

    fn list_rules<'a>(
        &'a self,
        scope: &'a RuleScope,
        include_inactive: bool,
    ) -> BoxFuture<'a, Result<Vec<Rule>, PricingError>> {
        Box::pin(PricingService::list_rules(self, scope, include_inactive))
    }

    fn get_rule<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Rule, PricingError>> {
        Box::pin(PricingService::get_rule(self, id))
    }

    fn create_rule(&self, input: RuleInput) -> BoxFuture<'_, Result<Rule, PricingError>> {
        Box::pin(PricingService::create_rule(self, input))
    }

    fn update_rule<'a>(
        &'a self,
        id: &'a str,
        input: RuleInput,
    ) -> BoxFuture<'a, Result<Rule, PricingError>> {
        Box::pin(PricingService::update_rule(self, id, input))
    }

    fn delete_rule<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), PricingError>> {
        Box::pin(PricingService::delete_rule(self, id))
    }
}
