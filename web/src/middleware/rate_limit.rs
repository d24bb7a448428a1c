//! Per-identity rate limiting.
//!
//! Authenticated callers are keyed `user:<id>` and budgeted by their role's
//! tier; anonymous callers are keyed `ip:<addr>`. Every response carries
//! `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
//! (`X-RateLimit-Tier` for tiered checks); a denial is a 429 with
//! `Retry-After`.
//!
//! The limiter fails open: when the cache is unreachable the request
//! proceeds without headers.

use crate::config::RateLimitMode;
use crate::error::AppError;
use crate::extractors::client_ip;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use travio_identity::AccessClaims;
use travio_ratelimit::{Decision, RateLimitError};

/// Check the caller's budget before running the request.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let claims = req.extensions().get::<AccessClaims>();
    let identity = claims.map_or_else(
        || format!("ip:{}", client_ip(req.headers(), req.extensions())),
        |claims| format!("user:{}", claims.sub),
    );
    let role = claims.map(|claims| claims.role.clone());
    let path = req.uri().path().to_string();

    let result = match &state.config.rate_limit {
        RateLimitMode::Disabled => return next.run(req).await,
        RateLimitMode::Tiered => {
            let tier = state.tiers.resolve(role.as_deref());
            state.limiter.check_tiered(&identity, tier, &path).await
        }
        RateLimitMode::Global(config) => state.limiter.check(&identity, config).await,
    };

    let decision = match result {
        Ok(decision) => decision,
        Err(e) => {
            metrics::counter!("rate_limit.fail_open").increment(1);
            tracing::warn!(identity = %identity, error = %e, "Rate limiter unavailable, allowing request");
            return next.run(req).await;
        }
    };

    if !decision.allowed {
        tracing::info!(identity = %identity, path = %path, limit = decision.limit, "Rate limit exceeded");

        let mut response = AppError::from(RateLimitError::Exceeded {
            limit: decision.limit,
            reset_at: decision.reset_at,
        })
        .into_response();
        apply_rate_limit_headers(response.headers_mut(), &decision);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
        return response;
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Write the `X-RateLimit-*` headers of `decision`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
    if let Some(tier) = decision.tier {
        headers.insert("X-RateLimit-Tier", HeaderValue::from_static(tier.as_str()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use travio_ratelimit::Tier;

    #[test]
    fn headers_reflect_the_decision() {
        let decision = Decision {
            allowed: true,
            limit: 80,
            remaining: 75,
            reset_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 1, 0).unwrap(),
            retry_after_secs: 0,
            tier: Some(Tier::Free),
        };
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&mut headers, &decision);

        assert_eq!(headers["X-RateLimit-Limit"], "80");
        assert_eq!(headers["X-RateLimit-Remaining"], "75");
        assert_eq!(headers["X-RateLimit-Reset"], "1735689660");
        assert_eq!(headers["X-RateLimit-Tier"], "free");
    }

    #[test]
    fn plain_checks_carry_no_tier() {
        let decision = Decision {
            allowed: false,
            limit: 3,
            remaining: 0,
            reset_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            retry_after_secs: 60,
            tier: None,
        };
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&mut headers, &decision);
        assert!(!headers.contains_key("X-RateLimit-Tier"));
    }
}
