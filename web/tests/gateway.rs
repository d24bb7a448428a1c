//! Gateway HTTP behaviour against the real services on in-memory providers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use travio_core::environment::SystemClock;
use travio_gateway::{AppState, GatewayConfig, RateLimitMode, router};
use travio_identity::mocks::{MockRefreshTokenRepository, MockTokenBlacklist, MockUserRepository};
use travio_identity::{AuthService, IdentityConfig, PasswordHashingConfig, Role, TokenPair};
use travio_pricing::mocks::MockRuleRepository;
use travio_pricing::{PricingConfig, PricingService};
use travio_queue::mocks::MockQueueStore;
use travio_queue::{AdmissionController, QueueSettings};
use travio_ratelimit::mocks::MockRateLimitStore;
use travio_ratelimit::{RateLimitConfig, RateLimiter};

type Identity =
    AuthService<MockUserRepository, MockRefreshTokenRepository, MockTokenBlacklist, SystemClock>;
type Admission = AdmissionController<MockQueueStore, SystemClock>;

const PASSWORD: &str = "correct horse battery";

struct Gateway {
    server: TestServer,
    identity: Arc<Identity>,
    admission: Arc<Admission>,
    limiter_store: MockRateLimitStore,
}

async fn gateway(config: GatewayConfig) -> Gateway {
    let identity_config = IdentityConfig::new("access-secret", "refresh-secret")
        .with_hashing(PasswordHashingConfig::insecure_fast());
    let identity = Arc::new(
        AuthService::new(
            identity_config,
            MockUserRepository::new(),
            MockRefreshTokenRepository::new(),
            MockTokenBlacklist::new(),
            SystemClock,
        )
        .unwrap(),
    );

    let admission = Arc::new(AdmissionController::new(
        MockQueueStore::new(),
        SystemClock,
        QueueSettings::default(),
    ));

    let limiter_store = MockRateLimitStore::new();
    let limiter = Arc::new(RateLimiter::new(limiter_store.clone(), SystemClock));

    let pricing = Arc::new(PricingService::new(
        MockRuleRepository::new(),
        SystemClock,
        PricingConfig::default().with_seed_defaults(false),
    ));
    pricing.load().await.unwrap();

    let state = AppState::new(
        identity.clone(),
        admission.clone(),
        limiter,
        pricing,
        config,
    );

    Gateway {
        server: TestServer::new(router(state)).unwrap(),
        identity,
        admission,
        limiter_store,
    }
}

fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    )
}

fn header(response: &TestResponse, name: &str) -> String {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
        .to_string()
}

impl Gateway {
    async fn login(&self, email: &str) -> TokenPair {
        let response = self
            .server
            .post("/v1/auth/login")
            .json(&json!({ "email": email, "password": PASSWORD }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        response.json()
    }

    async fn signed_up(&self, email: &str) -> TokenPair {
        let response = self
            .server
            .post("/v1/auth/register")
            .json(&json!({ "email": email, "password": PASSWORD }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        self.login(email).await
    }

    async fn admin(&self, organization_id: Option<&str>) -> TokenPair {
        self.identity
            .register_with_role(
                "ops@example.com",
                PASSWORD,
                organization_id.map(str::to_string),
                Role::Admin,
            )
            .await
            .unwrap();
        self.login("ops@example.com").await
    }
}

#[tokio::test]
async fn health_carries_request_id() {
    let gw = gateway(GatewayConfig::default()).await;

    let response = gw.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
    assert!(!header(&response, "X-Request-ID").is_empty());

    let echoed = gw
        .server
        .get("/health")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("lb-42"),
        )
        .await;
    assert_eq!(header(&echoed, "X-Request-ID"), "lb-42");
}

#[tokio::test]
async fn register_login_refresh_and_reuse_detection() {
    let gw = gateway(GatewayConfig::default()).await;
    let first = gw.signed_up("alice@example.com").await;

    let duplicate = gw
        .server
        .post("/v1/auth/register")
        .json(&json!({ "email": "Alice@Example.com", "password": PASSWORD }))
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
    assert_eq!(duplicate.json::<Value>()["error"], "already_exists");

    let wrong = gw
        .server
        .post("/v1/auth/login")
        .json(&json!({ "email": "alice@example.com", "password": "nope nope nope" }))
        .await;
    assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.json::<Value>()["error"], "invalid_credentials");

    let rotated = gw
        .server
        .post("/v1/auth/refresh")
        .json(&json!({ "refresh_token": first.refresh_token }))
        .await;
    assert_eq!(rotated.status_code(), StatusCode::OK);
    let second: TokenPair = rotated.json();
    assert_ne!(second.refresh_token, first.refresh_token);

    let replay = gw
        .server
        .post("/v1/auth/refresh")
        .json(&json!({ "refresh_token": first.refresh_token }))
        .await;
    assert_eq!(replay.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(replay.json::<Value>()["error"], "refresh_reused");

    // The family was revoked, so the descendant is dead too.
    let descendant = gw
        .server
        .post("/v1/auth/refresh")
        .json(&json!({ "refresh_token": second.refresh_token }))
        .await;
    assert_eq!(descendant.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sessions_require_authentication_and_logout_blacklists() {
    let gw = gateway(GatewayConfig::default()).await;
    let tokens = gw.signed_up("bob@example.com").await;

    let anonymous = gw.server.get("/v1/auth/sessions").await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

    let garbage = gw
        .server
        .get("/v1/auth/sessions")
        .add_header(bearer("not-a-jwt").0, bearer("not-a-jwt").1)
        .await;
    assert_eq!(garbage.status_code(), StatusCode::UNAUTHORIZED);

    let (name, value) = bearer(&tokens.access_token);
    let sessions = gw
        .server
        .get("/v1/auth/sessions")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(sessions.status_code(), StatusCode::OK);
    assert_eq!(sessions.json::<Vec<Value>>().len(), 1);

    let logout = gw
        .server
        .post("/v1/auth/logout")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "refresh_token": tokens.refresh_token }))
        .await;
    assert_eq!(logout.status_code(), StatusCode::NO_CONTENT);

    let after = gw
        .server
        .get("/v1/auth/sessions")
        .add_header(name, value)
        .await;
    assert_eq!(after.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoke_one_session_and_logout_all() {
    let gw = gateway(GatewayConfig::default()).await;
    let laptop = gw.signed_up("carol@example.com").await;
    let phone = gw.login("carol@example.com").await;
    let tablet = gw.login("carol@example.com").await;
    let (name, value) = bearer(&laptop.access_token);

    let sessions: Vec<Value> = gw
        .server
        .get("/v1/auth/sessions")
        .add_header(name.clone(), value.clone())
        .await
        .json();
    assert_eq!(sessions.len(), 3);

    let session_id = sessions[0]["id"].as_str().unwrap().to_string();
    let revoked = gw
        .server
        .delete(&format!("/v1/auth/sessions/{session_id}"))
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(revoked.status_code(), StatusCode::NO_CONTENT);

    let missing = gw
        .server
        .delete("/v1/auth/sessions/no-such-session")
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

    let all = gw
        .server
        .post("/v1/auth/logout-all")
        .add_header(name, value)
        .await;
    assert_eq!(all.status_code(), StatusCode::OK);
    assert_eq!(all.json::<Value>()["revoked"], 2);

    for dead in [phone, tablet] {
        let refresh = gw
            .server
            .post("/v1/auth/refresh")
            .json(&json!({ "refresh_token": dead.refresh_token }))
            .await;
        assert_eq!(refresh.status_code(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn admission_guard_protects_booking_paths() {
    let gw = gateway(GatewayConfig::default()).await;
    let tokens = gw.signed_up("dave@example.com").await;
    let (name, value) = bearer(&tokens.access_token);

    let joined = gw
        .server
        .post("/v1/queue/join")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "event_id": "concert-1" }))
        .await;
    assert_eq!(joined.status_code(), StatusCode::CREATED);
    let joined: Value = joined.json();
    assert_eq!(joined["position"], 1);
    assert_eq!(joined["status"], "new");

    let again = gw
        .server
        .post("/v1/queue/join")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "event_id": "concert-1" }))
        .await;
    assert_eq!(again.status_code(), StatusCode::OK);

    let missing = gw.server.post("/v1/holds").await;
    assert_eq!(missing.status_code(), StatusCode::PRECONDITION_REQUIRED);
    let body: Value = missing.json();
    assert_eq!(body["error"], "queue_required");
    assert_eq!(body["queue_url"], "/v1/queue/join");

    let forged = gw
        .server
        .post("/v1/holds")
        .add_header(
            HeaderName::from_static("x-queue-token"),
            HeaderValue::from_static("forged"),
        )
        .await;
    assert_eq!(forged.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(forged.json::<Value>()["error"], "token_invalid");

    let admitted = gw.admission.admit_next("concert-1").await.unwrap();
    assert_eq!(admitted.len(), 1);
    let ticket = admitted[0].ticket.clone();

    let position: Value = gw
        .server
        .get("/v1/queue/position")
        .add_query_param("event_id", "concert-1")
        .add_header(name.clone(), value.clone())
        .await
        .json();
    assert_eq!(position["status"], "ready");
    assert_eq!(position["token"], ticket.as_str());

    let validated: Value = gw
        .server
        .post("/v1/queue/validate")
        .json(&json!({ "token": ticket }))
        .await
        .json();
    assert_eq!(validated["valid"], true);

    let hold = gw
        .server
        .post("/v1/holds")
        .add_header(
            HeaderName::from_static("x-queue-token"),
            HeaderValue::from_str(&ticket).unwrap(),
        )
        .await;
    assert_eq!(hold.status_code(), StatusCode::OK);
    let hold: Value = hold.json();
    assert_eq!(hold["status"], "held");
    assert_eq!(hold["event_id"], "concert-1");

    let order = gw
        .server
        .post("/v1/orders")
        .add_query_param("queue_token", &ticket)
        .await;
    assert_eq!(order.status_code(), StatusCode::OK);
    assert_eq!(order.json::<Value>()["status"], "ordered");

    let reused = gw
        .server
        .post("/v1/orders")
        .add_query_param("queue_token", &ticket)
        .await;
    assert_eq!(reused.status_code(), StatusCode::FORBIDDEN);

    gw.admission.shutdown().await;
}

#[tokio::test]
async fn queue_config_is_admin_only() {
    let gw = gateway(GatewayConfig::default()).await;
    let user = gw.signed_up("erin@example.com").await;
    let admin = gw.admin(None).await;

    let config = json!({ "event_id": "festival", "batch_size": 25, "admission_interval": 30 });

    let (name, value) = bearer(&user.access_token);
    let denied = gw
        .server
        .put("/v1/queue/config")
        .add_header(name, value)
        .json(&config)
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let (name, value) = bearer(&admin.access_token);
    let stored = gw
        .server
        .put("/v1/queue/config")
        .add_header(name.clone(), value.clone())
        .json(&config)
        .await;
    assert_eq!(stored.status_code(), StatusCode::OK);

    let read: Value = gw
        .server
        .get("/v1/queue/config")
        .add_query_param("event_id", "festival")
        .add_header(name.clone(), value.clone())
        .await
        .json();
    assert_eq!(read["batch_size"], 25);
    assert_eq!(read["token_ttl"], 600);

    let invalid = gw
        .server
        .put("/v1/queue/config")
        .add_header(name, value)
        .json(&json!({ "event_id": "festival", "batch_size": 0 }))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

    let stats: Value = gw
        .server
        .get("/v1/queue/stats")
        .add_query_param("event_id", "festival")
        .await
        .json();
    assert_eq!(stats["total_waiting"], 0);
    assert_eq!(stats["admission_rate_per_min"], 50.0);

    gw.admission.shutdown().await;
}

#[tokio::test]
async fn pricing_rules_round_trip_through_the_engine() {
    let gw = gateway(GatewayConfig::default()).await;
    let admin = gw.admin(None).await;
    let (name, value) = bearer(&admin.access_token);

    let request = json!({
        "base_price_paisa": 100_000,
        "date": "2030-06-12",
        "seat_class": "business",
        "quantity": 2,
    });

    let before: Value = gw.server.post("/v1/pricing/calculate").json(&request).await.json();
    assert_eq!(before["unit_price"], 100_000);

    let created = gw
        .server
        .post("/v1/pricing/rules")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "name": "Business Class Premium",
            "condition": "seat_class == \"business\"",
            "multiplier": 1.40,
            "priority": 1,
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let rule_id = created.json::<Value>()["id"].as_str().unwrap().to_string();

    let after: Value = gw.server.post("/v1/pricing/calculate").json(&request).await.json();
    assert_eq!(after["unit_price"], 140_000);
    assert_eq!(after["total_price"], 280_000);
    assert_eq!(after["applied_rules"][0]["rule_name"], "Business Class Premium");

    let typo = gw
        .server
        .post("/v1/pricing/rules")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Typo", "condition": "seat_clas == \"x\"", "multiplier": 2.0 }))
        .await;
    assert_eq!(typo.status_code(), StatusCode::BAD_REQUEST);

    let listed: Vec<Value> = gw
        .server
        .get("/v1/pricing/rules")
        .add_header(name.clone(), value.clone())
        .await
        .json();
    assert_eq!(listed.len(), 1);

    let deleted = gw
        .server
        .delete(&format!("/v1/pricing/rules/{rule_id}"))
        .add_header(name, value)
        .await;
    assert_eq!(deleted.status_code(), StatusCode::NO_CONTENT);

    let reverted: Value = gw.server.post("/v1/pricing/calculate").json(&request).await.json();
    assert_eq!(reverted["unit_price"], 100_000);
}

#[tokio::test]
async fn rule_management_requires_admin() {
    let gw = gateway(GatewayConfig::default()).await;
    let user = gw.signed_up("frank@example.com").await;

    let anonymous = gw.server.get("/v1/pricing/rules").await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

    let (name, value) = bearer(&user.access_token);
    let customer = gw
        .server
        .post("/v1/pricing/rules")
        .add_header(name, value)
        .json(&json!({ "name": "Free", "condition": "true", "multiplier": 0.01 }))
        .await;
    assert_eq!(customer.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rate_limit_denies_with_retry_after() {
    let config = GatewayConfig::default()
        .with_rate_limit(RateLimitMode::Global(RateLimitConfig::new(3, Duration::from_secs(60))));
    let gw = gateway(config).await;

    for remaining in ["2", "1", "0"] {
        let response = gw.server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(header(&response, "X-RateLimit-Limit"), "3");
        assert_eq!(header(&response, "X-RateLimit-Remaining"), remaining);
    }

    let denied = gw.server.get("/health").await;
    assert_eq!(denied.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&denied, "Retry-After"), "60");
    assert_eq!(denied.json::<Value>()["error"], "rate_limited");
}

#[tokio::test]
async fn tiered_limits_report_the_tier() {
    let gw = gateway(GatewayConfig::default()).await;

    let anonymous = gw.server.get("/health").await;
    assert_eq!(header(&anonymous, "X-RateLimit-Tier"), "anonymous");
    assert_eq!(header(&anonymous, "X-RateLimit-Limit"), "40");

    let tokens = gw.signed_up("gina@example.com").await;
    let (name, value) = bearer(&tokens.access_token);
    let signed_in = gw.server.get("/health").add_header(name, value).await;
    assert_eq!(header(&signed_in, "X-RateLimit-Tier"), "free");
    assert_eq!(header(&signed_in, "X-RateLimit-Limit"), "80");
}

#[tokio::test]
async fn rate_limiter_fails_open() {
    let gw = gateway(GatewayConfig::default()).await;
    gw.limiter_store.set_unavailable(true);

    let response = gw.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.headers().get("X-RateLimit-Limit").is_none());
}
