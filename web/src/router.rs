//! Route table and middleware stack.

use crate::handlers::{auth, health, pricing, protected, queue};
use crate::middleware::{authenticate, rate_limit, request_id_layer, require_admission};
use crate::state::AppState;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Build the gateway router.
///
/// Middleware runs outermost first: trace, request id, timeout,
/// authentication, rate limit, admission guard.
///
/// # Routes
///
/// ```text
/// GET    /health
/// POST   /v1/auth/register | login | refresh | logout | logout-all
/// GET    /v1/auth/sessions
/// DELETE /v1/auth/sessions/:id
/// POST   /v1/queue/join | leave | validate
/// GET    /v1/queue/position | stats          ?event_id=
/// GET    /v1/queue/config                    ?event_id=   (admin)
/// PUT    /v1/queue/config                                 (admin)
/// POST   /v1/pricing/calculate
/// GET    /v1/pricing/rules                                (admin)
/// POST   /v1/pricing/rules                                (admin)
/// PUT    /v1/pricing/rules/:id                            (admin)
/// DELETE /v1/pricing/rules/:id                            (admin)
/// POST   /v1/holds                                        (admission ticket)
/// POST   /v1/orders                                       (admission ticket)
/// ```
pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/sessions", get(auth::list_sessions))
        .route("/sessions/:id", delete(auth::revoke_session));

    let queue_routes = Router::new()
        .route("/join", post(queue::join))
        .route("/position", get(queue::position))
        .route("/leave", post(queue::leave))
        .route("/validate", post(queue::validate))
        .route("/stats", get(queue::stats))
        .route("/config", get(queue::get_config).put(queue::put_config));

    let pricing_routes = Router::new()
        .route("/calculate", post(pricing::calculate))
        .route("/rules", get(pricing::list_rules).post(pricing::create_rule))
        .route(
            "/rules/:id",
            put(pricing::update_rule).delete(pricing::delete_rule),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1/auth", auth_routes)
        .nest("/v1/queue", queue_routes)
        .nest("/v1/pricing", pricing_routes)
        .route("/v1/holds", post(protected::create_hold))
        .route("/v1/orders", post(protected::create_order))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(request_id_layer())
                .layer(TimeoutLayer::new(state.config.request_timeout))
                .layer(from_fn_with_state(state.clone(), authenticate))
                .layer(from_fn_with_state(state.clone(), rate_limit))
                .layer(from_fn_with_state(state.clone(), require_admission)),
        )
        .with_state(state)
}
