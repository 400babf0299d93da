use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use opsly_core::AppConfig;

use crate::gate;
use crate::routes;
use crate::state::AppState;

/// Defaults plus environment overrides. `DATABASE_URL` and
/// `AUTH_JWT_SECRET` have no defaults; `validate_required` fails
/// startup when they are absent.
pub fn load_config() -> AppConfig {
    let mut config = AppConfig::new();
    config.set("http.host", "127.0.0.1");
    config.set("http.port", "3000");

    config.set_from_env("store.base_url", "DATABASE_URL");
    config.set_from_env("auth.jwt.secret", "AUTH_JWT_SECRET");
    config.set_from_env("http.host", "HTTP_HOST");
    config.set_from_env("http.port", "HTTP_PORT");
    config.set_from_env("auth.token_ttl_secs", "AUTH_TOKEN_TTL_SECS");
    config.set_from_env("auth.hash_cost", "AUTH_HASH_COST");
    config.set_from_env("store.connect_timeout_secs", "STORE_CONNECT_TIMEOUT_SECS");
    config.set_from_env("store.idle_timeout_secs", "STORE_IDLE_TIMEOUT_SECS");
    config
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(routes::me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::authenticate,
        ));

    Router::new()
        .route("/authentication", post(routes::login))
        .route("/tenants", post(routes::register_tenant))
        .route("/health", get(routes::health))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
