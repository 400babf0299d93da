use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use opsly_auth::hash_secret;
use opsly_core::{Identity, NewTenant, OpslyError};
use opsly_store::HealthReport;

use crate::error::ApiError;
use crate::state::AppState;

fn map_json_rejection(rejection: JsonRejection) -> ApiError {
    OpslyError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.to_string()]}))
        .into_anyhow()
        .into()
}

fn require_fields(fields: &[(&str, &str)]) -> Result<(), ApiError> {
    let mut errors = Map::new();
    for (name, value) in fields {
        if value.trim().is_empty() {
            errors.insert((*name).to_string(), json!(["required"]));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(OpslyError::bad_request("Missing required fields")
            .with_errors(Value::Object(errors))
            .into())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /authentication`: hint-free login.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload.map_err(map_json_rejection)?;
    require_fields(&[("email", &body.email), ("password", &body.password)])?;

    let outcome = state.resolver.resolve(&body.email, &body.password).await?;
    let token = state.sessions.issue(outcome.user())?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "accessToken": token,
            "user": outcome.user(),
            "tenant": outcome.tenant().summary(),
        })),
    ))
}

/// `POST /tenants`: tenant registration.
pub async fn register_tenant(
    State(state): State<AppState>,
    payload: Result<Json<NewTenant>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(map_json_rejection)?;
    require_fields(&[
        ("displayName", &input.display_name),
        ("adminEmail", &input.admin_email),
        ("adminSecret", &input.admin_secret),
        ("sharedSecret", &input.shared_secret),
    ])?;

    let cost = state.hash_cost();
    let admin_hash = hash_secret(&input.admin_secret, cost)?;
    let shared_hash = hash_secret(&input.shared_secret, cost)?;
    let tenant = state.registry.register(&input, admin_hash, shared_hash).await?;

    Ok((StatusCode::CREATED, Json(json!(tenant))))
}

/// `GET /health`: connection-manager liveness report, no auth.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.connections.health_check().await)
}

/// `GET /me`: echoes the identity the gate attached.
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}
