use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use opsly_core::AppConfig;
use opsly_server::{router, AppState};
use opsly_store::users;

fn test_state() -> AppState {
    let base = std::env::temp_dir().join(format!("opsly-server-test-{}", uuid::Uuid::new_v4()));
    let mut config = AppConfig::new();
    config.set("store.base_url", base.to_string_lossy());
    config.set("auth.jwt.secret", "test-secret");
    config.set("auth.hash_cost", "4");
    AppState::from_config(config.snapshot()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_authed(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
    let res = router(state.clone()).oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn register_acme(state: &AppState) -> Value {
    let (status, body) = send(
        state,
        post_json(
            "/tenants",
            json!({
                "displayName": "Acme Corp",
                "adminEmail": "a@acme.com",
                "adminSecret": "Sup3rSecret!",
                "sharedSecret": "Gen3ral1",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

async fn login(state: &AppState, email: &str, password: &str) -> (StatusCode, Value) {
    send(
        state,
        post_json("/authentication", json!({"email": email, "password": password})),
    )
    .await
}

#[tokio::test]
async fn acme_corp_end_to_end() {
    let state = test_state();

    let tenant = register_acme(&state).await;
    assert_eq!(tenant["displayName"], "Acme Corp");
    assert_eq!(tenant["storageId"], "acme_corp_db");
    assert!(tenant.get("adminSecretHash").is_none());

    // Admin login.
    let (status, body) = login(&state, "a@acme.com", "Sup3rSecret!").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["tenant"]["displayName"], "Acme Corp");
    assert!(body["accessToken"].as_str().is_some());

    // First shared-secret login auto-provisions a user.
    let (status, first) = login(&state, "new.user@acme.com", "Gen3ral1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["user"]["role"], "user");
    assert_eq!(first["user"]["email"], "new.user@acme.com");
    assert!(first["user"]["lastLogin"].as_str().is_some());

    // Second login reuses the same record.
    let (status, second) = login(&state, "new.user@acme.com", "Gen3ral1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["user"]["id"], first["user"]["id"]);
    assert!(second["user"]["lastLogin"].as_str().is_some());

    // No duplicate record exists in the tenant store.
    let pool = state
        .connections
        .tenant_pool_by_storage_id("acme_corp_db")
        .await
        .unwrap();
    let found = users::find_by_email(&pool, "new.user@acme.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, first["user"]["id"].as_str().unwrap());
}

#[tokio::test]
async fn duplicate_registrations_conflict() {
    let state = test_state();
    register_acme(&state).await;

    let (status, body) = send(
        &state,
        post_json(
            "/tenants",
            json!({
                "displayName": "Acme Corp",
                "adminEmail": "other@acme.com",
                "adminSecret": "x",
                "sharedSecret": "y",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["name"], "Conflict");
    assert_eq!(body["message"], "Display name already registered");

    let (status, body) = send(
        &state,
        post_json(
            "/tenants",
            json!({
                "displayName": "Totally Different",
                "adminEmail": "a@acme.com",
                "adminSecret": "x",
                "sharedSecret": "y",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Admin email already registered");
}

#[tokio::test]
async fn login_failures_are_opaque_and_malformed_input_is_400() {
    let state = test_state();
    register_acme(&state).await;

    let (status, body) = login(&state, "a@acme.com", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["name"], "NotAuthenticated");
    assert_eq!(body["message"], "Invalid login");

    let (status, body) = login(&state, "nobody@nowhere.com", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid login");

    // Missing password.
    let (status, body) = send(
        &state,
        post_json("/authentication", json!({"email": "a@acme.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["password"].is_array());

    // Broken JSON.
    let req = Request::builder()
        .method("POST")
        .uri("/authentication")
        .header("content-type", "application/json")
        .body(Body::from("{\"email\":"))
        .unwrap();
    let (status, body) = send(&state, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["className"], "bad-request");
}

#[tokio::test]
async fn gate_attaches_identity_and_enforces_live_revocation() {
    let state = test_state();
    register_acme(&state).await;

    let (_, body) = login(&state, "new.user@acme.com", "Gen3ral1").await;
    let token = body["accessToken"].as_str().unwrap().to_string();
    let user_id = body["user"]["id"].as_str().unwrap().to_string();

    // No token.
    let req = Request::builder().uri("/me").body(Body::empty()).unwrap();
    let (status, _) = send(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Valid token.
    let (status, me) = send(&state, get_authed("/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["userId"], user_id.as_str());
    assert_eq!(me["role"], "user");
    assert_eq!(me["tenantDisplayName"], "Acme Corp");

    // Deactivate the user: the same token fails on the very next call.
    let pool = state
        .connections
        .tenant_pool_by_storage_id("acme_corp_db")
        .await
        .unwrap();
    users::set_active(&pool, &user_id, false).await.unwrap();

    let (status, body) = send(&state, get_authed("/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User is not active");
}

#[tokio::test]
async fn gate_rejects_tokens_for_deactivated_tenants() {
    let state = test_state();
    let tenant = register_acme(&state).await;

    let (_, body) = login(&state, "a@acme.com", "Sup3rSecret!").await;
    let token = body["accessToken"].as_str().unwrap().to_string();

    state
        .registry
        .set_active(tenant["id"].as_str().unwrap(), false)
        .await
        .unwrap();

    let (status, body) = send(&state, get_authed("/me", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Tenant is not active");
}

#[tokio::test]
async fn health_reports_cached_stores_and_responses_carry_request_ids() {
    let state = test_state();

    let (status, body) = send(
        &state,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["control"], false);
    assert_eq!(body["tenants"], json!([]));

    register_acme(&state).await;

    let res = router(state.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(res.headers().get("x-request-id").is_some());
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["control"], true);
    assert_eq!(body["tenants"], json!(["acme_corp_db"]));
}
