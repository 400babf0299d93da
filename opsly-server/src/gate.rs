//! # Authentication Gate
//!
//! Per-request middleware on protected routes. Validates the bearer
//! token, then re-fetches the tenant from the control store and the
//! user from the tenant store, so deactivating either takes effect on
//! the very next request despite tokens being stateless. Two store
//! round-trips per request, deliberately uncached.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use opsly_core::{Identity, OpslyError};
use opsly_store::users;

use crate::error::ApiError;
use crate::state::AppState;

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req)
        .ok_or_else(|| ApiError::from(OpslyError::not_authenticated("No access token")))?;

    let claims = state.sessions.validate(token)?;

    let tenant = state
        .registry
        .find_by_id(&claims.tid)
        .await?
        .filter(|t| t.active)
        .ok_or_else(|| ApiError::from(OpslyError::not_authenticated("Tenant is not active")))?;

    let pool = state
        .connections
        .tenant_pool_by_storage_id(&tenant.storage_id)
        .await?;
    let user = users::find_by_id(&pool, &claims.sub)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| ApiError::from(OpslyError::not_authenticated("User is not active")))?;

    let identity = Identity {
        user_id: user.id,
        tenant_id: tenant.id,
        role: user.role,
        email: user.email,
        tenant_display_name: tenant.display_name,
    };
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
