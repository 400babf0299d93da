use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use opsly_core::OpslyError;

/// Wrapper turning `anyhow::Error` chains into the JSON error envelope.
#[derive(Debug)]
pub struct ApiError(pub anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<OpslyError> for ApiError {
    fn from(e: OpslyError) -> Self {
        Self(e.into_anyhow())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Preserve structured fields when an OpslyError is anywhere in
        // the chain, even wrapped by anyhow contexts.
        if let Some(opsly) = self.0.chain().find_map(|e| e.downcast_ref::<OpslyError>()) {
            let safe = opsly.sanitize_for_client();
            let status =
                StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return (status, Json(safe.to_json())).into_response();
        }

        tracing::error!(error = %self.0, "unclassified error reached the HTTP boundary");
        let safe = OpslyError::general_error("Internal server error").sanitize_for_client();
        (StatusCode::INTERNAL_SERVER_ERROR, Json(safe.to_json())).into_response()
    }
}
