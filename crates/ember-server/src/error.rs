use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use ember_engine::EngineError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Engine(e) => match e {
                EngineError::Unauthenticated => StatusCode::UNAUTHORIZED,
                EngineError::NotEligible { .. } => StatusCode::FORBIDDEN,
                EngineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                EngineError::QuotaExceeded { .. } | EngineError::AbuseDetected { .. } => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Conflict(_) => StatusCode::CONFLICT,
                EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ServerError::Engine(e) => e.code(),
            ServerError::BadRequest(_) => "invalid_argument",
            ServerError::Forbidden(_) => "forbidden",
            ServerError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });
        match &self {
            ServerError::Engine(EngineError::QuotaExceeded { next_refill_at, .. }) => {
                body["next_refill_at"] = serde_json::json!(next_refill_at);
            }
            ServerError::Engine(EngineError::AbuseDetected {
                severity,
                next_allowed_at,
            }) => {
                body["next_allowed_at"] = serde_json::json!(next_allowed_at);
                body["severity"] = serde_json::json!(severity);
            }
            _ => {}
        }

        (status, axum::Json(body)).into_response()
    }
}

impl From<ember_shared::TokenError> for ServerError {
    fn from(e: ember_shared::TokenError) -> Self {
        tracing::debug!(error = %e, "session rejected");
        ServerError::Engine(EngineError::Unauthenticated)
    }
}
