use crate::services::access::Denial;
use crate::services::ingest::IngestError;
use crate::services::storage::StoreError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

/// Challenge sent with every 401.
pub const AUTH_CHALLENGE: &str = "Bearer realm=\"media\"";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage engine error: {0}")]
    Engine(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Engine(_) | AppError::Internal(_) | AppError::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the caller. Internal details are only logged.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::Engine(msg) => msg.clone(),
            AppError::Internal(_) | AppError::Anyhow(_) => "Internal Server Error".to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::Engine(msg) => tracing::error!("Storage engine error: {}", msg),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::Anyhow(e) => tracing::error!("Anyhow error: {:?}", e),
            other => tracing::debug!("Request rejected: {}", other),
        }
    }

    /// Error element written inside an already streaming response.
    pub fn to_event(&self) -> Value {
        self.log();
        json!({
            "status": "error",
            "msg": self.public_message(),
            "code": self.status_code().as_u16(),
        })
    }
}

/// Body shared by every failed request.
pub fn error_body(code: StatusCode, msg: &str) -> Value {
    json!({
        "status": "error",
        "msg": msg,
        "code": code.as_u16(),
        "time": chrono::Utc::now().timestamp_millis(),
    })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        let body = Json(error_body(status, &self.public_message()));

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(AUTH_CHALLENGE),
            );
        }
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            StoreError::Invalid { message } => AppError::BadRequest(message),
            StoreError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            StoreError::Closed | StoreError::Io(_) | StoreError::Serialization(_) => {
                AppError::Engine(err.to_string())
            }
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthenticated => AppError::Unauthorized("access denied".to_string()),
            Denial::Insufficient {
                principal,
                required,
            } => AppError::Forbidden(format!(
                "permission refused: {} requires {}",
                principal, required
            )),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::LimitExceeded { .. } => AppError::PayloadTooLarge(err.to_string()),
            IngestError::Source(_) => AppError::BadRequest(err.to_string()),
            IngestError::Allocation { .. } => AppError::Internal(err.to_string()),
        }
    }
}
