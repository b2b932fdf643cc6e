use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;
use validator::ValidationErrors;

use crate::store::StoreError;

/// Field name -> messages, as returned in 400 bodies.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid input")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("Invalid credentials".to_string())
    }

    pub fn invalid_token() -> Self {
        ApiError::Unauthorized("Invalid token".to_string())
    }

    /// Validation failure not tied to one field.
    pub fn non_field(message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert("non_field_errors".to_string(), vec![message.into()]);
        ApiError::Validation(fields)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let messages = errors
                    .iter()
                    .map(|e| match &e.message {
                        Some(message) => message.to_string(),
                        None => e.code.to_string(),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        ApiError::Validation(fields)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => ApiError::BadRequest(message),
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Invalid input", "fields": fields }),
            ),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": message }))
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, serde_json::json!({ "error": message }))
            }
            ApiError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, serde_json::json!({ "error": message }))
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, serde_json::json!({ "error": message }))
            }
            ApiError::Store(err) => {
                tracing::error!(component = "store", error = %err, "store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
            ApiError::Internal(message) => {
                tracing::error!(component = "api", error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
