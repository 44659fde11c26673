//! HTTP-facing error type
//!
//! Every handler returns [`ApiResult`]. Bodies carry a short user-facing
//! message only; the underlying cause is logged where the error is produced.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required request field is absent or empty
    #[error("missing input: {0}")]
    MissingInput(&'static str),
    /// The referenced resource does not exist
    #[error("not found: {0}")]
    NotFound(&'static str),
    /// The request breaks a business rule
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    /// Bad credentials, bad token or failed identity assertion
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    /// The record already exists
    #[error("conflict: {0}")]
    Conflict(&'static str),
    /// Unexpected failure; the message is the public one
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingInput(_) | ApiError::BadRequest(_) | ApiError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ApiError::MissingInput(m)
            | ApiError::NotFound(m)
            | ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Conflict(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.message(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => ApiError::Conflict("El registro ya existe"),
            StoreError::MissingReference => ApiError::NotFound("Recurso no encontrado"),
            StoreError::Database(e) => {
                tracing::error!(error = ?e, "Unexpected persistence failure");
                ApiError::Internal("Error interno del servidor")
            }
        }
    }
}
