//! Application error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by query compilation, enrichment, and the engagement store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Bad filter, pagination, or mutation input.
    #[error("{0}")]
    Validation(String),

    /// The sort token is not in the whitelist.
    #[error("invalid sort '{token}'; expected one of: {}", .valid.join(", "))]
    InvalidSort {
        token: String,
        valid: Vec<&'static str>,
    },

    /// No latest document with this name.
    #[error("server not found: {0}")]
    NotFound(String),

    /// A stored document could not be decoded.
    #[error("failed to decode document '{name}': {reason}")]
    Decode { name: String, reason: String },

    /// The request deadline elapsed before the database answered.
    #[error("query timed out")]
    Timeout,

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl CatalogError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// HTTP-facing application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Catalog(CatalogError),
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(msg) => AppError::BadRequest(msg),
            err @ CatalogError::InvalidSort { .. } => AppError::BadRequest(err.to_string()),
            CatalogError::NotFound(_) => AppError::NotFound,
            CatalogError::Timeout => AppError::Timeout,
            other => AppError::Catalog(other),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
        };

        // Internal detail is logged, never echoed.
        let message = match &self {
            AppError::Catalog(e) => {
                tracing::error!(error = %e, source = ?std::error::Error::source(e), "catalog error");
                "internal server error".to_string()
            }
            AppError::BadRequest(msg) => msg.clone(),
            _ => self.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sort_names_valid_tokens() {
        let err = CatalogError::InvalidSort {
            token: "bogus".to_string(),
            valid: vec!["newest", "rating_desc"],
        };
        let msg = err.to_string();
        assert!(msg.contains("bogus"));
        assert!(msg.contains("rating_desc"));

        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn decode_error_maps_to_generic_500() {
        let err = CatalogError::Decode {
            name: "io.example/secret".to_string(),
            reason: "expected object".to_string(),
        };
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn database_error_maps_to_generic_500() {
        let err = AppError::from(CatalogError::from(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, AppError::Catalog(CatalogError::Database(_))));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_maps_to_400() {
        let response = AppError::from(CatalogError::validation("rating must be between 1 and 5"))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn timeout_maps_to_408() {
        let response = AppError::from(CatalogError::Timeout).into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response =
            AppError::from(CatalogError::NotFound("x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
