use std::time::Duration;

use axum::{
    Json,
    http::{StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{admin::AdminError, database::StoreError, validation::ValidationError};

pub const SERVER_ERROR: &str = "Something went wrong. Please try again later.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Too many requests. Please wait a minute and try again.")]
    RateLimited { retry_after: Duration },

    #[error("Forbidden")]
    OriginRejected,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("We could not save your request. Please submit it again.")]
    ReferenceConflict,

    #[error("Something went wrong. Please try again later.")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => AppError::ReferenceConflict,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::NotFound(_) => AppError::NotFound,
            AdminError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::OriginRejected => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::ReferenceConflict => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(detail) => {
                error!(detail = %detail, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let retry_after = match &self {
            AppError::RateLimited { retry_after } => Some(retry_after.as_secs().max(1)),
            AppError::ReferenceConflict => Some(1),
            _ => None,
        };

        let body = Json(json!({ "ok": false, "error": self.to_string() }));

        match retry_after {
            Some(seconds) => (status, [(RETRY_AFTER, seconds.to_string())], body).into_response(),
            None => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_detail_is_hidden() {
        let e = AppError::Internal("redis: connection refused".to_string());

        assert_eq!(e.to_string(), SERVER_ERROR);
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                AppError::RateLimited {
                    retry_after: Duration::from_secs(30),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AppError::OriginRejected, StatusCode::FORBIDDEN),
            (AppError::ReferenceConflict, StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Internal(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (e, status) in cases {
            assert_eq!(e.into_response().status(), status);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited {
            retry_after: Duration::from_secs(42),
        }
        .into_response();

        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }

    #[test]
    fn test_store_conflict_is_retryable() {
        let e: AppError = StoreError::Conflict("RNT-261019-00AA".to_string()).into();

        assert!(matches!(e, AppError::ReferenceConflict));
    }
}
