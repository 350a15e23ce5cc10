//! Transport error mapping
//!
//! Domain errors become JSON bodies `{"detail": ..., "retry_after"?: ...}`
//! with the status code the error kind dictates. Internal details never
//! leak: database/config/internal errors are logged and collapsed to a
//! generic message.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use opsdesk_common::Error;
use serde_json::json;
use tracing::{debug, error};

/// Wrapper giving domain errors an `IntoResponse` impl
#[derive(Debug)]
pub struct ApiError(pub Error);

/// Handler result alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let detail = match &self.0 {
            Error::Database(_) | Error::Config(_) | Error::Internal(_) | Error::Other(_) => {
                error!("Internal error: {}", self.0);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        debug!(code = self.0.code(), status = %status, "Request failed: {}", detail);

        let mut body = json!({ "detail": detail });
        if let Some(retry_after) = self.0.retry_after() {
            body["retry_after"] = json!(retry_after);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = self.0.retry_after() {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::NotFound("x".to_string()), 404),
            (Error::InvalidInput("x".to_string()), 422),
            (Error::InvalidStatus("x".to_string()), 422),
            (Error::Conflict("x".to_string()), 409),
            (Error::InUse(vec!["a".to_string()]), 409),
            (Error::Unauthorised("x".to_string()), 401),
            (Error::Forbidden("x".to_string()), 403),
            (Error::RateLimited { retry_after_secs: 9 }, 429),
        ];

        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status().as_u16(), expected);
        }
    }

    #[test]
    fn test_rate_limit_carries_retry_after_header() {
        let response = ApiError(Error::RateLimited {
            retry_after_secs: 30,
        })
        .into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "30");
    }

    #[test]
    fn test_internal_detail_is_masked() {
        let response = ApiError(Error::Database("secret dsn".to_string())).into_response();
        assert_eq!(response.status().as_u16(), 500);
    }
}
