//! HTTP error handling for the web API.
//!
//! Only synchronous request-validation errors surface here. Replication
//! outcomes are detached from the request that triggered them and reach
//! callers exclusively through the push channel.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Human-readable error message
    pub message: String,
    /// HTTP status (not serialized)
    #[serde(skip)]
    pub status: StatusCode,
}

/// A specialized `Result` for handler functions.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            message: "Not Found".into(),
            status: StatusCode::NOT_FOUND,
        }
    }

    /// Create an internal server error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_bad_request() {
            Self::bad_request(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_400() {
        let api: ApiError = Error::ReplicationInProgress.into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "replication already in progress");
    }

    #[test]
    fn test_malformed_maps_to_400() {
        let api: ApiError = Error::MalformedRequest("missing source".into()).into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_maps_to_500() {
        let api: ApiError = Error::Internal("oops".into()).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_is_not_serialized() {
        let json = serde_json::to_string(&ApiError::not_found()).unwrap();
        assert!(json.contains("Not Found"));
        assert!(!json.contains("status"));
    }
}
