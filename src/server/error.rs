//! Router error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error payload detail
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    /// Stable error code identifier
    pub code: &'static str,
    /// Human readable message
    pub message: String,
}

/// Error response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error detail
    pub error: ErrorDetail,
}

/// Request rejected by the router
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Path is not `/{destination}/chat/completions`
    #[error("not found: {path}")]
    NotFound {
        /// Requested path
        path: String,
    },

    /// Route exists but only accepts POST
    #[error("method {method} not allowed")]
    MethodNotAllowed {
        /// Requested method
        method: String,
    },

    /// Missing or malformed bearer authorization header
    #[error("{message}")]
    Unauthorized {
        /// Human readable message
        message: String,
    },

    /// Request body over the configured limit
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },

    /// Anything that went wrong on our side
    #[error("{message}")]
    Internal {
        /// Human readable message
        message: String,
    },
}

impl ProxyError {
    /// Shorthand for an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        ProxyError::Internal {
            message: message.into(),
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::Internal { .. } => "INTERNAL",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let payload = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };

        (status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::NotFound { path: "/x".into() }.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::MethodNotAllowed { method: "GET".into() }.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ProxyError::Unauthorized { message: "no".into() }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ProxyError::internal("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_response_is_json() {
        let response = ProxyError::internal("store down").into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ProxyError::PayloadTooLarge { limit: 16 }.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["error"]["code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(json["error"]["message"], "request body exceeds 16 bytes");
    }
}
