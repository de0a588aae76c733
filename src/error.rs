use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Errors returned by the RFC-shaped OAuth endpoints.
///
/// Serialized as `{"error": "...", "error_description": "..."}` per RFC 6749 §5.2.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Client authentication failed")]
    InvalidClient,

    #[error("{0}")]
    InvalidGrant(String),

    #[error("{0}")]
    InvalidScope(String),

    #[error("Client is not authorized for this grant type")]
    UnauthorizedClient,

    #[error("Grant type not supported")]
    UnsupportedGrantType,

    #[error("Access denied")]
    AccessDenied,

    #[error("Token lacks a required scope")]
    InsufficientScope,

    #[error("Too many requests")]
    RateLimited { retry_after: i64 },

    #[error("Service temporarily unavailable")]
    TemporarilyUnavailable,

    #[error("Internal server error")]
    ServerError(String),
}

impl OAuthError {
    /// Stable error code used on the wire and in `error` redirect parameters.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::UnauthorizedClient => "unauthorized_client",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::InsufficientScope => "insufficient_scope",
            OAuthError::RateLimited { .. } => "rate_limited",
            OAuthError::TemporarilyUnavailable => "temporarily_unavailable",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthError::AccessDenied | OAuthError::InsufficientScope => StatusCode::FORBIDDEN,
            OAuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            OAuthError::TemporarilyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<sqlx::Error> for OAuthError {
    fn from(e: sqlx::Error) -> Self {
        OAuthError::ServerError(format!("database error: {}", e))
    }
}

#[derive(Serialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        // Internal detail stays in the log, not on the wire.
        if let OAuthError::ServerError(detail) = &self {
            tracing::error!(detail = %detail, "oauth endpoint failed");
        }

        let description = match &self {
            OAuthError::ServerError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = Json(OAuthErrorBody {
            error: self.code().to_string(),
            error_description: Some(description),
        });

        match self {
            OAuthError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                body,
            )
                .into_response(),
            OAuthError::InvalidClient => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"token\"".to_string())],
                body,
            )
                .into_response(),
            other => (other.status(), body).into_response(),
        }
    }
}

/// Errors returned by the admin/JSON surface.
///
/// Serialized as `{"success": false, "error": {"code", "message"}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Too many requests")]
    RateLimited { retry_after: i64 },

    #[error("{0}")]
    Configuration(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Configuration(_) => "configuration",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(anyhow::anyhow!("database error: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            tracing::error!(error = %e, "request failed");
        }

        let message = match &self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));

        if let ApiError::RateLimited { retry_after } = self {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                body,
            )
                .into_response();
        }

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_codes_are_stable() {
        assert_eq!(OAuthError::InvalidRequest("x".into()).code(), "invalid_request");
        assert_eq!(OAuthError::InvalidClient.code(), "invalid_client");
        assert_eq!(OAuthError::InvalidGrant("x".into()).code(), "invalid_grant");
        assert_eq!(OAuthError::UnsupportedGrantType.code(), "unsupported_grant_type");
        assert_eq!(OAuthError::AccessDenied.code(), "access_denied");
    }

    #[test]
    fn oauth_error_status_mapping() {
        assert_eq!(
            OAuthError::InvalidClient.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            OAuthError::InvalidGrant("bad code".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OAuthError::InsufficientScope.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            OAuthError::RateLimited { retry_after: 30 }.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let response = OAuthError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn api_error_status_mapping() {
        assert_eq!(
            ApiError::Validation("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("user".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("dup".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Forbidden("no".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_hides_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused to 10.0.0.3"));
        assert_eq!(err.to_string(), "Internal server error");
    }
}
