use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::AppState;
use crate::error::{ApiError, OAuthError};
use crate::middleware::RequestMeta;
use crate::services::{RateLimitConfig, RateLimiterService};

/// Shared window check. `Err` carries the Retry-After seconds.
async fn enforce(
    state: &AppState,
    endpoint: &'static str,
    config: RateLimitConfig,
    request: &Request<Body>,
) -> Result<(), i64> {
    let meta = RequestMeta::from_headers(request.headers());
    let identifier = RateLimiterService::identifier(meta.ip(), None);
    let limiter = RateLimiterService::new(state.pool.clone());

    match limiter.check_and_increment(&identifier, endpoint, &config).await {
        Ok(result) if !result.allowed => {
            Err(result.retry_after_seconds.unwrap_or(config.window_seconds))
        }
        Ok(_) => Ok(()),
        // A broken limiter store must not take the endpoint down.
        Err(e) => {
            tracing::error!(endpoint = endpoint, error = %e, "rate limit check failed");
            Ok(())
        }
    }
}

/// Rate limit for the token endpoint; exceeding it is an OAuth-shaped 429.
pub async fn token_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match enforce(&state, "oauth_token", RateLimitConfig::token(), &request).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => OAuthError::RateLimited { retry_after }.into_response(),
    }
}

pub async fn authorize_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match enforce(&state, "oauth_authorize", RateLimitConfig::authorize(), &request).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => OAuthError::RateLimited { retry_after }.into_response(),
    }
}

pub async fn introspect_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match enforce(&state, "oauth_introspect", RateLimitConfig::introspect(), &request).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => OAuthError::RateLimited { retry_after }.into_response(),
    }
}

pub async fn login_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match enforce(&state, "auth_login", RateLimitConfig::login(), &request).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => ApiError::RateLimited { retry_after }.into_response(),
    }
}

pub async fn register_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match enforce(&state, "auth_register", RateLimitConfig::register(), &request).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => ApiError::RateLimited { retry_after }.into_response(),
    }
}
