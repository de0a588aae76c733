//! Registration, the development login helper, and `/auth/me`.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Extension, Json,
};

use crate::config::AppState;
use crate::dto::auth::{LoginRequest, MeResponse, RegisterRequest, SessionResponse};
use crate::dto::common::ApiResponse;
use crate::error::ApiError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::models::User;
use crate::services::{AccessDecider, LockoutConfig, UserService};

fn lockout_config(state: &AppState) -> LockoutConfig {
    LockoutConfig {
        max_failed_attempts: state.config.max_failed_logins,
        lockout_duration_minutes: state.config.lockout_duration_minutes,
        window_minutes: state.config.lockout_window_minutes,
    }
}

/// POST /api/v2/auth/register
///
/// Open when the deployment enables public registration; otherwise restricted
/// to callers holding `users:create`.
pub async fn register_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let actor = if state.config.public_registration {
        None
    } else {
        let ctx = require_bearer_context(&state, &headers).await?;
        AccessDecider::new(state.pool.clone())
            .require(&ctx, &[], &["users:create"])
            .await?;
        ctx.user_id
    };

    let service = UserService::new(state.pool.clone(), lockout_config(&state));
    let user = service
        .create(
            &request.username,
            &request.email,
            &request.password,
            request.display_name.as_deref(),
            actor,
            &meta,
        )
        .await?;
    Ok(Json(ApiResponse::with_message(user, "user registered")))
}

/// POST /api/v2/auth/login — password check plus lockout, answering with a
/// session JWT for the authorize flow. Development convenience; production
/// deployments front this with the external login page.
pub async fn login_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let service = UserService::new(state.pool.clone(), lockout_config(&state));
    let user = service
        .authenticate(&request.username, &request.password, &meta)
        .await?;

    let session_token = state
        .codec
        .issue_session(user.id, state.config.session_ttl_secs)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok(Json(ApiResponse::ok(SessionResponse {
        session_token,
        token_type: "session".to_string(),
        expires_in: state.config.session_ttl_secs,
    })))
}

/// GET /api/v2/auth/me — the caller and their token's view of them.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiResponse<MeResponse>>, ApiError> {
    let user_id = ctx
        .user_id
        .ok_or_else(|| ApiError::Validation("token is not bound to a user".to_string()))?;

    let service = UserService::new(state.pool.clone(), lockout_config(&state));
    let user = service.get(user_id).await?;

    let decider = AccessDecider::new(state.pool.clone());
    let mut permissions: Vec<String> = decider
        .effective_permissions(&ctx)
        .await?
        .iter()
        .cloned()
        .collect();
    permissions.sort();

    Ok(Json(ApiResponse::ok(MeResponse {
        user,
        client_id: ctx.client_id.clone(),
        scopes: ctx.scopes.clone(),
        permissions,
    })))
}

/// Decode a bearer token into an auth context outside the middleware stack;
/// used by routes that are only conditionally protected.
async fn require_bearer_context(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthContext, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let claims = state
        .codec
        .decode_access(token)
        .map_err(|_| ApiError::Unauthorized("invalid token".to_string()))?;

    let blacklist = crate::repositories::BlacklistRepository::new(state.pool.clone());
    if blacklist.contains(&claims.jti).await? {
        return Err(ApiError::Unauthorized("token revoked".to_string()));
    }
    let tokens = crate::repositories::AccessTokenRepository::new(state.pool.clone());
    match tokens.find_by_jti(&claims.jti).await? {
        Some(row) if !row.revoked => Ok(AuthContext::from_claims(&claims)),
        _ => Err(ApiError::Unauthorized("token revoked".to_string())),
    }
}
