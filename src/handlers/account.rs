//! Self-service session management: a session is a live refresh token.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::common::ApiResponse;
use crate::error::ApiError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::services::IntrospectionService;

#[derive(serde::Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn current_user(ctx: &AuthContext) -> Result<Uuid, ApiError> {
    ctx.user_id
        .ok_or_else(|| ApiError::Forbidden("a user principal is required".to_string()))
}

/// GET /api/v2/account/sessions
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<SessionView>>>, ApiError> {
    let user_id = current_user(&ctx)?;
    let sessions = IntrospectionService::new(state.pool.clone(), state.codec.clone())
        .list_sessions(user_id)
        .await?
        .into_iter()
        .map(|row| SessionView {
            id: row.id,
            client_id: row.client_id,
            scopes: row.scopes,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        })
        .collect();
    Ok(Json(ApiResponse::ok(sessions)))
}

/// DELETE /api/v2/account/sessions/{id}
///
/// Only the caller's own sessions are addressable; anything else is a 404.
pub async fn delete_session_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = current_user(&ctx)?;
    IntrospectionService::new(state.pool.clone(), state.codec.clone())
        .delete_session(user_id, id, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "session revoked",
    )))
}
