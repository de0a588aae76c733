//! Operational endpoints: backups and restore bookkeeping.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::common::ApiResponse;
use crate::dto::system::CreateBackupRequest;
use crate::error::ApiError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::models::SystemBackup;
use crate::services::{AccessDecider, SystemService};

fn actor(ctx: &AuthContext) -> Result<Uuid, ApiError> {
    ctx.user_id
        .ok_or_else(|| ApiError::Forbidden("a user principal is required".to_string()))
}

async fn require_backup(state: &AppState, ctx: &AuthContext) -> Result<(), ApiError> {
    AccessDecider::new(state.pool.clone())
        .require(ctx, &[], &["system:backup"])
        .await
}

pub async fn list_backups_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<SystemBackup>>>, ApiError> {
    require_backup(&state, &ctx).await?;
    let backups = SystemService::new(state.pool.clone()).list_backups().await?;
    Ok(Json(ApiResponse::ok(backups)))
}

pub async fn create_backup_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Json(request): Json<CreateBackupRequest>,
) -> Result<Json<ApiResponse<SystemBackup>>, ApiError> {
    require_backup(&state, &ctx).await?;
    let actor = actor(&ctx)?;
    let backup = SystemService::new(state.pool.clone())
        .create_backup(request.note.as_deref(), actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(backup, "backup recorded")))
}

pub async fn restore_backup_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SystemBackup>>, ApiError> {
    require_backup(&state, &ctx).await?;
    let actor = actor(&ctx)?;
    let backup = SystemService::new(state.pool.clone())
        .restore_backup(id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(backup, "restore recorded")))
}
