//! Permission registry management.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::common::ApiResponse;
use crate::dto::rbac::{CreatePermissionRequest, UpdatePermissionRequest};
use crate::error::ApiError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::models::Permission;
use crate::services::{AccessDecider, RbacService};

fn actor(ctx: &AuthContext) -> Result<Uuid, ApiError> {
    ctx.user_id
        .ok_or_else(|| ApiError::Forbidden("a user principal is required".to_string()))
}

async fn require(state: &AppState, ctx: &AuthContext, permission: &str) -> Result<(), ApiError> {
    AccessDecider::new(state.pool.clone())
        .require(ctx, &[], &[permission])
        .await
}

pub async fn list_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<Permission>>>, ApiError> {
    require(&state, &ctx, "permissions:read").await?;
    let permissions = RbacService::new(state.pool.clone()).list_permissions().await?;
    Ok(Json(ApiResponse::ok(permissions)))
}

pub async fn create_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Json(request): Json<CreatePermissionRequest>,
) -> Result<Json<ApiResponse<Permission>>, ApiError> {
    require(&state, &ctx, "permissions:create").await?;
    let actor = actor(&ctx)?;
    let permission = RbacService::new(state.pool.clone())
        .create_permission(
            &request.name,
            request.permission_type.as_deref().unwrap_or("api"),
            request.display_name.as_deref(),
            request.description.as_deref(),
            actor,
            &meta,
        )
        .await?;
    Ok(Json(ApiResponse::with_message(permission, "permission created")))
}

pub async fn get_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Permission>>, ApiError> {
    require(&state, &ctx, "permissions:read").await?;
    let permission = RbacService::new(state.pool.clone()).get_permission(id).await?;
    Ok(Json(ApiResponse::ok(permission)))
}

pub async fn update_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePermissionRequest>,
) -> Result<Json<ApiResponse<Permission>>, ApiError> {
    require(&state, &ctx, "permissions:update").await?;
    let actor = actor(&ctx)?;
    let permission = RbacService::new(state.pool.clone())
        .update_permission(
            id,
            request.display_name.as_deref(),
            request.description.as_deref(),
            request.is_active,
            actor,
            &meta,
        )
        .await?;
    Ok(Json(ApiResponse::ok(permission)))
}

pub async fn delete_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "permissions:delete").await?;
    let actor = actor(&ctx)?;
    RbacService::new(state.pool.clone())
        .delete_permission(id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "permission deleted",
    )))
}
