//! Role management and role-permission links.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::common::ApiResponse;
use crate::dto::rbac::{AssignPermissionRequest, CreateRoleRequest, UpdateRoleRequest};
use crate::error::ApiError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::models::{Permission, Role};
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

pub async fn list_roles_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<Role>>>, ApiError> {
    require(&state, &ctx, "roles:read").await?;
    let roles = RbacService::new(state.pool.clone()).list_roles().await?;
    Ok(Json(ApiResponse::ok(roles)))
}

pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Json(request): Json<CreateRoleRequest>,
) -> Result<Json<ApiResponse<Role>>, ApiError> {
    require(&state, &ctx, "roles:create").await?;
    let actor = actor(&ctx)?;
    let role = RbacService::new(state.pool.clone())
        .create_role(&request.name, &request.display_name, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(role, "role created")))
}

pub async fn get_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Role>>, ApiError> {
    require(&state, &ctx, "roles:read").await?;
    let role = RbacService::new(state.pool.clone()).get_role(id).await?;
    Ok(Json(ApiResponse::ok(role)))
}

pub async fn update_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<Role>>, ApiError> {
    require(&state, &ctx, "roles:update").await?;
    let actor = actor(&ctx)?;
    let role = RbacService::new(state.pool.clone())
        .update_role(
            id,
            request.display_name.as_deref(),
            request.is_active,
            actor,
            &meta,
        )
        .await?;
    Ok(Json(ApiResponse::ok(role)))
}

pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "roles:delete").await?;
    let actor = actor(&ctx)?;
    RbacService::new(state.pool.clone())
        .delete_role(id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "role deleted",
    )))
}

pub async fn role_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Permission>>>, ApiError> {
    require(&state, &ctx, "roles:read").await?;
    let permissions = RbacService::new(state.pool.clone())
        .role_permissions(id)
        .await?;
    Ok(Json(ApiResponse::ok(permissions)))
}

pub async fn assign_role_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignPermissionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "roles:update").await?;
    let actor = actor(&ctx)?;
    RbacService::new(state.pool.clone())
        .assign_permission_to_role(id, request.permission_id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "role_id": id, "permission_id": request.permission_id }),
        "permission assigned",
    )))
}

pub async fn remove_role_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "roles:update").await?;
    let actor = actor(&ctx)?;
    RbacService::new(state.pool.clone())
        .remove_permission_from_role(id, permission_id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "role_id": id, "permission_id": permission_id }),
        "permission removed",
    )))
}
