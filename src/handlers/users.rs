//! Admin user management: CRUD, activation, lock, roles and direct
//! permissions.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::common::{ApiResponse, PageQuery, Pagination};
use crate::dto::user::{
    AssignRoleRequest, CreateUserRequest, GrantPermissionRequest, LockUserRequest,
    UpdateUserRequest,
};
use crate::error::ApiError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::models::{Role, User, UserPermission};
use crate::services::{AccessDecider, LockoutConfig, RbacService, UserService};

fn user_service(state: &AppState) -> UserService {
    UserService::new(
        state.pool.clone(),
        LockoutConfig {
            max_failed_attempts: state.config.max_failed_logins,
            lockout_duration_minutes: state.config.lockout_duration_minutes,
            window_minutes: state.config.lockout_window_minutes,
        },
    )
}

fn actor(ctx: &AuthContext) -> Result<Uuid, ApiError> {
    ctx.user_id
        .ok_or_else(|| ApiError::Forbidden("a user principal is required".to_string()))
}

async fn require(state: &AppState, ctx: &AuthContext, permission: &str) -> Result<(), ApiError> {
    AccessDecider::new(state.pool.clone())
        .require(ctx, &[], &[permission])
        .await
}

pub async fn list_users_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    require(&state, &ctx, "users:read").await?;
    let (page_no, per_page, limit, offset) = page.resolve();
    let (users, total) = user_service(&state).list(limit, offset).await?;
    Ok(Json(ApiResponse::paginated(
        users,
        Pagination::new(page_no, per_page, total),
    )))
}

pub async fn create_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    require(&state, &ctx, "users:create").await?;
    let actor = actor(&ctx)?;
    let user = user_service(&state)
        .create(
            &request.username,
            &request.email,
            &request.password,
            request.display_name.as_deref(),
            Some(actor),
            &meta,
        )
        .await?;
    Ok(Json(ApiResponse::with_message(user, "user created")))
}

pub async fn get_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    require(&state, &ctx, "users:read").await?;
    let user = user_service(&state).get(id).await?;
    Ok(Json(ApiResponse::ok(user)))
}

pub async fn update_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    let service = user_service(&state);
    if let Some(password) = &request.password {
        service.change_password(id, password, actor, &meta).await?;
    }
    let user = service
        .update(
            id,
            request.email.as_deref(),
            request.display_name.as_deref(),
            request.email_verified,
            request.must_change_password,
            actor,
            &meta,
        )
        .await?;
    Ok(Json(ApiResponse::ok(user)))
}

pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:delete").await?;
    let actor = actor(&ctx)?;
    user_service(&state).delete(id, actor, &meta).await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "user deleted",
    )))
}

pub async fn activate_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    user_service(&state).set_active(id, true, actor, &meta).await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "user activated",
    )))
}

pub async fn deactivate_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    user_service(&state).set_active(id, false, actor, &meta).await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "user deactivated",
    )))
}

pub async fn lock_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<LockUserRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    user_service(&state)
        .lock(id, request.minutes, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "user locked",
    )))
}

pub async fn unlock_user_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    user_service(&state).unlock(id, actor, &meta).await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "user unlocked",
    )))
}

pub async fn user_roles_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Role>>>, ApiError> {
    require(&state, &ctx, "users:read").await?;
    let roles = RbacService::new(state.pool.clone()).user_roles(id).await?;
    Ok(Json(ApiResponse::ok(roles)))
}

pub async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignRoleRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    RbacService::new(state.pool.clone())
        .assign_role_to_user(id, request.role_id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "user_id": id, "role_id": request.role_id }),
        "role assigned",
    )))
}

pub async fn remove_role_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path((id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    RbacService::new(state.pool.clone())
        .remove_role_from_user(id, role_id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "user_id": id, "role_id": role_id }),
        "role removed",
    )))
}

#[derive(serde::Serialize)]
pub struct UserPermissionsView {
    pub direct: Vec<UserPermission>,
    pub effective: Vec<String>,
}

pub async fn user_permissions_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserPermissionsView>>, ApiError> {
    require(&state, &ctx, "users:read").await?;
    let rbac = RbacService::new(state.pool.clone());
    let direct = rbac.user_direct_permissions(id).await?;
    let mut effective = rbac.user_effective_permissions(id).await?;
    effective.sort();
    Ok(Json(ApiResponse::ok(UserPermissionsView { direct, effective })))
}

pub async fn grant_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<GrantPermissionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    RbacService::new(state.pool.clone())
        .grant_permission_to_user(id, request.permission_id, request.expires_at, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "user_id": id, "permission_id": request.permission_id }),
        "permission granted",
    )))
}

pub async fn revoke_permission_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "users:update").await?;
    let actor = actor(&ctx)?;
    RbacService::new(state.pool.clone())
        .revoke_permission_from_user(id, permission_id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "user_id": id, "permission_id": permission_id }),
        "permission revoked",
    )))
}
