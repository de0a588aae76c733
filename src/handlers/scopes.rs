//! Scope registry management.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::common::ApiResponse;
use crate::dto::rbac::{CreateScopeRequest, UpdateScopeRequest};
use crate::error::ApiError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::models::{actions, Scope};
use crate::repositories::ScopeRepository;
use crate::services::{AccessDecider, AuditEvent, AuditService};

fn actor(ctx: &AuthContext) -> Result<Uuid, ApiError> {
    ctx.user_id
        .ok_or_else(|| ApiError::Forbidden("a user principal is required".to_string()))
}

async fn require(state: &AppState, ctx: &AuthContext, permission: &str) -> Result<(), ApiError> {
    AccessDecider::new(state.pool.clone())
        .require(ctx, &[], &[permission])
        .await
}

pub async fn list_scopes_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<Scope>>>, ApiError> {
    require(&state, &ctx, "scopes:read").await?;
    let scopes = ScopeRepository::new(state.pool.clone()).list().await?;
    Ok(Json(ApiResponse::ok(scopes)))
}

pub async fn create_scope_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Json(request): Json<CreateScopeRequest>,
) -> Result<Json<ApiResponse<Scope>>, ApiError> {
    require(&state, &ctx, "scopes:create").await?;
    let actor = actor(&ctx)?;

    if request.name.is_empty() || request.name.contains(char::is_whitespace) {
        return Err(ApiError::Validation(
            "scope name must be a non-empty token without whitespace".to_string(),
        ));
    }
    let repo = ScopeRepository::new(state.pool.clone());
    if repo.find_by_name(&request.name).await?.is_some() {
        return Err(ApiError::Conflict("scope already exists".to_string()));
    }
    let scope = repo
        .create(
            Uuid::new_v4(),
            &request.name,
            request.description.as_deref(),
            request.is_default,
        )
        .await?;

    AuditService::new(state.pool.clone())
        .record(
            AuditEvent::by_user(actor, actions::SCOPE_CREATED, "scope")
                .resource(scope.name.clone())
                .from_addr(meta.ip(), meta.user_agent()),
        )
        .await;
    Ok(Json(ApiResponse::with_message(scope, "scope created")))
}

pub async fn get_scope_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Scope>>, ApiError> {
    require(&state, &ctx, "scopes:read").await?;
    let scope = ScopeRepository::new(state.pool.clone())
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("scope not found".to_string()))?;
    Ok(Json(ApiResponse::ok(scope)))
}

pub async fn update_scope_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateScopeRequest>,
) -> Result<Json<ApiResponse<Scope>>, ApiError> {
    require(&state, &ctx, "scopes:update").await?;
    let actor = actor(&ctx)?;

    let repo = ScopeRepository::new(state.pool.clone());
    let scope = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("scope not found".to_string()))?;
    repo.update(id, request.description.as_deref(), request.is_default)
        .await?;

    AuditService::new(state.pool.clone())
        .record(
            AuditEvent::by_user(actor, actions::SCOPE_UPDATED, "scope")
                .resource(scope.name.clone())
                .from_addr(meta.ip(), meta.user_agent()),
        )
        .await;
    let updated = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("scope not found".to_string()))?;
    Ok(Json(ApiResponse::ok(updated)))
}

pub async fn delete_scope_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "scopes:delete").await?;
    let actor = actor(&ctx)?;

    let repo = ScopeRepository::new(state.pool.clone());
    let scope = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("scope not found".to_string()))?;
    repo.delete(id).await?;

    AuditService::new(state.pool.clone())
        .record(
            AuditEvent::by_user(actor, actions::SCOPE_DELETED, "scope")
                .resource(scope.name.clone())
                .from_addr(meta.ip(), meta.user_agent()),
        )
        .await;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "scope deleted",
    )))
}
