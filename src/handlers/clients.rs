//! Admin client management.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::client::{ClientWithSecret, CreateClientRequest, UpdateClientRequest};
use crate::dto::common::{ApiResponse, PageQuery, Pagination};
use crate::error::ApiError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::models::Client;
use crate::services::{AccessDecider, ClientRegistryService};

fn actor(ctx: &AuthContext) -> Result<Uuid, ApiError> {
    ctx.user_id
        .ok_or_else(|| ApiError::Forbidden("a user principal is required".to_string()))
}

async fn require(state: &AppState, ctx: &AuthContext, permission: &str) -> Result<(), ApiError> {
    AccessDecider::new(state.pool.clone())
        .require(ctx, &[], &[permission])
        .await
}

pub async fn list_clients_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Client>>>, ApiError> {
    require(&state, &ctx, "clients:read").await?;
    let (page_no, per_page, limit, offset) = page.resolve();
    let (clients, total) = ClientRegistryService::new(state.pool.clone())
        .list(limit, offset)
        .await?;
    Ok(Json(ApiResponse::paginated(
        clients,
        Pagination::new(page_no, per_page, total),
    )))
}

/// POST /api/v2/clients — the only response that ever carries the plaintext
/// secret.
pub async fn create_client_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Json(request): Json<CreateClientRequest>,
) -> Result<Json<ApiResponse<ClientWithSecret>>, ApiError> {
    require(&state, &ctx, "clients:create").await?;
    let actor = actor(&ctx)?;
    let (client, secret) = ClientRegistryService::new(state.pool.clone())
        .create(request.into_params()?, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        ClientWithSecret {
            client,
            client_secret: secret,
        },
        "store the client_secret now; it is not retrievable later",
    )))
}

pub async fn get_client_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Client>>, ApiError> {
    require(&state, &ctx, "clients:read").await?;
    let client = ClientRegistryService::new(state.pool.clone()).get(id).await?;
    Ok(Json(ApiResponse::ok(client)))
}

pub async fn update_client_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateClientRequest>,
) -> Result<Json<ApiResponse<ClientWithSecret>>, ApiError> {
    require(&state, &ctx, "clients:update").await?;
    let actor = actor(&ctx)?;
    let (client, secret) = ClientRegistryService::new(state.pool.clone())
        .update(id, request.into_params()?, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::ok(ClientWithSecret {
        client,
        client_secret: secret,
    })))
}

pub async fn delete_client_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require(&state, &ctx, "clients:delete").await?;
    let actor = actor(&ctx)?;
    ClientRegistryService::new(state.pool.clone())
        .delete(id, actor, &meta)
        .await?;
    Ok(Json(ApiResponse::with_message(
        serde_json::json!({ "id": id }),
        "client deleted and all issued tokens revoked",
    )))
}
