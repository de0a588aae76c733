//! Read-only audit trail queries.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{Duration, Utc};

use crate::config::AppState;
use crate::dto::audit::{AuditQuery, ReportQuery};
use crate::dto::common::{ApiResponse, PageQuery, Pagination};
use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::models::AuditLog;
use crate::repositories::ActionCount;
use crate::services::{AccessDecider, AuditService};

async fn require_audit_read(state: &AppState, ctx: &AuthContext) -> Result<(), ApiError> {
    AccessDecider::new(state.pool.clone())
        .require(ctx, &[], &["audit:read"])
        .await
}

pub async fn list_audit_logs_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLog>>>, ApiError> {
    require_audit_read(&state, &ctx).await?;
    let page = PageQuery {
        page: query.page,
        per_page: query.per_page,
    };
    let (page_no, per_page, limit, offset) = page.resolve();
    let (items, total) = AuditService::new(state.pool.clone())
        .list(&query.filter(), limit, offset)
        .await?;
    Ok(Json(ApiResponse::paginated(
        items,
        Pagination::new(page_no, per_page, total),
    )))
}

pub async fn get_audit_log_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AuditLog>>, ApiError> {
    require_audit_read(&state, &ctx).await?;
    let entry = AuditService::new(state.pool.clone())
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("audit log entry not found".to_string()))?;
    Ok(Json(ApiResponse::ok(entry)))
}

pub async fn audit_statistics_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ApiResponse<Vec<ActionCount>>>, ApiError> {
    require_audit_read(&state, &ctx).await?;
    let stats = AuditService::new(state.pool.clone())
        .statistics(query.from, query.to)
        .await?;
    Ok(Json(ApiResponse::ok(stats)))
}

pub async fn security_events_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLog>>>, ApiError> {
    require_audit_read(&state, &ctx).await?;
    let (_, _, limit, offset) = page.resolve();
    let events = AuditService::new(state.pool.clone())
        .security_events(limit, offset)
        .await?;
    Ok(Json(ApiResponse::ok(events)))
}

#[derive(serde::Serialize)]
pub struct ComplianceReport {
    pub from: chrono::DateTime<Utc>,
    pub to: chrono::DateTime<Utc>,
    pub total_events: i64,
    pub failed_events: i64,
    pub distinct_actors: i64,
    pub actions: Vec<ActionCount>,
}

/// Aggregate report over a window (default: the last 30 days).
pub async fn compliance_report_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ApiResponse<ComplianceReport>>, ApiError> {
    require_audit_read(&state, &ctx).await?;

    let to = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or(to - Duration::days(30));
    let service = AuditService::new(state.pool.clone());
    let (total_events, failed_events, distinct_actors) =
        service.compliance_summary(from, to).await?;
    let actions = service.statistics(Some(from), Some(to)).await?;

    Ok(Json(ApiResponse::ok(ComplianceReport {
        from,
        to,
        total_events,
        failed_events,
        distinct_actors,
        actions,
    })))
}
