use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, QueryBuilder};
use uuid::Uuid;

use crate::models::AuditLog;

/// Filters accepted by the audit query endpoints.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub actor_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub client_id: Option<String>,
    pub resource_type: Option<String>,
    pub success: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Aggregated counts for the statistics endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActionCount {
    pub action: String,
    pub total: i64,
    pub failures: i64,
}

/// Append-only repository for the audit trail.
#[derive(Clone)]
pub struct AuditLogRepository {
    pool: MySqlPool,
}

impl AuditLogRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        actor_type: &str,
        actor_id: Option<&str>,
        user_id: Option<Uuid>,
        client_id: Option<&str>,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        success: bool,
        error_message: Option<&str>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
            (actor_type, actor_id, user_id, client_id, action, resource_type,
             resource_id, success, error_message, ip_address, user_agent, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(actor_type)
        .bind(actor_id)
        .bind(user_id.map(|u| u.to_string()))
        .bind(client_id)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(success)
        .bind(error_message)
        .bind(ip_address)
        .bind(user_agent)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<AuditLog>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>("SELECT * FROM audit_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(
        &self,
        filter: &AuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let mut qb = QueryBuilder::new("SELECT * FROM audit_logs WHERE 1 = 1");
        Self::apply_filter(&mut qb, filter);
        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);
        qb.build_query_as::<AuditLog>().fetch_all(&self.pool).await
    }

    pub async fn count(&self, filter: &AuditFilter) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM audit_logs WHERE 1 = 1");
        Self::apply_filter(&mut qb, filter);
        let row: (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    fn apply_filter(qb: &mut QueryBuilder<'_, sqlx::MySql>, filter: &AuditFilter) {
        if let Some(action) = &filter.action {
            qb.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(actor_type) = &filter.actor_type {
            qb.push(" AND actor_type = ").push_bind(actor_type.clone());
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.to_string());
        }
        if let Some(client_id) = &filter.client_id {
            qb.push(" AND client_id = ").push_bind(client_id.clone());
        }
        if let Some(resource_type) = &filter.resource_type {
            qb.push(" AND resource_type = ").push_bind(resource_type.clone());
        }
        if let Some(success) = filter.success {
            qb.push(" AND success = ").push_bind(success);
        }
        if let Some(from) = filter.from {
            qb.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND timestamp <= ").push_bind(to);
        }
    }

    /// Per-action totals and failure counts over a window.
    pub async fn statistics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActionCount>, sqlx::Error> {
        let mut qb = QueryBuilder::new(
            "SELECT action, COUNT(*) AS total, \
             COUNT(CASE WHEN success = FALSE THEN 1 END) AS failures \
             FROM audit_logs WHERE 1 = 1",
        );
        if let Some(from) = from {
            qb.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = to {
            qb.push(" AND timestamp <= ").push_bind(to);
        }
        qb.push(" GROUP BY action ORDER BY total DESC");

        let rows: Vec<(String, i64, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(action, total, failures)| ActionCount {
                action,
                total,
                failures,
            })
            .collect())
    }

    /// Security-relevant events: every failure plus lockouts, revocations and
    /// refresh-reuse detections.
    pub async fn security_events(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE success = FALSE
               OR action IN ('user.locked', 'user.login_failed',
                             'oauth.token_revoked', 'oauth.refresh_reuse_detected',
                             'oauth.session_revoked')
            ORDER BY timestamp DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Roll-up for compliance reports: totals, failures, distinct actors.
    pub async fn compliance_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(i64, i64, i64), sqlx::Error> {
        let row: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(CASE WHEN success = FALSE THEN 1 END),
                   COUNT(DISTINCT actor_id)
            FROM audit_logs
            WHERE timestamp >= ? AND timestamp <= ?
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
