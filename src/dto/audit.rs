use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::repositories::AuditFilter;

/// GET /audit-logs query parameters.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub actor_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub client_id: Option<String>,
    pub resource_type: Option<String>,
    pub success: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl AuditQuery {
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            action: self.action.clone(),
            actor_type: self.actor_type.clone(),
            user_id: self.user_id,
            client_id: self.client_id.clone(),
            resource_type: self.resource_type.clone(),
            success: self.success,
            from: self.from,
            to: self.to,
        }
    }
}

/// Time-window query for statistics and compliance reports.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
