use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::{ActorType, AuditLog};
use crate::repositories::{ActionCount, AuditFilter, AuditLogRepository};

/// One security event on its way into the audit trail.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub client_id: Option<String>,
    pub action: &'static str,
    pub resource_type: &'static str,
    pub resource_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(actor_type: ActorType, action: &'static str, resource_type: &'static str) -> Self {
        Self {
            actor_type,
            actor_id: None,
            user_id: None,
            client_id: None,
            action,
            resource_type,
            resource_id: None,
            success: true,
            error_message: None,
            ip_address: None,
            user_agent: None,
            metadata: None,
        }
    }

    pub fn by_user(user_id: Uuid, action: &'static str, resource_type: &'static str) -> Self {
        let mut event = Self::new(ActorType::User, action, resource_type);
        event.actor_id = Some(user_id.to_string());
        event.user_id = Some(user_id);
        event
    }

    pub fn by_client(client_id: &str, action: &'static str, resource_type: &'static str) -> Self {
        let mut event = Self::new(ActorType::Client, action, resource_type);
        event.actor_id = Some(client_id.to_string());
        event.client_id = Some(client_id.to_string());
        event
    }

    pub fn by_system(action: &'static str, resource_type: &'static str) -> Self {
        Self::new(ActorType::System, action, resource_type)
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn failure(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach the caller's network identity (X-Forwarded-For aware).
    pub fn from_addr(mut self, ip: Option<&str>, user_agent: Option<&str>) -> Self {
        self.ip_address = ip.map(String::from);
        self.user_agent = user_agent.map(String::from);
        self
    }
}

/// The audit sink. Writes are synchronous on the request path but best-effort:
/// a failed write is logged and never turns a successful operation into an
/// error for the caller.
#[derive(Clone)]
pub struct AuditService {
    repo: AuditLogRepository,
}

impl AuditService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            repo: AuditLogRepository::new(pool),
        }
    }

    pub async fn record(&self, event: AuditEvent) {
        let action = event.action;
        if let Err(e) = self
            .repo
            .create(
                event.actor_type.as_str(),
                event.actor_id.as_deref(),
                event.user_id,
                event.client_id.as_deref(),
                event.action,
                event.resource_type,
                event.resource_id.as_deref(),
                event.success,
                event.error_message.as_deref(),
                event.ip_address.as_deref(),
                event.user_agent.as_deref(),
                event.metadata,
            )
            .await
        {
            tracing::error!(action = action, error = %e, "audit write failed");
            eprintln!("audit write failed for {}: {}", action, e);
        }
    }

    pub async fn list(
        &self,
        filter: &AuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), sqlx::Error> {
        let items = self.repo.list(filter, limit, offset).await?;
        let total = self.repo.count(filter).await?;
        Ok((items, total))
    }

    pub async fn get(&self, id: i64) -> Result<Option<AuditLog>, sqlx::Error> {
        self.repo.find_by_id(id).await
    }

    pub async fn statistics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActionCount>, sqlx::Error> {
        self.repo.statistics(from, to).await
    }

    pub async fn security_events(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        self.repo.security_events(limit, offset).await
    }

    pub async fn compliance_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(i64, i64, i64), sqlx::Error> {
        self.repo.compliance_summary(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::actions;

    #[test]
    fn builder_sets_actor_fields() {
        let user_id = Uuid::new_v4();
        let event = AuditEvent::by_user(user_id, actions::USER_UPDATED, "user")
            .resource(user_id.to_string())
            .metadata(serde_json::json!({"field": "email"}));
        assert_eq!(event.actor_type, ActorType::User);
        assert_eq!(event.actor_id, Some(user_id.to_string()));
        assert_eq!(event.user_id, Some(user_id));
        assert!(event.success);
        assert!(event.error_message.is_none());
    }

    #[test]
    fn failure_captures_message() {
        let event = AuditEvent::by_client("web-app", actions::TOKEN_ISSUED, "token")
            .failure("invalid_grant");
        assert!(!event.success);
        assert_eq!(event.error_message.as_deref(), Some("invalid_grant"));
        assert_eq!(event.client_id.as_deref(), Some("web-app"));
    }

    #[test]
    fn from_addr_copies_network_identity() {
        let event = AuditEvent::by_system(actions::BACKUP_CREATED, "backup")
            .from_addr(Some("203.0.113.9"), Some("curl/8.0"));
        assert_eq!(event.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(event.user_agent.as_deref(), Some("curl/8.0"));
    }
}
