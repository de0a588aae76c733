use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    Client,
    System,
    Unknown,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Client => "client",
            ActorType::System => "system",
            ActorType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => ActorType::User,
            "client" => ActorType::Client,
            "system" => ActorType::System,
            _ => ActorType::Unknown,
        }
    }
}

/// Stable action codes recorded in the audit trail.
pub mod actions {
    pub const USER_REGISTERED: &str = "user.registered";
    pub const USER_CREATED: &str = "user.created";
    pub const USER_UPDATED: &str = "user.updated";
    pub const USER_DELETED: &str = "user.deleted";
    pub const USER_ACTIVATED: &str = "user.activated";
    pub const USER_DEACTIVATED: &str = "user.deactivated";
    pub const USER_LOCKED: &str = "user.locked";
    pub const USER_UNLOCKED: &str = "user.unlocked";
    pub const USER_LOGIN: &str = "user.login";
    pub const USER_LOGIN_FAILED: &str = "user.login_failed";
    pub const USER_ROLE_ASSIGNED: &str = "user.role_assigned";
    pub const USER_ROLE_REMOVED: &str = "user.role_removed";
    pub const USER_PERMISSION_GRANTED: &str = "user.permission_granted";
    pub const USER_PERMISSION_REVOKED: &str = "user.permission_revoked";

    pub const CLIENT_CREATED: &str = "client.created";
    pub const CLIENT_UPDATED: &str = "client.updated";
    pub const CLIENT_DELETED: &str = "client.deleted";
    pub const CLIENT_SECRET_ROTATED: &str = "client.secret_rotated";

    pub const ROLE_CREATED: &str = "role.created";
    pub const ROLE_UPDATED: &str = "role.updated";
    pub const ROLE_DELETED: &str = "role.deleted";
    pub const ROLE_PERMISSION_ASSIGNED: &str = "role.permission_assigned";
    pub const ROLE_PERMISSION_REMOVED: &str = "role.permission_removed";

    pub const PERMISSION_CREATED: &str = "permission.created";
    pub const PERMISSION_UPDATED: &str = "permission.updated";
    pub const PERMISSION_DELETED: &str = "permission.deleted";

    pub const SCOPE_CREATED: &str = "scope.created";
    pub const SCOPE_UPDATED: &str = "scope.updated";
    pub const SCOPE_DELETED: &str = "scope.deleted";

    pub const CODE_ISSUED: &str = "oauth.code_issued";
    pub const CONSENT_GRANTED: &str = "oauth.consent_granted";
    pub const CONSENT_DENIED: &str = "oauth.consent_denied";
    pub const TOKEN_ISSUED: &str = "oauth.token_issued";
    pub const TOKEN_REFRESHED: &str = "oauth.token_refreshed";
    pub const REFRESH_REUSE_DETECTED: &str = "oauth.refresh_reuse_detected";
    pub const TOKEN_REVOKED: &str = "oauth.token_revoked";
    pub const SESSION_REVOKED: &str = "oauth.session_revoked";

    pub const BACKUP_CREATED: &str = "system.backup_created";
    pub const BACKUP_RESTORED: &str = "system.backup_restored";
}

/// One append-only security event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub client_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub actor_type: String,
    pub actor_id: Option<String>,
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl From<AuditLogRow> for AuditLog {
    fn from(row: AuditLogRow) -> Self {
        Self {
            id: row.id,
            timestamp: row.timestamp,
            actor_type: ActorType::parse(&row.actor_type),
            actor_id: row.actor_id,
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            client_id: row.client_id,
            action: row.action,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            success: row.success,
            error_message: row.error_message,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            metadata: row.metadata,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AuditLog {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(AuditLog::from(AuditLogRow::from_row(row)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_type_roundtrip() {
        for t in [ActorType::User, ActorType::Client, ActorType::System] {
            assert_eq!(ActorType::parse(t.as_str()), t);
        }
        assert_eq!(ActorType::parse("martian"), ActorType::Unknown);
    }
}
