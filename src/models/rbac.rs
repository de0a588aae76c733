use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RoleRow {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            name: row.name,
            display_name: row.display_name,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for Role {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Role::from(RoleRow::from_row(row)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Api,
    Menu,
    Data,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Api => "api",
            PermissionType::Menu => "menu",
            PermissionType::Data => "data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "api" => Some(PermissionType::Api),
            "menu" => Some(PermissionType::Menu),
            "data" => Some(PermissionType::Data),
            _ => None,
        }
    }
}

/// A coded permission, e.g. `users:create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub permission_type: PermissionType,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PermissionRow {
    pub id: String,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub permission_type: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            name: row.name,
            resource: row.resource,
            action: row.action,
            permission_type: PermissionType::parse(&row.permission_type)
                .unwrap_or(PermissionType::Api),
            display_name: row.display_name,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for Permission {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Permission::from(PermissionRow::from_row(row)?))
    }
}

/// A direct permission grant to a user, unique per
/// (user, resource, permission).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPermission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resource: String,
    pub permission_id: Uuid,
    pub granted_by: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserPermissionRow {
    pub id: String,
    pub user_id: String,
    pub resource: String,
    pub permission_id: String,
    pub granted_by: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserPermissionRow> for UserPermission {
    fn from(row: UserPermissionRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            resource: row.resource,
            permission_id: Uuid::parse_str(&row.permission_id).unwrap_or_default(),
            granted_by: row.granted_by.and_then(|id| Uuid::parse_str(&id).ok()),
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for UserPermission {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(UserPermission::from(UserPermissionRow::from_row(row)?))
    }
}

impl UserPermission {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn permission_type_parse() {
        assert_eq!(PermissionType::parse("api"), Some(PermissionType::Api));
        assert_eq!(PermissionType::parse("menu"), Some(PermissionType::Menu));
        assert_eq!(PermissionType::parse("data"), Some(PermissionType::Data));
        assert_eq!(PermissionType::parse("other"), None);
    }

    #[test]
    fn direct_grant_expiry() {
        let now = Utc::now();
        let mut grant = UserPermission {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            resource: "users".into(),
            permission_id: Uuid::new_v4(),
            granted_by: None,
            expires_at: None,
            created_at: now,
        };
        assert!(!grant.is_expired(now));
        grant.expires_at = Some(now - Duration::minutes(1));
        assert!(grant.is_expired(now));
        grant.expires_at = Some(now + Duration::minutes(1));
        assert!(!grant.is_expired(now));
    }
}
