use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::{Permission, UserPermission};

/// Repository for the permission registry and direct user grants.
#[derive(Clone)]
pub struct PermissionRepository {
    pool: MySqlPool,
}

impl PermissionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        id: Uuid,
        name: &str,
        resource: &str,
        action: &str,
        permission_type: &str,
        display_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Permission, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO permissions
            (id, name, resource, action, permission_type, display_name, description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(resource)
        .bind(action)
        .bind(permission_type)
        .bind(display_name)
        .bind(description)
        .execute(&self.pool)
        .await?;
        self.find_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Permission>, sqlx::Error> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Permission>, sqlx::Error> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(&self) -> Result<Vec<Permission>, sqlx::Error> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY name")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn update(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        description: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE permissions SET
                display_name = COALESCE(?, display_name),
                description = COALESCE(?, description),
                is_active = COALESCE(?, is_active)
            WHERE id = ?
            "#,
        )
        .bind(display_name)
        .bind(description)
        .bind(is_active)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The effective permission set for a user: permissions reachable through
    /// any active role, plus active non-expired direct grants, restricted to
    /// active permissions throughout.
    pub async fn effective_for_user(&self, user_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.name FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            JOIN roles r ON r.id = rp.role_id
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ? AND r.is_active = TRUE AND p.is_active = TRUE
            UNION
            SELECT DISTINCT p.name FROM permissions p
            JOIN user_permissions up ON up.permission_id = p.id
            WHERE up.user_id = ? AND p.is_active = TRUE
              AND (up.expires_at IS NULL OR up.expires_at > NOW())
            "#,
        )
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
    }

    /// Create a direct grant; the composite key (user, resource, permission)
    /// is unique, duplicates report `false`.
    pub async fn grant_to_user(
        &self,
        user_id: Uuid,
        resource: &str,
        permission_id: Uuid,
        granted_by: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO user_permissions
            (id, user_id, resource, permission_id, granted_by, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(resource)
        .bind(permission_id.to_string())
        .bind(granted_by.map(|u| u.to_string()))
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn revoke_from_user(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM user_permissions WHERE user_id = ? AND permission_id = ?",
        )
        .bind(user_id.to_string())
        .bind(permission_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_direct_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserPermission>, sqlx::Error> {
        sqlx::query_as::<_, UserPermission>(
            "SELECT * FROM user_permissions WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
    }
}
