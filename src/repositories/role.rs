use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::{Permission, Role};

/// Repository for roles, role-permission links and user-role assignments.
#[derive(Clone)]
pub struct RoleRepository {
    pool: MySqlPool,
}

impl RoleRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: Uuid,
        name: &str,
        display_name: &str,
    ) -> Result<Role, sqlx::Error> {
        sqlx::query("INSERT INTO roles (id, name, display_name) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(name)
            .bind(display_name)
            .execute(&self.pool)
            .await?;
        self.find_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>, sqlx::Error> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>, sqlx::Error> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(&self) -> Result<Vec<Role>, sqlx::Error> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn update(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE roles SET
                display_name = COALESCE(?, display_name),
                is_active = COALESCE(?, is_active)
            WHERE id = ?
            "#,
        )
        .bind(display_name)
        .bind(is_active)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn assign_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)",
        )
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn remove_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?",
        )
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>, sqlx::Error> {
        sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = ?
            ORDER BY p.name
            "#,
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await
    }

    pub async fn assign_to_user(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("INSERT IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(user_id.to_string())
                .bind(role_id.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn remove_from_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
            .bind(user_id.to_string())
            .bind(role_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, sqlx::Error> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
            ORDER BY r.name
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
    }
}
