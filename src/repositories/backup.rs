use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::SystemBackup;

/// Repository for backup metadata records.
#[derive(Clone)]
pub struct BackupRepository {
    pool: MySqlPool,
}

impl BackupRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: Uuid,
        status: &str,
        entity_counts: serde_json::Value,
        note: Option<&str>,
        created_by: Option<Uuid>,
    ) -> Result<SystemBackup, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO system_backups (id, status, entity_counts, note, created_by)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(status)
        .bind(entity_counts)
        .bind(note)
        .bind(created_by.map(|u| u.to_string()))
        .execute(&self.pool)
        .await?;
        self.find_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<SystemBackup>, sqlx::Error> {
        sqlx::query_as::<_, SystemBackup>("SELECT * FROM system_backups WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(&self) -> Result<Vec<SystemBackup>, sqlx::Error> {
        sqlx::query_as::<_, SystemBackup>(
            "SELECT * FROM system_backups ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn mark_restored(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE system_backups SET status = 'restored', restored_at = NOW() WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Current row counts of the primary entity tables.
    pub async fn entity_counts(&self) -> Result<serde_json::Value, sqlx::Error> {
        let users = self.count_table("users").await?;
        let clients = self.count_table("clients").await?;
        let access_tokens = self.count_table("access_tokens").await?;
        let refresh_tokens = self.count_table("refresh_tokens").await?;
        let roles = self.count_table("roles").await?;
        let permissions = self.count_table("permissions").await?;
        let audit_logs = self.count_table("audit_logs").await?;
        Ok(serde_json::json!({
            "users": users,
            "clients": clients,
            "access_tokens": access_tokens,
            "refresh_tokens": refresh_tokens,
            "roles": roles,
            "permissions": permissions,
            "audit_logs": audit_logs,
        }))
    }

    async fn count_table(&self, table: &str) -> Result<i64, sqlx::Error> {
        // Table names come from the fixed list above, never from input.
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
    }
}
