use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

/// Repository for the jti blacklist. Inserts are idempotent; duplicate jtis
/// are ignored.
#[derive(Clone)]
pub struct BlacklistRepository {
    pool: MySqlPool,
}

impl BlacklistRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        jti: &str,
        token_type: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT IGNORE INTO token_blacklist (jti, token_type, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(jti)
        .bind(token_type)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn contains(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM token_blacklist WHERE jti = ?",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Insert a jti only if it was not present; used for client-assertion
    /// replay protection. Returns `false` when the jti was already seen.
    pub async fn insert_if_absent(
        &self,
        jti: &str,
        token_type: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO token_blacklist (jti, token_type, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(jti)
        .bind(token_type)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
