use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

/// Repository for fixed-window rate-limit counters keyed by
/// (identifier, endpoint).
#[derive(Clone)]
pub struct RateLimitRepository {
    pool: MySqlPool,
}

impl RateLimitRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Atomically bump the counter for the current window and return the new
    /// count. A row whose window has lapsed is restarted at 1.
    pub async fn increment(
        &self,
        identifier: &str,
        endpoint: &str,
        window_seconds: i64,
    ) -> Result<i32, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO rate_limits (identifier, endpoint, window_start, request_count)
            VALUES (?, ?, NOW(), 1)
            ON DUPLICATE KEY UPDATE
                request_count = IF(window_start < NOW() - INTERVAL ? SECOND, 1, request_count + 1),
                window_start = IF(window_start < NOW() - INTERVAL ? SECOND, NOW(), window_start)
            "#,
        )
        .bind(identifier)
        .bind(endpoint)
        .bind(window_seconds)
        .bind(window_seconds)
        .execute(&self.pool)
        .await?;

        sqlx::query_scalar::<_, i32>(
            "SELECT request_count FROM rate_limits WHERE identifier = ? AND endpoint = ?",
        )
        .bind(identifier)
        .bind(endpoint)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn window_start(
        &self,
        identifier: &str,
        endpoint: &str,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT window_start FROM rate_limits WHERE identifier = ? AND endpoint = ?",
        )
        .bind(identifier)
        .bind(endpoint)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn reset(&self, identifier: &str, endpoint: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM rate_limits WHERE identifier = ? AND endpoint = ?")
            .bind(identifier)
            .bind(endpoint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop rows whose window lapsed long ago.
    pub async fn delete_stale(&self, older_than_seconds: i64) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM rate_limits WHERE window_start < NOW() - INTERVAL ? SECOND")
                .bind(older_than_seconds)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
