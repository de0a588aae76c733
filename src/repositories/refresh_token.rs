use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::RefreshToken;

/// Repository for refresh tokens and their rotation chains.
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: MySqlPool,
}

impl RefreshTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        jti: &str,
        token_hash: &str,
        chain_jti: &str,
        parent_jti: Option<&str>,
        user_id: Option<Uuid>,
        client_id: Uuid,
        scopes: &[String],
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
            (id, jti, token_hash, chain_jti, parent_jti, user_id, client_id, scopes, issued_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(jti)
        .bind(token_hash)
        .bind(chain_jti)
        .bind(parent_jti)
        .bind(user_id.map(|u| u.to_string()))
        .bind(client_id.to_string())
        .bind(serde_json::to_value(scopes).unwrap_or_default())
        .bind(issued_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_jti(&self, jti: &str) -> Result<Option<RefreshToken>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
    }

    /// One-shot rotation mark. The conditional update is the linearization
    /// point: exactly one exchange of a given token sees `true`, a second
    /// presentation is a reuse.
    pub async fn rotate(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE jti = ? AND is_revoked = FALSE
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Revoke every member of a rotation chain.
    pub async fn revoke_chain(&self, chain_jti: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE chain_jti = ? AND is_revoked = FALSE
            "#,
        )
        .bind(chain_jti)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn revoke_all_for_client(&self, client_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE client_id = ? AND is_revoked = FALSE
            "#,
        )
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = NOW()
            WHERE user_id = ? AND is_revoked = FALSE
            "#,
        )
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Active sessions for the self-service listing: one per live refresh
    /// token.
    pub async fn list_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshToken>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE user_id = ? AND is_revoked = FALSE AND expires_at > NOW()
            ORDER BY issued_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
    }

    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
