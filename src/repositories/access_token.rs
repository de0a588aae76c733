use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::AccessToken;

/// Repository for issued access tokens. All mutation goes by primary key,
/// unique hash or unique jti.
#[derive(Clone)]
pub struct AccessTokenRepository {
    pool: MySqlPool,
}

impl AccessTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        jti: &str,
        token_hash: &str,
        user_id: Option<Uuid>,
        client_id: Uuid,
        scopes: &[String],
        refresh_jti: Option<&str>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO access_tokens
            (id, jti, token_hash, user_id, client_id, scopes, refresh_jti, issued_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(jti)
        .bind(token_hash)
        .bind(user_id.map(|u| u.to_string()))
        .bind(client_id.to_string())
        .bind(serde_json::to_value(scopes).unwrap_or_default())
        .bind(refresh_jti)
        .bind(issued_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AccessToken>, sqlx::Error> {
        sqlx::query_as::<_, AccessToken>("SELECT * FROM access_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_jti(&self, jti: &str) -> Result<Option<AccessToken>, sqlx::Error> {
        sqlx::query_as::<_, AccessToken>("SELECT * FROM access_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn revoke_by_jti(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE access_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE jti = ? AND revoked = FALSE
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every access token minted alongside any refresh token of a
    /// rotation chain.
    pub async fn revoke_by_refresh_chain(&self, chain_jti: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE access_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE revoked = FALSE
              AND refresh_jti IN (SELECT jti FROM refresh_tokens WHERE chain_jti = ?)
            "#,
        )
        .bind(chain_jti)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Cascading revocation for a revoked refresh token: every access token of
    /// the same user+client issued at or after the refresh token.
    pub async fn revoke_issued_since(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE access_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE user_id = ? AND client_id = ? AND issued_at >= ? AND revoked = FALSE
            "#,
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .bind(since)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn revoke_all_for_client(&self, client_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE access_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE client_id = ? AND revoked = FALSE
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
            UPDATE access_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE user_id = ? AND revoked = FALSE
            "#,
        )
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
