use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::AuthorizationCode;

/// Repository for single-use authorization codes.
#[derive(Clone)]
pub struct AuthorizationCodeRepository {
    pool: MySqlPool,
}

impl AuthorizationCodeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        code_hash: &str,
        client_id: Uuid,
        user_id: Uuid,
        redirect_uri: &str,
        scopes: &[String],
        nonce: Option<&str>,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO authorization_codes
            (id, code_hash, client_id, user_id, redirect_uri, scopes, nonce,
             code_challenge, code_challenge_method, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(code_hash)
        .bind(client_id.to_string())
        .bind(user_id.to_string())
        .bind(redirect_uri)
        .bind(serde_json::to_value(scopes).unwrap_or_default())
        .bind(nonce)
        .bind(code_challenge)
        .bind(code_challenge_method)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_hash(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, sqlx::Error> {
        sqlx::query_as::<_, AuthorizationCode>(
            "SELECT * FROM authorization_codes WHERE code_hash = ?",
        )
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark a code used. The conditional update is the linearization point for
    /// single-use: exactly one caller sees `true`.
    pub async fn consume(&self, code_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE authorization_codes
            SET used = TRUE, used_at = NOW()
            WHERE code_hash = ? AND used = FALSE
            "#,
        )
        .bind(code_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
