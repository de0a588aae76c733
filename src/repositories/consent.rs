use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::ConsentGrant;

/// Repository for stored consent grants, one row per (user, client).
#[derive(Clone)]
pub struct ConsentRepository {
    pool: MySqlPool,
}

impl ConsentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Record consent. An existing grant for the pair is replaced with the
    /// union of its scopes and the newly approved ones, clearing a prior
    /// revocation.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        scopes: &[String],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        let existing = self.find(user_id, client_id).await?;
        let merged: Vec<String> = match &existing {
            Some(grant) if grant.revoked_at.is_none() => {
                let mut all = grant.scopes.clone();
                for s in scopes {
                    if !all.contains(s) {
                        all.push(s.clone());
                    }
                }
                all
            }
            _ => scopes.to_vec(),
        };

        sqlx::query(
            r#"
            INSERT INTO consent_grants (id, user_id, client_id, scopes, granted_at, expires_at, revoked_at)
            VALUES (?, ?, ?, ?, NOW(), ?, NULL)
            ON DUPLICATE KEY UPDATE
                scopes = VALUES(scopes),
                granted_at = VALUES(granted_at),
                expires_at = VALUES(expires_at),
                revoked_at = NULL
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .bind(serde_json::to_value(&merged).unwrap_or_default())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(
        &self,
        user_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<ConsentGrant>, sqlx::Error> {
        sqlx::query_as::<_, ConsentGrant>(
            "SELECT * FROM consent_grants WHERE user_id = ? AND client_id = ?",
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn revoke(&self, user_id: Uuid, client_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE consent_grants SET revoked_at = NOW()
            WHERE user_id = ? AND client_id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(user_id.to_string())
        .bind(client_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
