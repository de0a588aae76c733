use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted single-use authorization code. Only the SHA-256 hash of the
/// code value is stored.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub id: Uuid,
    pub code_hash: String,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationCodeRow {
    pub id: String,
    pub code_hash: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: serde_json::Value,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<AuthorizationCodeRow> for AuthorizationCode {
    fn from(row: AuthorizationCodeRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            code_hash: row.code_hash,
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            redirect_uri: row.redirect_uri,
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            nonce: row.nonce,
            code_challenge: row.code_challenge,
            code_challenge_method: row.code_challenge_method,
            expires_at: row.expires_at,
            used: row.used,
            used_at: row.used_at,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AuthorizationCode {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(AuthorizationCode::from(AuthorizationCodeRow::from_row(row)?))
    }
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_boundary() {
        let now = Utc::now();
        let code = AuthorizationCode {
            id: Uuid::new_v4(),
            code_hash: "h".into(),
            client_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            redirect_uri: "https://c.test/cb".into(),
            scopes: vec!["openid".into()],
            nonce: None,
            code_challenge: None,
            code_challenge_method: None,
            expires_at: now + Duration::minutes(10),
            used: false,
            used_at: None,
            created_at: now,
        };
        assert!(!code.is_expired(now));
        assert!(code.is_expired(now + Duration::minutes(10)));
        assert!(code.is_expired(now + Duration::minutes(11)));
    }
}
