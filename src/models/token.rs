use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted record of an issued access token. The JWT itself is never
/// stored; `token_hash` is the SHA-256 of the compact form.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub id: Uuid,
    pub jti: String,
    pub token_hash: String,
    pub user_id: Option<Uuid>,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    /// `jti` of the refresh token issued alongside, when there was one.
    pub refresh_jti: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AccessTokenRow {
    pub id: String,
    pub jti: String,
    pub token_hash: String,
    pub user_id: Option<String>,
    pub client_id: String,
    pub scopes: serde_json::Value,
    pub refresh_jti: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<AccessTokenRow> for AccessToken {
    fn from(row: AccessTokenRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            jti: row.jti,
            token_hash: row.token_hash,
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            refresh_jti: row.refresh_jti,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            revoked: row.revoked,
            revoked_at: row.revoked_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for AccessToken {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(AccessToken::from(AccessTokenRow::from_row(row)?))
    }
}

impl AccessToken {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// Persisted refresh token. Rotation links rows through `parent_jti`;
/// `chain_jti` names the first token of the rotation chain so a reuse can
/// revoke the whole lineage in one statement.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub jti: String,
    pub token_hash: String,
    pub chain_jti: String,
    pub parent_jti: Option<String>,
    pub user_id: Option<Uuid>,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRow {
    pub id: String,
    pub jti: String,
    pub token_hash: String,
    pub chain_jti: String,
    pub parent_jti: Option<String>,
    pub user_id: Option<String>,
    pub client_id: String,
    pub scopes: serde_json::Value,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            jti: row.jti,
            token_hash: row.token_hash,
            chain_jti: row.chain_jti,
            parent_jti: row.parent_jti,
            user_id: row.user_id.and_then(|id| Uuid::parse_str(&id).ok()),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            revoked_at: row.revoked_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for RefreshToken {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(RefreshToken::from(RefreshTokenRow::from_row(row)?))
    }
}

impl RefreshToken {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

/// A blacklisted `jti`. Any token carrying it is inactive regardless of other
/// state; rows may be purged once `expires_at` passes.
#[derive(Debug, Clone, FromRow)]
pub struct BlacklistEntry {
    pub jti: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub mod blacklist_type {
    pub const ACCESS: &str = "access_token";
    pub const REFRESH: &str = "refresh_token";
    pub const CLIENT_ASSERTION: &str = "client_assertion";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn access_token_active_window() {
        let now = Utc::now();
        let mut token = AccessToken {
            id: Uuid::new_v4(),
            jti: "j".into(),
            token_hash: "h".into(),
            user_id: Some(Uuid::new_v4()),
            client_id: Uuid::new_v4(),
            scopes: vec![],
            refresh_jti: None,
            issued_at: now,
            expires_at: now + Duration::hours(1),
            revoked: false,
            revoked_at: None,
        };
        assert!(token.is_active(now));
        assert!(!token.is_active(now + Duration::hours(2)));
        token.revoked = true;
        assert!(!token.is_active(now));
    }

    #[test]
    fn refresh_token_active_window() {
        let now = Utc::now();
        let mut token = RefreshToken {
            id: Uuid::new_v4(),
            jti: "j".into(),
            token_hash: "h".into(),
            chain_jti: "j".into(),
            parent_jti: None,
            user_id: Some(Uuid::new_v4()),
            client_id: Uuid::new_v4(),
            scopes: vec![],
            issued_at: now,
            expires_at: now + Duration::days(30),
            is_revoked: false,
            revoked_at: None,
        };
        assert!(token.is_active(now));
        token.is_revoked = true;
        assert!(!token.is_active(now));
    }
}
