use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Record that a user authorized a client for a set of scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ConsentGrantRow {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub scopes: serde_json::Value,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<ConsentGrantRow> for ConsentGrant {
    fn from(row: ConsentGrantRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
            client_id: Uuid::parse_str(&row.client_id).unwrap_or_default(),
            scopes: serde_json::from_value(row.scopes).unwrap_or_default(),
            granted_at: row.granted_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for ConsentGrant {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(ConsentGrant::from(ConsentGrantRow::from_row(row)?))
    }
}

impl ConsentGrant {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.map(|at| at > now).unwrap_or(true)
    }

    /// A grant lets the consent step be skipped only when it covers every
    /// requested scope.
    pub fn covers(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.scopes.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(scopes: &[&str]) -> ConsentGrant {
        ConsentGrant {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            granted_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
        }
    }

    #[test]
    fn covering_is_subset_check() {
        let g = grant(&["openid", "profile", "email"]);
        assert!(g.covers(&["openid".into()]));
        assert!(g.covers(&["openid".into(), "email".into()]));
        assert!(!g.covers(&["openid".into(), "admin".into()]));
        assert!(g.covers(&[]));
    }

    #[test]
    fn revoked_or_expired_grants_are_invalid() {
        let now = Utc::now();
        let mut g = grant(&["openid"]);
        assert!(g.is_valid(now));
        g.revoked_at = Some(now);
        assert!(!g.is_valid(now));

        let mut g = grant(&["openid"]);
        g.expires_at = Some(now - Duration::days(1));
        assert!(!g.is_valid(now));
    }
}
