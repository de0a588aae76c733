use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A human principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub must_change_password: bool,
    pub failed_login_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failed_login: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub must_change_password: bool,
    pub failed_login_attempts: i32,
    pub last_failed_login: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            is_active: row.is_active,
            email_verified: row.email_verified,
            must_change_password: row.must_change_password,
            failed_login_attempts: row.failed_login_attempts,
            last_failed_login: row.last_failed_login,
            locked_until: row.locked_until,
            created_by: row.created_by.and_then(|id| Uuid::parse_str(&id).ok()),
            updated_by: row.updated_by.and_then(|id| Uuid::parse_str(&id).ok()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for User {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(User::from(UserRow::from_row(row)?))
    }
}

impl User {
    /// Whether the lockout window is currently in effect.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| until > now).unwrap_or(false)
    }

    /// A user authenticates only when active and not locked.
    pub fn can_authenticate(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_locked(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$2b$12$hash".into(),
            display_name: None,
            is_active: true,
            email_verified: true,
            must_change_password: false,
            failed_login_attempts: 0,
            last_failed_login: None,
            locked_until: None,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_unlocked_user_can_authenticate() {
        let now = Utc::now();
        assert!(user().can_authenticate(now));
    }

    #[test]
    fn inactive_user_cannot_authenticate() {
        let mut u = user();
        u.is_active = false;
        assert!(!u.can_authenticate(Utc::now()));
    }

    #[test]
    fn lock_expires() {
        let now = Utc::now();
        let mut u = user();
        u.locked_until = Some(now + Duration::minutes(10));
        assert!(u.is_locked(now));
        assert!(!u.can_authenticate(now));
        // Past lock no longer applies.
        u.locked_until = Some(now - Duration::minutes(1));
        assert!(!u.is_locked(now));
        assert!(u.can_authenticate(now));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(user()).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
