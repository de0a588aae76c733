use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::RequestMeta;
use crate::models::{actions, User};
use crate::repositories::{
    AccessTokenRepository, RefreshTokenRepository, UserRepository,
};
use crate::services::audit::{AuditEvent, AuditService};
use crate::utils::password::{hash_password, validate_password_strength, verify_password};

/// Lockout policy: N consecutive failures inside the window lock the account
/// for the configured backoff.
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    pub max_failed_attempts: i32,
    pub lockout_duration_minutes: i64,
    pub window_minutes: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration_minutes: 15,
            window_minutes: 30,
        }
    }
}

fn username_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{2,63}$").unwrap())
}

fn email_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username_regex().is_match(username) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "username must be 3-64 characters of letters, digits, '.', '_' or '-'".to_string(),
        ))
    }
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if email_regex().is_match(email) {
        Ok(())
    } else {
        Err(ApiError::Validation("invalid email address".to_string()))
    }
}

/// User management and password authentication.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    access_repo: AccessTokenRepository,
    refresh_repo: RefreshTokenRepository,
    audit: AuditService,
    lockout: LockoutConfig,
}

impl UserService {
    pub fn new(pool: MySqlPool, lockout: LockoutConfig) -> Self {
        Self {
            user_repo: UserRepository::new(pool.clone()),
            access_repo: AccessTokenRepository::new(pool.clone()),
            refresh_repo: RefreshTokenRepository::new(pool.clone()),
            audit: AuditService::new(pool),
            lockout,
        }
    }

    /// Create a user, either by an admin or through public registration.
    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password: &str,
        display_name: Option<&str>,
        created_by: Option<Uuid>,
        meta: &RequestMeta,
    ) -> Result<User, ApiError> {
        validate_username(username)?;
        let email = email.to_lowercase();
        validate_email(&email)?;
        validate_password_strength(password)?;

        if self.user_repo.find_by_username(username).await?.is_some() {
            return Err(ApiError::Conflict("username already exists".to_string()));
        }
        if self.user_repo.find_by_email(&email).await?.is_some() {
            return Err(ApiError::Conflict("email already exists".to_string()));
        }

        let password_hash = hash_password(password)?;
        let user = self
            .user_repo
            .create(
                Uuid::new_v4(),
                username,
                &email,
                &password_hash,
                display_name,
                false,
                created_by,
            )
            .await?;

        let event = match created_by {
            Some(actor) => AuditEvent::by_user(actor, actions::USER_CREATED, "user"),
            None => AuditEvent::by_user(user.id, actions::USER_REGISTERED, "user"),
        };
        self.audit
            .record(
                event
                    .resource(user.id.to_string())
                    .metadata(serde_json::json!({ "username": user.username }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;

        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, ApiError> {
        self.user_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("user not found".to_string()))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), ApiError> {
        let users = self.user_repo.list(limit, offset).await?;
        let total = self.user_repo.count().await?;
        Ok((users, total))
    }

    pub async fn update(
        &self,
        id: Uuid,
        email: Option<&str>,
        display_name: Option<&str>,
        email_verified: Option<bool>,
        must_change_password: Option<bool>,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<User, ApiError> {
        let user = self.get(id).await?;
        let email = match email {
            Some(e) => {
                let lowered = e.to_lowercase();
                validate_email(&lowered)?;
                if lowered != user.email {
                    if self.user_repo.find_by_email(&lowered).await?.is_some() {
                        return Err(ApiError::Conflict("email already exists".to_string()));
                    }
                }
                Some(lowered)
            }
            None => None,
        };

        self.user_repo
            .update_profile(
                id,
                email.as_deref(),
                display_name,
                email_verified,
                must_change_password,
                Some(actor),
            )
            .await?;

        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_UPDATED, "user")
                    .resource(id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;

        self.get(id).await
    }

    pub async fn change_password(
        &self,
        id: Uuid,
        new_password: &str,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        validate_password_strength(new_password)?;
        self.get(id).await?;
        let hash = hash_password(new_password)?;
        self.user_repo.set_password(id, &hash).await?;
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_UPDATED, "user")
                    .resource(id.to_string())
                    .metadata(serde_json::json!({ "field": "password" }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    /// Delete a user: tokens, codes, sessions and direct grants cascade with
    /// the row; audit rows survive with a nulled user link.
    pub async fn delete(&self, id: Uuid, actor: Uuid, meta: &RequestMeta) -> Result<(), ApiError> {
        if !self.user_repo.delete(id).await? {
            return Err(ApiError::NotFound("user not found".to_string()));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_DELETED, "user")
                    .resource(id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    /// Activate or deactivate. An admin cannot deactivate their own account.
    pub async fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if !is_active && actor == id {
            return Err(ApiError::Forbidden(
                "cannot deactivate your own account".to_string(),
            ));
        }
        if !self.user_repo.set_active(id, is_active).await? {
            return Err(ApiError::NotFound("user not found".to_string()));
        }
        if !is_active {
            // A deactivated user keeps no live credentials.
            self.access_repo.revoke_all_for_user(id).await?;
            self.refresh_repo.revoke_all_for_user(id).await?;
        }
        let action = if is_active {
            actions::USER_ACTIVATED
        } else {
            actions::USER_DEACTIVATED
        };
        self.audit
            .record(
                AuditEvent::by_user(actor, action, "user")
                    .resource(id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    /// Administrative lock. An admin cannot lock their own account.
    pub async fn lock(
        &self,
        id: Uuid,
        minutes: Option<i64>,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if actor == id {
            return Err(ApiError::Forbidden(
                "cannot lock your own account".to_string(),
            ));
        }
        let minutes = minutes.unwrap_or(self.lockout.lockout_duration_minutes);
        let until = Utc::now() + Duration::minutes(minutes);
        if !self.user_repo.lock_until(id, until).await? {
            return Err(ApiError::NotFound("user not found".to_string()));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_LOCKED, "user")
                    .resource(id.to_string())
                    .metadata(serde_json::json!({ "locked_until": until }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    pub async fn unlock(&self, id: Uuid, actor: Uuid, meta: &RequestMeta) -> Result<(), ApiError> {
        if !self.user_repo.unlock(id).await? {
            return Err(ApiError::NotFound("user not found".to_string()));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_UNLOCKED, "user")
                    .resource(id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    /// Password check with lockout enforcement. A locked account is rejected
    /// before the password is even looked at.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<User, ApiError> {
        let Some(user) = self.user_repo.find_by_username(username).await? else {
            return Err(ApiError::Unauthorized("invalid credentials".to_string()));
        };

        let now = Utc::now();
        if user.is_locked(now) {
            self.log_login_failure(&user, "account_locked", meta).await;
            return Err(ApiError::Unauthorized("account_locked".to_string()));
        }
        if !user.is_active {
            self.log_login_failure(&user, "account_inactive", meta).await;
            return Err(ApiError::Unauthorized("invalid credentials".to_string()));
        }

        // Stale failure streaks reset before this attempt counts.
        if let Some(last) = user.last_failed_login {
            if now - last > Duration::minutes(self.lockout.window_minutes) {
                self.user_repo.reset_failed_logins(user.id).await?;
            }
        }

        if !verify_password(password, &user.password_hash)? {
            let failures = self.user_repo.record_failed_login(user.id).await?;
            if failures >= self.lockout.max_failed_attempts {
                let until = now + Duration::minutes(self.lockout.lockout_duration_minutes);
                self.user_repo.lock_until(user.id, until).await?;
                self.audit
                    .record(
                        AuditEvent::by_system(actions::USER_LOCKED, "user")
                            .user(user.id)
                            .resource(user.id.to_string())
                            .metadata(serde_json::json!({
                                "failed_attempts": failures,
                                "locked_until": until,
                            }))
                            .from_addr(meta.ip(), meta.user_agent()),
                    )
                    .await;
            }
            self.log_login_failure(&user, "invalid_password", meta).await;
            return Err(ApiError::Unauthorized("invalid credentials".to_string()));
        }

        self.user_repo.reset_failed_logins(user.id).await?;
        self.audit
            .record(
                AuditEvent::by_user(user.id, actions::USER_LOGIN, "user")
                    .resource(user.id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(user)
    }

    async fn log_login_failure(&self, user: &User, reason: &str, meta: &RequestMeta) {
        self.audit
            .record(
                AuditEvent::by_user(user.id, actions::USER_LOGIN_FAILED, "user")
                    .resource(user.id.to_string())
                    .failure(reason)
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.b-c_d").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("-leading").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(65)).is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("user+tag@example.org").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("trailing@domain").is_err());
    }

    #[test]
    fn lockout_defaults() {
        let config = LockoutConfig::default();
        assert_eq!(config.max_failed_attempts, 5);
        assert!(config.lockout_duration_minutes > 0);
        assert!(config.window_minutes >= config.lockout_duration_minutes);
    }
}
