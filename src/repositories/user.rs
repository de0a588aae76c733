use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::User;

/// Repository for user rows.
#[derive(Clone)]
pub struct UserRepository {
    pool: MySqlPool,
}

impl UserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        id: Uuid,
        username: &str,
        email: &str,
        password_hash: &str,
        display_name: Option<&str>,
        must_change_password: bool,
        created_by: Option<Uuid>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users
            (id, username, email, password_hash, display_name, must_change_password, created_by, updated_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .bind(must_change_password)
        .bind(created_by.map(|u| u.to_string()))
        .bind(created_by.map(|u| u.to_string()))
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
    }

    /// Partial profile update. Username is immutable after create.
    pub async fn update_profile(
        &self,
        id: Uuid,
        email: Option<&str>,
        display_name: Option<&str>,
        email_verified: Option<bool>,
        must_change_password: Option<bool>,
        updated_by: Option<Uuid>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users SET
                email = COALESCE(?, email),
                display_name = COALESCE(?, display_name),
                email_verified = COALESCE(?, email_verified),
                must_change_password = COALESCE(?, must_change_password),
                updated_by = COALESCE(?, updated_by)
            WHERE id = ?
            "#,
        )
        .bind(email)
        .bind(display_name)
        .bind(email_verified)
        .bind(must_change_password)
        .bind(updated_by.map(|u| u.to_string()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET password_hash = ?, must_change_password = FALSE WHERE id = ?",
        )
        .bind(password_hash)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn lock_until(
        &self,
        id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
            .bind(until)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unlock(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET locked_until = NULL, failed_login_attempts = 0 WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Increment the consecutive-failure counter and return the new value.
    pub async fn record_failed_login(&self, id: Uuid) -> Result<i32, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                last_failed_login = NOW()
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        sqlx::query_scalar::<_, i32>("SELECT failed_login_attempts FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
    }

    pub async fn reset_failed_logins(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, last_failed_login = NULL WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a user. Tokens, codes, roles, direct permissions and consents go
    /// with the row via FK cascade; audit rows keep the event with a nulled
    /// user link.
    pub async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
