use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::Scope;

/// Repository for the scope registry.
#[derive(Clone)]
pub struct ScopeRepository {
    pool: MySqlPool,
}

impl ScopeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: Uuid,
        name: &str,
        description: Option<&str>,
        is_default: bool,
    ) -> Result<Scope, sqlx::Error> {
        sqlx::query("INSERT INTO scopes (id, name, description, is_default) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(name)
            .bind(description)
            .bind(is_default)
            .execute(&self.pool)
            .await?;
        self.find_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Scope>, sqlx::Error> {
        sqlx::query_as::<_, Scope>("SELECT * FROM scopes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Scope>, sqlx::Error> {
        sqlx::query_as::<_, Scope>("SELECT * FROM scopes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(&self) -> Result<Vec<Scope>, sqlx::Error> {
        sqlx::query_as::<_, Scope>("SELECT * FROM scopes ORDER BY name")
            .fetch_all(&self.pool)
            .await
    }

    /// Count how many of the given names are registered.
    pub async fn count_known(&self, names: &[String]) -> Result<i64, sqlx::Error> {
        if names.is_empty() {
            return Ok(0);
        }
        let mut qb = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM scopes WHERE name IN (");
        let mut separated = qb.separated(", ");
        for name in names {
            separated.push_bind(name.clone());
        }
        qb.push(")");
        let row: (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    pub async fn update(
        &self,
        id: Uuid,
        description: Option<&str>,
        is_default: Option<bool>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE scopes SET
                description = COALESCE(?, description),
                is_default = COALESCE(?, is_default)
            WHERE id = ?
            "#,
        )
        .bind(description)
        .bind(is_default)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM scopes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
