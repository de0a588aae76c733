use sqlx::MySqlPool;
use uuid::Uuid;

use crate::models::Client;

/// Repository for registered OAuth clients.
#[derive(Clone)]
pub struct ClientRepository {
    pool: MySqlPool,
}

pub struct NewClient<'a> {
    pub id: Uuid,
    pub client_id: &'a str,
    pub client_secret_hash: Option<&'a str>,
    pub client_name: &'a str,
    pub client_type: &'a str,
    pub redirect_uris: &'a [String],
    pub allowed_scopes: &'a [String],
    pub grant_types: &'a [String],
    pub response_types: &'a [String],
    pub token_endpoint_auth_method: &'a str,
    pub jwks_uri: Option<&'a str>,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub strict_redirect_uri_matching: bool,
    pub allow_localhost_redirect: bool,
    pub require_https_redirect: bool,
    pub access_token_lifetime: i64,
    pub refresh_token_lifetime: i64,
    pub code_lifetime: i64,
}

impl ClientRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewClient<'_>) -> Result<Client, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO clients
            (id, client_id, client_secret_hash, client_name, client_type,
             redirect_uris, allowed_scopes, grant_types, response_types,
             token_endpoint_auth_method, jwks_uri, require_pkce, require_consent,
             strict_redirect_uri_matching, allow_localhost_redirect,
             require_https_redirect, access_token_lifetime, refresh_token_lifetime,
             code_lifetime)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.id.to_string())
        .bind(new.client_id)
        .bind(new.client_secret_hash)
        .bind(new.client_name)
        .bind(new.client_type)
        .bind(serde_json::to_value(new.redirect_uris).unwrap_or_default())
        .bind(serde_json::to_value(new.allowed_scopes).unwrap_or_default())
        .bind(serde_json::to_value(new.grant_types).unwrap_or_default())
        .bind(serde_json::to_value(new.response_types).unwrap_or_default())
        .bind(new.token_endpoint_auth_method)
        .bind(new.jwks_uri)
        .bind(new.require_pkce)
        .bind(new.require_consent)
        .bind(new.strict_redirect_uri_matching)
        .bind(new.allow_localhost_redirect)
        .bind(new.require_https_redirect)
        .bind(new.access_token_lifetime)
        .bind(new.refresh_token_lifetime)
        .bind(new.code_lifetime)
        .execute(&self.pool)
        .await?;

        self.find_by_id(new.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Client>, sqlx::Error> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Client>, sqlx::Error> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_active_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Client>, sqlx::Error> {
        sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE client_id = ? AND is_active = TRUE",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Client>, sqlx::Error> {
        sqlx::query_as::<_, Client>(
            "SELECT * FROM clients ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients")
            .fetch_one(&self.pool)
            .await
    }

    /// Partial metadata update; invariant checks happen in the service layer.
    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        &self,
        id: Uuid,
        client_name: Option<&str>,
        redirect_uris: Option<&[String]>,
        allowed_scopes: Option<&[String]>,
        grant_types: Option<&[String]>,
        response_types: Option<&[String]>,
        token_endpoint_auth_method: Option<&str>,
        jwks_uri: Option<Option<&str>>,
        require_pkce: Option<bool>,
        require_consent: Option<bool>,
        strict_redirect_uri_matching: Option<bool>,
        allow_localhost_redirect: Option<bool>,
        require_https_redirect: Option<bool>,
        access_token_lifetime: Option<i64>,
        refresh_token_lifetime: Option<i64>,
        code_lifetime: Option<i64>,
        is_active: Option<bool>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE clients SET
                client_name = COALESCE(?, client_name),
                redirect_uris = COALESCE(?, redirect_uris),
                allowed_scopes = COALESCE(?, allowed_scopes),
                grant_types = COALESCE(?, grant_types),
                response_types = COALESCE(?, response_types),
                token_endpoint_auth_method = COALESCE(?, token_endpoint_auth_method),
                jwks_uri = CASE WHEN ? THEN ? ELSE jwks_uri END,
                require_pkce = COALESCE(?, require_pkce),
                require_consent = COALESCE(?, require_consent),
                strict_redirect_uri_matching = COALESCE(?, strict_redirect_uri_matching),
                allow_localhost_redirect = COALESCE(?, allow_localhost_redirect),
                require_https_redirect = COALESCE(?, require_https_redirect),
                access_token_lifetime = COALESCE(?, access_token_lifetime),
                refresh_token_lifetime = COALESCE(?, refresh_token_lifetime),
                code_lifetime = COALESCE(?, code_lifetime),
                is_active = COALESCE(?, is_active)
            WHERE id = ?
            "#,
        )
        .bind(client_name)
        .bind(redirect_uris.map(|v| serde_json::to_value(v).unwrap_or_default()))
        .bind(allowed_scopes.map(|v| serde_json::to_value(v).unwrap_or_default()))
        .bind(grant_types.map(|v| serde_json::to_value(v).unwrap_or_default()))
        .bind(response_types.map(|v| serde_json::to_value(v).unwrap_or_default()))
        .bind(token_endpoint_auth_method)
        .bind(jwks_uri.is_some())
        .bind(jwks_uri.flatten())
        .bind(require_pkce)
        .bind(require_consent)
        .bind(strict_redirect_uri_matching)
        .bind(allow_localhost_redirect)
        .bind(require_https_redirect)
        .bind(access_token_lifetime)
        .bind(refresh_token_lifetime)
        .bind(code_lifetime)
        .bind(is_active)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Install a new secret hash, or clear it when the client becomes public.
    pub async fn set_secret_hash(
        &self,
        id: Uuid,
        secret_hash: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE clients SET client_secret_hash = ? WHERE id = ?")
            .bind(secret_hash)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_client_type(
        &self,
        id: Uuid,
        client_type: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE clients SET client_type = ? WHERE id = ?")
            .bind(client_type)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete the client row; issued tokens, codes and consents cascade.
    pub async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
