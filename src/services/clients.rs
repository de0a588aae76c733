use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::RequestMeta;
use crate::models::{actions, Client, ClientType, TokenEndpointAuthMethod};
use crate::repositories::{
    AccessTokenRepository, ClientRepository, NewClient, RefreshTokenRepository, ScopeRepository,
};
use crate::services::audit::{AuditEvent, AuditService};
use crate::utils::secret::{generate_client_secret, hash_client_secret};

/// Parameters for registering a client.
#[derive(Debug, Clone)]
pub struct ClientCreateParams {
    pub client_id: Option<String>,
    pub client_name: String,
    pub client_type: ClientType,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    pub jwks_uri: Option<String>,
    pub require_pkce: Option<bool>,
    pub require_consent: Option<bool>,
    pub strict_redirect_uri_matching: Option<bool>,
    pub allow_localhost_redirect: Option<bool>,
    pub require_https_redirect: Option<bool>,
    pub access_token_lifetime: Option<i64>,
    pub refresh_token_lifetime: Option<i64>,
    pub code_lifetime: Option<i64>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdateParams {
    pub client_name: Option<String>,
    pub client_type: Option<ClientType>,
    pub redirect_uris: Option<Vec<String>>,
    pub allowed_scopes: Option<Vec<String>>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    pub token_endpoint_auth_method: Option<TokenEndpointAuthMethod>,
    pub jwks_uri: Option<Option<String>>,
    pub require_pkce: Option<bool>,
    pub require_consent: Option<bool>,
    pub strict_redirect_uri_matching: Option<bool>,
    pub allow_localhost_redirect: Option<bool>,
    pub require_https_redirect: Option<bool>,
    pub access_token_lifetime: Option<i64>,
    pub refresh_token_lifetime: Option<i64>,
    pub code_lifetime: Option<i64>,
    pub is_active: Option<bool>,
    pub regenerate_secret: bool,
}

/// Check the structural invariants of a client record.
fn validate_metadata(
    client_type: ClientType,
    auth_method: TokenEndpointAuthMethod,
    grant_types: &[String],
    response_types: &[String],
    redirect_uris: &[String],
    jwks_uri: Option<&str>,
) -> Result<(), ApiError> {
    if client_type == ClientType::Public && auth_method != TokenEndpointAuthMethod::None {
        return Err(ApiError::Validation(
            "public clients must use token_endpoint_auth_method 'none'".to_string(),
        ));
    }
    if client_type == ClientType::Confidential && auth_method == TokenEndpointAuthMethod::None {
        return Err(ApiError::Validation(
            "confidential clients must authenticate at the token endpoint".to_string(),
        ));
    }
    if grant_types.iter().any(|g| g == "authorization_code")
        && !response_types.iter().any(|r| r == "code")
    {
        return Err(ApiError::Validation(
            "authorization_code grant requires the 'code' response type".to_string(),
        ));
    }
    if grant_types.iter().any(|g| g == "authorization_code") && redirect_uris.is_empty() {
        return Err(ApiError::Validation(
            "authorization_code grant requires at least one redirect URI".to_string(),
        ));
    }
    match (auth_method, jwks_uri) {
        (TokenEndpointAuthMethod::PrivateKeyJwt, None) => {
            return Err(ApiError::Validation(
                "private_key_jwt requires jwks_uri".to_string(),
            ))
        }
        (m, Some(_)) if m != TokenEndpointAuthMethod::PrivateKeyJwt => {
            return Err(ApiError::Validation(
                "jwks_uri is only valid with private_key_jwt".to_string(),
            ))
        }
        _ => {}
    }
    for uri in redirect_uris {
        if uri.contains('#') {
            return Err(ApiError::Validation(format!(
                "redirect URI must not contain a fragment: {}",
                uri
            )));
        }
        if !(uri.starts_with("https://") || uri.starts_with("http://")) {
            return Err(ApiError::Validation(format!(
                "redirect URI must be absolute http(s): {}",
                uri
            )));
        }
    }
    Ok(())
}

/// Administrative management of registered clients.
#[derive(Clone)]
pub struct ClientRegistryService {
    client_repo: ClientRepository,
    scope_repo: ScopeRepository,
    access_repo: AccessTokenRepository,
    refresh_repo: RefreshTokenRepository,
    audit: AuditService,
}

impl ClientRegistryService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            client_repo: ClientRepository::new(pool.clone()),
            scope_repo: ScopeRepository::new(pool.clone()),
            access_repo: AccessTokenRepository::new(pool.clone()),
            refresh_repo: RefreshTokenRepository::new(pool.clone()),
            audit: AuditService::new(pool),
        }
    }

    /// Register a client. For confidential clients with secret-based auth the
    /// generated secret is returned in plaintext exactly once.
    pub async fn create(
        &self,
        params: ClientCreateParams,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(Client, Option<String>), ApiError> {
        let require_pkce = match params.client_type {
            ClientType::Public => true,
            ClientType::Confidential => params.require_pkce.unwrap_or(false),
        };

        validate_metadata(
            params.client_type,
            params.token_endpoint_auth_method,
            &params.grant_types,
            &params.response_types,
            &params.redirect_uris,
            params.jwks_uri.as_deref(),
        )?;
        self.validate_scopes_registered(&params.allowed_scopes).await?;

        let client_id = params
            .client_id
            .unwrap_or_else(|| format!("client-{}", Uuid::new_v4().simple()));
        if self.client_repo.find_by_client_id(&client_id).await?.is_some() {
            return Err(ApiError::Conflict("client_id already exists".to_string()));
        }

        let (secret, secret_hash) = if params.token_endpoint_auth_method.uses_secret() {
            let secret = generate_client_secret();
            let hash = hash_client_secret(&secret)?;
            (Some(secret), Some(hash))
        } else {
            (None, None)
        };

        let client = self
            .client_repo
            .create(NewClient {
                id: Uuid::new_v4(),
                client_id: &client_id,
                client_secret_hash: secret_hash.as_deref(),
                client_name: &params.client_name,
                client_type: params.client_type.as_str(),
                redirect_uris: &params.redirect_uris,
                allowed_scopes: &params.allowed_scopes,
                grant_types: &params.grant_types,
                response_types: &params.response_types,
                token_endpoint_auth_method: params.token_endpoint_auth_method.as_str(),
                jwks_uri: params.jwks_uri.as_deref(),
                require_pkce,
                require_consent: params.require_consent.unwrap_or(true),
                strict_redirect_uri_matching: params.strict_redirect_uri_matching.unwrap_or(true),
                allow_localhost_redirect: params.allow_localhost_redirect.unwrap_or(false),
                require_https_redirect: params.require_https_redirect.unwrap_or(true),
                access_token_lifetime: params.access_token_lifetime.unwrap_or(3600),
                refresh_token_lifetime: params.refresh_token_lifetime.unwrap_or(2_592_000),
                code_lifetime: params.code_lifetime.unwrap_or(600),
            })
            .await?;

        for uri in &client.redirect_uris {
            if !client.redirect_uri_allowed_by_policy(uri) {
                // Roll back the row rather than leave a client that violates
                // its own redirect policy.
                self.client_repo.delete(client.id).await?;
                return Err(ApiError::Validation(format!(
                    "redirect URI violates the client's https policy: {}",
                    uri
                )));
            }
        }

        self.audit
            .record(
                AuditEvent::by_user(actor, actions::CLIENT_CREATED, "client")
                    .client(&client.client_id)
                    .resource(client.client_id.clone())
                    .metadata(serde_json::json!({
                        "client_type": client.client_type,
                        "grant_types": client.grant_types,
                    }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;

        Ok((client, secret))
    }

    pub async fn get(&self, id: Uuid) -> Result<Client, ApiError> {
        self.client_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("client not found".to_string()))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<Client>, i64), ApiError> {
        let clients = self.client_repo.list(limit, offset).await?;
        let total = self.client_repo.count().await?;
        Ok((clients, total))
    }

    /// Partial update honoring the same invariants as creation. Returns the
    /// updated client and, when the secret was rotated, its new plaintext.
    pub async fn update(
        &self,
        id: Uuid,
        params: ClientUpdateParams,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(Client, Option<String>), ApiError> {
        let current = self.get(id).await?;

        let client_type = params.client_type.unwrap_or(current.client_type);
        let auth_method = params
            .token_endpoint_auth_method
            .unwrap_or(current.token_endpoint_auth_method);
        let grant_types = params.grant_types.clone().unwrap_or(current.grant_types.clone());
        let response_types = params
            .response_types
            .clone()
            .unwrap_or(current.response_types.clone());
        let redirect_uris = params
            .redirect_uris
            .clone()
            .unwrap_or(current.redirect_uris.clone());
        let jwks_uri = match &params.jwks_uri {
            Some(value) => value.clone(),
            None => current.jwks_uri.clone(),
        };

        validate_metadata(
            client_type,
            auth_method,
            &grant_types,
            &response_types,
            &redirect_uris,
            jwks_uri.as_deref(),
        )?;
        if let Some(scopes) = &params.allowed_scopes {
            self.validate_scopes_registered(scopes).await?;
        }

        let becomes_public =
            client_type == ClientType::Public && current.client_type == ClientType::Confidential;

        self.client_repo
            .update(
                id,
                params.client_name.as_deref(),
                params.redirect_uris.as_deref(),
                params.allowed_scopes.as_deref(),
                params.grant_types.as_deref(),
                params.response_types.as_deref(),
                params.token_endpoint_auth_method.map(|m| m.as_str()),
                params.jwks_uri.as_ref().map(|o| o.as_deref()),
                // Public clients always carry the PKCE requirement.
                if client_type == ClientType::Public {
                    Some(true)
                } else {
                    params.require_pkce
                },
                params.require_consent,
                params.strict_redirect_uri_matching,
                params.allow_localhost_redirect,
                params.require_https_redirect,
                params.access_token_lifetime,
                params.refresh_token_lifetime,
                params.code_lifetime,
                params.is_active,
            )
            .await?;

        if params.client_type.is_some() {
            self.client_repo
                .set_client_type(id, client_type.as_str())
                .await?;
        }

        let mut new_secret = None;
        if becomes_public {
            // Going public discards the secret.
            self.client_repo.set_secret_hash(id, None).await?;
        } else if params.regenerate_secret {
            if !auth_method.uses_secret() {
                return Err(ApiError::Validation(
                    "client's auth method does not use a secret".to_string(),
                ));
            }
            let secret = generate_client_secret();
            let hash = hash_client_secret(&secret)?;
            self.client_repo.set_secret_hash(id, Some(&hash)).await?;
            new_secret = Some(secret);
            self.audit
                .record(
                    AuditEvent::by_user(actor, actions::CLIENT_SECRET_ROTATED, "client")
                        .client(&current.client_id)
                        .resource(current.client_id.clone())
                        .from_addr(meta.ip(), meta.user_agent()),
                )
                .await;
        } else if auth_method.uses_secret() && current.client_secret_hash.is_none() {
            // Switching a secretless client onto secret auth mints one.
            let secret = generate_client_secret();
            let hash = hash_client_secret(&secret)?;
            self.client_repo.set_secret_hash(id, Some(&hash)).await?;
            new_secret = Some(secret);
        }

        self.audit
            .record(
                AuditEvent::by_user(actor, actions::CLIENT_UPDATED, "client")
                    .client(&current.client_id)
                    .resource(current.client_id.clone())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;

        let updated = self.get(id).await?;
        Ok((updated, new_secret))
    }

    /// Delete a client, revoking everything it ever issued.
    pub async fn delete(&self, id: Uuid, actor: Uuid, meta: &RequestMeta) -> Result<(), ApiError> {
        let client = self.get(id).await?;
        let access = self.access_repo.revoke_all_for_client(id).await?;
        let refresh = self.refresh_repo.revoke_all_for_client(id).await?;
        self.client_repo.delete(id).await?;

        self.audit
            .record(
                AuditEvent::by_user(actor, actions::CLIENT_DELETED, "client")
                    .client(&client.client_id)
                    .resource(client.client_id.clone())
                    .metadata(serde_json::json!({
                        "revoked_access_tokens": access,
                        "revoked_refresh_tokens": refresh,
                    }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    async fn validate_scopes_registered(&self, scopes: &[String]) -> Result<(), ApiError> {
        if scopes.is_empty() {
            return Ok(());
        }
        let known = self.scope_repo.count_known(scopes).await?;
        if known as usize != scopes.len() {
            return Err(ApiError::Validation(
                "one or more scopes are not registered".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn public_client_must_use_none() {
        let err = validate_metadata(
            ClientType::Public,
            TokenEndpointAuthMethod::ClientSecretBasic,
            &strings(&["authorization_code"]),
            &strings(&["code"]),
            &strings(&["https://c.test/cb"]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn confidential_client_must_authenticate() {
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::None,
            &strings(&["client_credentials"]),
            &[],
            &[],
            None,
        )
        .is_err());
    }

    #[test]
    fn code_grant_needs_code_response_type() {
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::ClientSecretBasic,
            &strings(&["authorization_code"]),
            &strings(&["token"]),
            &strings(&["https://c.test/cb"]),
            None,
        )
        .is_err());
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::ClientSecretBasic,
            &strings(&["authorization_code"]),
            &strings(&["code"]),
            &strings(&["https://c.test/cb"]),
            None,
        )
        .is_ok());
    }

    #[test]
    fn jwks_uri_bound_to_private_key_jwt() {
        // Required with private_key_jwt.
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::PrivateKeyJwt,
            &strings(&["client_credentials"]),
            &[],
            &[],
            None,
        )
        .is_err());
        // Forbidden without it.
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::ClientSecretBasic,
            &strings(&["client_credentials"]),
            &[],
            &[],
            Some("https://c.test/jwks.json"),
        )
        .is_err());
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::PrivateKeyJwt,
            &strings(&["client_credentials"]),
            &[],
            &[],
            Some("https://c.test/jwks.json"),
        )
        .is_ok());
    }

    #[test]
    fn redirect_uri_shape_checks() {
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::ClientSecretBasic,
            &strings(&["authorization_code"]),
            &strings(&["code"]),
            &strings(&["https://c.test/cb#frag"]),
            None,
        )
        .is_err());
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::ClientSecretBasic,
            &strings(&["authorization_code"]),
            &strings(&["code"]),
            &strings(&["not-a-uri"]),
            None,
        )
        .is_err());
    }

    #[test]
    fn code_grant_requires_redirect_uri() {
        assert!(validate_metadata(
            ClientType::Confidential,
            TokenEndpointAuthMethod::ClientSecretBasic,
            &strings(&["authorization_code"]),
            &strings(&["code"]),
            &[],
            None,
        )
        .is_err());
    }
}
