//! The `/authorize` state machine: validate → authenticate user → consent →
//! mint code.
//!
//! Error routing follows the redirect rule: anything detected before the
//! redirect URI is confirmed (unknown client, unregistered redirect URI) is a
//! direct error; everything after goes back to the client as an error
//! redirect carrying `error`, `error_description` and `state`.

use chrono::{Duration, Utc};
use sqlx::MySqlPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::OAuthError;
use crate::middleware::RequestMeta;
use crate::models::{actions, Client};
use crate::repositories::{
    AuthorizationCodeRepository, ClientRepository, ConsentRepository, ScopeRepository,
    UserRepository,
};
use crate::services::audit::{AuditEvent, AuditService};
use crate::utils::pkce::{validate_code_challenge, PKCE_METHOD_S256};
use crate::utils::secret::{generate_authorization_code, hash_token};

/// A validated authorize request, parsed out of the query string.
#[derive(Debug, Clone)]
pub struct AuthorizeParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub prompt: Option<String>,
}

/// Consent decision posted back by the external consent UI.
#[derive(Debug, Clone)]
pub struct ConsentDecision {
    pub approved: bool,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Where the flow goes next.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    RedirectToLogin(String),
    RedirectToConsent(String),
    RedirectWithCode(String),
}

/// How the flow fails.
#[derive(Debug)]
pub enum AuthorizeReject {
    /// Pre-redirect-validation failure; rendered directly.
    Direct(OAuthError),
    /// Post-validation failure; an error redirect URL, ready to send.
    Redirect(String),
}

/// Append query parameters to a URL that may already carry a query string.
pub fn append_query(base: &str, params: &[(&str, &str)]) -> String {
    let mut url = base.to_string();
    let mut separator = if base.contains('?') { '&' } else { '?' };
    for (key, value) in params {
        url.push(separator);
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    url
}

/// Build an error redirect preserving `state`.
pub fn error_redirect(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> String {
    let mut params = vec![("error", error), ("error_description", description)];
    if let Some(state) = state {
        params.push(("state", state));
    }
    append_query(redirect_uri, &params)
}

/// PKCE parameter policy at the authorize endpoint. Returns the challenge to
/// bind into the code, or an (error, description) pair for the redirect.
fn check_pkce_params(
    client: &Client,
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
) -> Result<Option<String>, (&'static str, &'static str)> {
    match code_challenge {
        None => {
            if client.pkce_required() {
                Err(("invalid_request", "code_challenge is required"))
            } else {
                Ok(None)
            }
        }
        Some(challenge) => {
            let method = code_challenge_method.unwrap_or(PKCE_METHOD_S256);
            if method != PKCE_METHOD_S256 {
                return Err(("invalid_request", "code_challenge_method must be S256"));
            }
            if !validate_code_challenge(challenge) {
                return Err(("invalid_request", "malformed code_challenge"));
            }
            Ok(Some(challenge.to_string()))
        }
    }
}

/// The authorize flow engine.
#[derive(Clone)]
pub struct AuthorizeService {
    client_repo: ClientRepository,
    code_repo: AuthorizationCodeRepository,
    consent_repo: ConsentRepository,
    scope_repo: ScopeRepository,
    user_repo: UserRepository,
    audit: AuditService,
    config: Arc<Config>,
}

impl AuthorizeService {
    pub fn new(pool: MySqlPool, config: Arc<Config>) -> Self {
        Self {
            client_repo: ClientRepository::new(pool.clone()),
            code_repo: AuthorizationCodeRepository::new(pool.clone()),
            consent_repo: ConsentRepository::new(pool.clone()),
            scope_repo: ScopeRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            audit: AuditService::new(pool),
            config,
        }
    }

    /// Run the authorize state machine for a GET /authorize request.
    pub async fn begin(
        &self,
        params: &AuthorizeParams,
        session_user: Option<Uuid>,
        meta: &RequestMeta,
    ) -> Result<AuthorizeOutcome, AuthorizeReject> {
        let client = self.load_client_for_redirect(&params.client_id, &params.redirect_uri).await?;
        let state = params.state.as_deref();
        let reject = |error: &str, description: &str| {
            AuthorizeReject::Redirect(error_redirect(&params.redirect_uri, error, description, state))
        };

        if params.response_type != "code" {
            return Err(reject("unsupported_response_type", "only response_type=code is supported"));
        }
        if !client.allows_response_type("code") || !client.allows_grant("authorization_code") {
            return Err(reject("unauthorized_client", "client may not use the authorization code flow"));
        }

        self.check_scopes(&client, &params.scopes)
            .await
            .map_err(|description| reject("invalid_scope", &description))?;

        let challenge = check_pkce_params(
            &client,
            params.code_challenge.as_deref(),
            params.code_challenge_method.as_deref(),
        )
        .map_err(|(error, description)| reject(error, description))?;

        // AUTH state: no session, or an explicit re-login request, goes to the
        // external login page with the whole request preserved.
        let wants_login = params.prompt.as_deref() == Some("login");
        let Some(user_id) = session_user.filter(|_| !wants_login) else {
            return Ok(AuthorizeOutcome::RedirectToLogin(self.login_redirect(params)));
        };

        let now = Utc::now();
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await
            .map_err(|e| AuthorizeReject::Direct(e.into()))?;
        let Some(user) = user.filter(|u| u.can_authenticate(now)) else {
            return Err(reject("access_denied", "user may not authenticate"));
        };

        // CONSENT state.
        if self.consent_needed(&client, user.id, &params.scopes, params.prompt.as_deref()).await
            .map_err(|e| AuthorizeReject::Direct(e.into()))?
        {
            if params.prompt.as_deref() == Some("none") {
                return Err(reject("access_denied", "consent required"));
            }
            return Ok(AuthorizeOutcome::RedirectToConsent(self.consent_redirect(&client, params)));
        }

        // MINT_CODE state.
        let url = self
            .mint_code(
                &client,
                user.id,
                &params.redirect_uri,
                &params.scopes,
                params.nonce.as_deref(),
                challenge.as_deref(),
                state,
                meta,
            )
            .await
            .map_err(AuthorizeReject::Direct)?;
        Ok(AuthorizeOutcome::RedirectWithCode(url))
    }

    /// Apply a consent decision posted back by the consent UI.
    pub async fn finish_consent(
        &self,
        decision: &ConsentDecision,
        user_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<AuthorizeOutcome, AuthorizeReject> {
        let client = self
            .load_client_for_redirect(&decision.client_id, &decision.redirect_uri)
            .await?;
        let state = decision.state.as_deref();
        let reject = |error: &str, description: &str| {
            AuthorizeReject::Redirect(error_redirect(&decision.redirect_uri, error, description, state))
        };

        self.check_scopes(&client, &decision.scopes)
            .await
            .map_err(|description| reject("invalid_scope", &description))?;

        if !decision.approved {
            self.audit
                .record(
                    AuditEvent::by_user(user_id, actions::CONSENT_DENIED, "consent")
                        .client(&client.client_id)
                        .resource(client.client_id.clone())
                        .metadata(serde_json::json!({ "scopes": decision.scopes }))
                        .from_addr(meta.ip(), meta.user_agent()),
                )
                .await;
            return Err(reject("access_denied", "user denied consent"));
        }

        let challenge = check_pkce_params(
            &client,
            decision.code_challenge.as_deref(),
            decision.code_challenge_method.as_deref(),
        )
        .map_err(|(error, description)| reject(error, description))?;

        self.consent_repo
            .upsert(user_id, client.id, &decision.scopes, None)
            .await
            .map_err(|e| AuthorizeReject::Direct(e.into()))?;
        self.audit
            .record(
                AuditEvent::by_user(user_id, actions::CONSENT_GRANTED, "consent")
                    .client(&client.client_id)
                    .resource(client.client_id.clone())
                    .metadata(serde_json::json!({ "scopes": decision.scopes }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;

        let url = self
            .mint_code(
                &client,
                user_id,
                &decision.redirect_uri,
                &decision.scopes,
                decision.nonce.as_deref(),
                challenge.as_deref(),
                state,
                meta,
            )
            .await
            .map_err(AuthorizeReject::Direct)?;
        Ok(AuthorizeOutcome::RedirectWithCode(url))
    }

    /// Client and redirect-URI validation; failures here never redirect.
    async fn load_client_for_redirect(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<Client, AuthorizeReject> {
        let client = self
            .client_repo
            .find_active_by_client_id(client_id)
            .await
            .map_err(|e| AuthorizeReject::Direct(e.into()))?
            .ok_or(AuthorizeReject::Direct(OAuthError::InvalidClient))?;
        if !client.redirect_uri_matches(redirect_uri) {
            return Err(AuthorizeReject::Direct(OAuthError::InvalidRequest(
                "redirect_uri does not match any registered URI".to_string(),
            )));
        }
        Ok(client)
    }

    /// Requested scopes must be allowed for the client and known to the
    /// registry.
    async fn check_scopes(&self, client: &Client, scopes: &[String]) -> Result<(), String> {
        if scopes.is_empty() {
            return Err("at least one scope is required".to_string());
        }
        if !client.allows_scopes(scopes) {
            return Err("requested scope exceeds the client's allowed scopes".to_string());
        }
        let known = self
            .scope_repo
            .count_known(scopes)
            .await
            .map_err(|e| format!("scope validation failed: {}", e))?;
        if known as usize != scopes.len() {
            return Err("unknown scope requested".to_string());
        }
        Ok(())
    }

    async fn consent_needed(
        &self,
        client: &Client,
        user_id: Uuid,
        scopes: &[String],
        prompt: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        if prompt == Some("consent") {
            return Ok(true);
        }
        if !client.require_consent {
            return Ok(false);
        }
        let now = Utc::now();
        let grant = self.consent_repo.find(user_id, client.id).await?;
        Ok(!grant
            .map(|g| g.is_valid(now) && g.covers(scopes))
            .unwrap_or(false))
    }

    fn login_redirect(&self, params: &AuthorizeParams) -> String {
        let continue_url = self.authorize_url(params);
        append_query(&self.config.login_url, &[("continue", &continue_url)])
    }

    /// Reconstruct the full authorize URL so the login page can resume the
    /// flow, minus any `prompt=login` that would loop it.
    fn authorize_url(&self, params: &AuthorizeParams) -> String {
        let scope = params.scopes.join(" ");
        let base = format!("{}/api/v2/oauth/authorize", self.config.public_base_url);
        let mut query: Vec<(&str, &str)> = vec![
            ("response_type", &params.response_type),
            ("client_id", &params.client_id),
            ("redirect_uri", &params.redirect_uri),
            ("scope", &scope),
        ];
        if let Some(state) = &params.state {
            query.push(("state", state));
        }
        if let Some(nonce) = &params.nonce {
            query.push(("nonce", nonce));
        }
        if let Some(challenge) = &params.code_challenge {
            query.push(("code_challenge", challenge));
            query.push(("code_challenge_method", PKCE_METHOD_S256));
        }
        append_query(&base, &query)
    }

    fn consent_redirect(&self, client: &Client, params: &AuthorizeParams) -> String {
        let scope = params.scopes.join(" ");
        let mut query: Vec<(&str, &str)> = vec![
            ("client_id", &params.client_id),
            ("client_name", &client.client_name),
            ("redirect_uri", &params.redirect_uri),
            ("scope", &scope),
        ];
        if let Some(state) = &params.state {
            query.push(("state", state));
        }
        if let Some(nonce) = &params.nonce {
            query.push(("nonce", nonce));
        }
        if let Some(challenge) = &params.code_challenge {
            query.push(("code_challenge", challenge));
            query.push(("code_challenge_method", PKCE_METHOD_S256));
        }
        append_query(&self.config.consent_url, &query)
    }

    #[allow(clippy::too_many_arguments)]
    async fn mint_code(
        &self,
        client: &Client,
        user_id: Uuid,
        redirect_uri: &str,
        scopes: &[String],
        nonce: Option<&str>,
        code_challenge: Option<&str>,
        state: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<String, OAuthError> {
        let code = generate_authorization_code();
        let code_hash = hash_token(&code);
        let ttl = if client.code_lifetime > 0 {
            client.code_lifetime
        } else {
            self.config.auth_code_ttl_secs
        };
        let expires_at = Utc::now() + Duration::seconds(ttl);

        self.code_repo
            .create(
                &code_hash,
                client.id,
                user_id,
                redirect_uri,
                scopes,
                nonce,
                code_challenge,
                code_challenge.map(|_| PKCE_METHOD_S256),
                expires_at,
            )
            .await?;

        self.audit
            .record(
                AuditEvent::by_user(user_id, actions::CODE_ISSUED, "authorization_code")
                    .client(&client.client_id)
                    .resource(client.client_id.clone())
                    .metadata(serde_json::json!({
                        "scopes": scopes,
                        "redirect_uri": redirect_uri,
                        "pkce": code_challenge.is_some(),
                    }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;

        let mut params: Vec<(&str, &str)> = vec![("code", &code)];
        if let Some(state) = state {
            params.push(("state", state));
        }
        Ok(append_query(redirect_uri, &params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientType, TokenEndpointAuthMethod};

    fn test_client(client_type: ClientType, require_pkce: bool) -> Client {
        let now = Utc::now();
        Client {
            id: Uuid::new_v4(),
            client_id: "web-app".into(),
            client_secret_hash: None,
            client_name: "Web App".into(),
            client_type,
            redirect_uris: vec!["https://c.test/cb".into()],
            allowed_scopes: vec!["openid".into(), "profile".into()],
            grant_types: vec!["authorization_code".into()],
            response_types: vec!["code".into()],
            token_endpoint_auth_method: TokenEndpointAuthMethod::None,
            jwks_uri: None,
            require_pkce,
            require_consent: true,
            strict_redirect_uri_matching: true,
            allow_localhost_redirect: false,
            require_https_redirect: true,
            access_token_lifetime: 3600,
            refresh_token_lifetime: 2_592_000,
            code_lifetime: 600,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn append_query_handles_existing_query() {
        assert_eq!(
            append_query("https://c.test/cb", &[("code", "abc"), ("state", "x y")]),
            "https://c.test/cb?code=abc&state=x%20y"
        );
        assert_eq!(
            append_query("https://c.test/cb?keep=1", &[("code", "abc")]),
            "https://c.test/cb?keep=1&code=abc"
        );
    }

    #[test]
    fn error_redirect_preserves_state() {
        let url = error_redirect("https://c.test/cb", "access_denied", "user denied consent", Some("xyz"));
        assert!(url.starts_with("https://c.test/cb?error=access_denied"));
        assert!(url.contains("error_description=user%20denied%20consent"));
        assert!(url.ends_with("state=xyz"));

        let url = error_redirect("https://c.test/cb", "invalid_scope", "nope", None);
        assert!(!url.contains("state="));
    }

    #[test]
    fn public_client_requires_challenge() {
        let client = test_client(ClientType::Public, false);
        let err = check_pkce_params(&client, None, None).unwrap_err();
        assert_eq!(err.0, "invalid_request");
    }

    #[test]
    fn confidential_client_without_pkce_flag_may_skip_challenge() {
        let client = test_client(ClientType::Confidential, false);
        assert_eq!(check_pkce_params(&client, None, None).unwrap(), None);
    }

    #[test]
    fn pkce_method_must_be_s256() {
        let client = test_client(ClientType::Public, true);
        let err = check_pkce_params(&client, Some(CHALLENGE), Some("plain")).unwrap_err();
        assert_eq!(err.0, "invalid_request");
        // Absent method defaults to S256.
        assert!(check_pkce_params(&client, Some(CHALLENGE), None).unwrap().is_some());
        assert!(check_pkce_params(&client, Some(CHALLENGE), Some("S256")).unwrap().is_some());
    }

    #[test]
    fn malformed_challenge_rejected() {
        let client = test_client(ClientType::Public, true);
        assert!(check_pkce_params(&client, Some("too-short"), None).is_err());
    }
}
