//! Token endpoint engine: grant dispatch, PKCE verification, refresh
//! rotation with reuse detection, permission freezing at mint time.

use chrono::{TimeZone, Utc};
use sqlx::MySqlPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::OAuthError;
use crate::middleware::RequestMeta;
use crate::models::{actions, AuthorizationCode, Client};
use crate::repositories::{
    AccessTokenRepository, AuthorizationCodeRepository, PermissionRepository,
    RefreshTokenRepository, UserRepository,
};
use crate::services::audit::{AuditEvent, AuditService};
use crate::utils::pkce::{validate_code_verifier, verify_pkce};
use crate::utils::secret::hash_token;
use crate::utils::token::TokenCodec;

/// Everything a successful grant hands back to the endpoint.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: i64,
    pub scopes: Vec<String>,
}

/// The `/token` grant engine. Client authentication has already happened by
/// the time any method here runs.
#[derive(Clone)]
pub struct TokenService {
    code_repo: AuthorizationCodeRepository,
    access_repo: AccessTokenRepository,
    refresh_repo: RefreshTokenRepository,
    permission_repo: PermissionRepository,
    user_repo: UserRepository,
    audit: AuditService,
    codec: TokenCodec,
    config: Arc<Config>,
}

impl TokenService {
    pub fn new(pool: MySqlPool, codec: TokenCodec, config: Arc<Config>) -> Self {
        Self {
            code_repo: AuthorizationCodeRepository::new(pool.clone()),
            access_repo: AccessTokenRepository::new(pool.clone()),
            refresh_repo: RefreshTokenRepository::new(pool.clone()),
            permission_repo: PermissionRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            audit: AuditService::new(pool),
            codec,
            config,
        }
    }

    /// `grant_type=authorization_code`.
    pub async fn exchange_authorization_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<IssuedTokens, OAuthError> {
        let result = self
            .do_exchange_code(client, code, redirect_uri, code_verifier)
            .await;
        self.record_grant_outcome(client, "authorization_code", &result, meta).await;
        result
    }

    async fn do_exchange_code(
        &self,
        client: &Client,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<IssuedTokens, OAuthError> {
        if !client.allows_grant("authorization_code") {
            return Err(OAuthError::UnauthorizedClient);
        }

        let code_hash = hash_token(code);
        let auth_code = self
            .code_repo
            .find_by_hash(&code_hash)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("invalid authorization code".to_string()))?;

        if auth_code.client_id != client.id {
            return Err(OAuthError::InvalidGrant(
                "authorization code was not issued to this client".to_string(),
            ));
        }
        if auth_code.redirect_uri != redirect_uri {
            return Err(OAuthError::InvalidGrant("redirect_uri does not match".to_string()));
        }
        let now = Utc::now();
        if auth_code.used || auth_code.is_expired(now) {
            return Err(OAuthError::InvalidGrant(
                "authorization code is expired or already used".to_string(),
            ));
        }

        verify_code_pkce(&auth_code, code_verifier)?;

        // Single-use linearization point: losing the race means the code was
        // exchanged concurrently.
        if !self.code_repo.consume(&code_hash).await? {
            return Err(OAuthError::InvalidGrant(
                "authorization code is expired or already used".to_string(),
            ));
        }

        let permissions = self
            .permission_repo
            .effective_for_user(auth_code.user_id)
            .await?;

        self.issue_for_user(
            client,
            auth_code.user_id,
            &auth_code.scopes,
            Some(permissions),
            auth_code.nonce.as_deref(),
        )
        .await
    }

    /// `grant_type=refresh_token` with one-shot rotation.
    pub async fn refresh_grant(
        &self,
        client: &Client,
        refresh_token: &str,
        requested_scopes: Option<Vec<String>>,
        meta: &RequestMeta,
    ) -> Result<IssuedTokens, OAuthError> {
        if !client.allows_grant("refresh_token") {
            let result = Err(OAuthError::UnauthorizedClient);
            self.record_grant_outcome(client, "refresh_token", &result, meta).await;
            return result;
        }

        let token_hash = hash_token(refresh_token);
        let row = match self.refresh_repo.find_by_hash(&token_hash).await? {
            Some(row) => row,
            None => {
                let result = Err(OAuthError::InvalidGrant("invalid refresh token".to_string()));
                self.record_grant_outcome(client, "refresh_token", &result, meta).await;
                return result;
            }
        };

        if row.client_id != client.id {
            let result = Err(OAuthError::InvalidGrant(
                "refresh token was not issued to this client".to_string(),
            ));
            self.record_grant_outcome(client, "refresh_token", &result, meta).await;
            return result;
        }

        let now = Utc::now();
        if row.expires_at <= now {
            let result = Err(OAuthError::InvalidGrant("refresh token is expired".to_string()));
            self.record_grant_outcome(client, "refresh_token", &result, meta).await;
            return result;
        }

        // A revoked token presented again, or a lost rotation race, is a
        // reuse: the whole chain and every descendant access token dies.
        if row.is_revoked || !self.refresh_repo.rotate(&row.jti).await? {
            let refresh_revoked = self.refresh_repo.revoke_chain(&row.chain_jti).await?;
            let access_revoked = self.access_repo.revoke_by_refresh_chain(&row.chain_jti).await?;
            self.audit
                .record(
                    AuditEvent::by_client(
                        &client.client_id,
                        actions::REFRESH_REUSE_DETECTED,
                        "refresh_token",
                    )
                    .resource(row.jti.clone())
                    .failure("refresh token reuse detected")
                    .metadata(serde_json::json!({
                        "chain_jti": row.chain_jti,
                        "revoked_refresh_tokens": refresh_revoked,
                        "revoked_access_tokens": access_revoked,
                    }))
                    .from_addr(meta.ip(), meta.user_agent()),
                )
                .await;
            return Err(OAuthError::InvalidGrant("refresh token has been revoked".to_string()));
        }

        let result = self
            .do_refresh(client, &row.chain_jti, &row.jti, row.user_id, &row.scopes, requested_scopes)
            .await;
        match &result {
            Ok(tokens) => {
                self.audit
                    .record(
                        AuditEvent::by_client(&client.client_id, actions::TOKEN_REFRESHED, "token")
                            .resource(row.jti.clone())
                            .metadata(serde_json::json!({ "scopes": tokens.scopes }))
                            .from_addr(meta.ip(), meta.user_agent()),
                    )
                    .await;
            }
            Err(e) => {
                self.audit
                    .record(
                        AuditEvent::by_client(&client.client_id, actions::TOKEN_REFRESHED, "token")
                            .resource(row.jti.clone())
                            .failure(e.to_string())
                            .from_addr(meta.ip(), meta.user_agent()),
                    )
                    .await;
            }
        }
        result
    }

    async fn do_refresh(
        &self,
        client: &Client,
        chain_jti: &str,
        parent_jti: &str,
        user_id: Option<Uuid>,
        granted_scopes: &[String],
        requested_scopes: Option<Vec<String>>,
    ) -> Result<IssuedTokens, OAuthError> {
        // Scope may be narrowed on rotation, never widened.
        let scopes = match requested_scopes {
            Some(requested) if !requested.is_empty() => {
                if !requested.iter().all(|s| granted_scopes.contains(s)) {
                    return Err(OAuthError::InvalidScope(
                        "requested scope exceeds the original grant".to_string(),
                    ));
                }
                requested
            }
            _ => granted_scopes.to_vec(),
        };

        let permissions = match user_id {
            Some(user_id) => Some(self.permission_repo.effective_for_user(user_id).await?),
            None => None,
        };

        let sub = user_id
            .map(|u| u.to_string())
            .unwrap_or_else(|| client.client_id.clone());

        let access_ttl = self.access_ttl(client);
        let (access_token, access_claims) =
            self.codec
                .issue_access(&sub, &client.client_id, &scopes, permissions, access_ttl)?;

        let refresh_ttl = self.refresh_ttl(client);
        let (new_refresh, refresh_claims) =
            self.codec.issue_refresh(&sub, &client.client_id, &scopes, refresh_ttl)?;

        self.refresh_repo
            .create(
                &refresh_claims.jti,
                &hash_token(&new_refresh),
                chain_jti,
                Some(parent_jti),
                user_id,
                client.id,
                &scopes,
                timestamp(refresh_claims.iat),
                timestamp(refresh_claims.exp),
            )
            .await?;
        self.access_repo
            .create(
                &access_claims.jti,
                &hash_token(&access_token),
                user_id,
                client.id,
                &scopes,
                Some(&refresh_claims.jti),
                timestamp(access_claims.iat),
                timestamp(access_claims.exp),
            )
            .await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token: Some(new_refresh),
            id_token: None,
            expires_in: access_ttl,
            scopes,
        })
    }

    /// `grant_type=client_credentials`; public clients are rejected.
    pub async fn client_credentials_grant(
        &self,
        client: &Client,
        requested_scopes: Option<Vec<String>>,
        meta: &RequestMeta,
    ) -> Result<IssuedTokens, OAuthError> {
        let result = self.do_client_credentials(client, requested_scopes).await;
        self.record_grant_outcome(client, "client_credentials", &result, meta).await;
        result
    }

    async fn do_client_credentials(
        &self,
        client: &Client,
        requested_scopes: Option<Vec<String>>,
    ) -> Result<IssuedTokens, OAuthError> {
        if client.is_public() {
            return Err(OAuthError::UnauthorizedClient);
        }
        if !client.allows_grant("client_credentials") {
            return Err(OAuthError::UnauthorizedClient);
        }

        let scopes = match requested_scopes {
            Some(requested) if !requested.is_empty() => {
                if !client.allows_scopes(&requested) {
                    return Err(OAuthError::InvalidScope(
                        "requested scope exceeds the client's allowed scopes".to_string(),
                    ));
                }
                requested
            }
            _ => client.allowed_scopes.clone(),
        };

        let access_ttl = self.access_ttl(client);
        let (access_token, claims) = self.codec.issue_access(
            &client.client_id,
            &client.client_id,
            &scopes,
            None,
            access_ttl,
        )?;

        self.access_repo
            .create(
                &claims.jti,
                &hash_token(&access_token),
                None,
                client.id,
                &scopes,
                None,
                timestamp(claims.iat),
                timestamp(claims.exp),
            )
            .await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token: None,
            id_token: None,
            expires_in: access_ttl,
            scopes,
        })
    }

    /// Shared mint path for user-bound grants: access token with frozen
    /// permissions, fresh refresh chain, optional ID token.
    async fn issue_for_user(
        &self,
        client: &Client,
        user_id: Uuid,
        scopes: &[String],
        permissions: Option<Vec<String>>,
        nonce: Option<&str>,
    ) -> Result<IssuedTokens, OAuthError> {
        let sub = user_id.to_string();
        let access_ttl = self.access_ttl(client);
        let (access_token, access_claims) =
            self.codec
                .issue_access(&sub, &client.client_id, scopes, permissions, access_ttl)?;

        let refresh_ttl = self.refresh_ttl(client);
        let (refresh_token, refresh_claims) =
            self.codec.issue_refresh(&sub, &client.client_id, scopes, refresh_ttl)?;

        // A new grant starts a new rotation chain rooted at this refresh jti.
        self.refresh_repo
            .create(
                &refresh_claims.jti,
                &hash_token(&refresh_token),
                &refresh_claims.jti,
                None,
                Some(user_id),
                client.id,
                scopes,
                timestamp(refresh_claims.iat),
                timestamp(refresh_claims.exp),
            )
            .await?;
        self.access_repo
            .create(
                &access_claims.jti,
                &hash_token(&access_token),
                Some(user_id),
                client.id,
                scopes,
                Some(&refresh_claims.jti),
                timestamp(access_claims.iat),
                timestamp(access_claims.exp),
            )
            .await?;

        let id_token = if scopes.iter().any(|s| s == "openid") {
            let user = self.user_repo.find_by_id(user_id).await?;
            match user {
                Some(user) => Some(self.codec.issue_id_token(
                    user_id,
                    &client.client_id,
                    nonce.map(String::from),
                    scopes.iter().any(|s| s == "email").then(|| user.email.clone()),
                    scopes.iter().any(|s| s == "email").then_some(user.email_verified),
                    scopes
                        .iter()
                        .any(|s| s == "profile")
                        .then(|| user.display_name.clone().unwrap_or(user.username.clone())),
                    access_ttl,
                )?),
                None => None,
            }
        } else {
            None
        };

        Ok(IssuedTokens {
            access_token,
            refresh_token: Some(refresh_token),
            id_token,
            expires_in: access_ttl,
            scopes: scopes.to_vec(),
        })
    }

    async fn record_grant_outcome(
        &self,
        client: &Client,
        grant_type: &str,
        result: &Result<IssuedTokens, OAuthError>,
        meta: &RequestMeta,
    ) {
        let event = AuditEvent::by_client(&client.client_id, actions::TOKEN_ISSUED, "token")
            .resource(client.client_id.clone())
            .from_addr(meta.ip(), meta.user_agent());
        let event = match result {
            Ok(tokens) => event.metadata(serde_json::json!({
                "grant_type": grant_type,
                "scopes": tokens.scopes,
                "refresh_token": tokens.refresh_token.is_some(),
            })),
            Err(e) => event
                .failure(e.to_string())
                .metadata(serde_json::json!({ "grant_type": grant_type })),
        };
        self.audit.record(event).await;
    }

    fn access_ttl(&self, client: &Client) -> i64 {
        if client.access_token_lifetime > 0 {
            client.access_token_lifetime
        } else {
            self.config.access_token_ttl_secs
        }
    }

    fn refresh_ttl(&self, client: &Client) -> i64 {
        if client.refresh_token_lifetime > 0 {
            client.refresh_token_lifetime
        } else {
            self.config.refresh_token_ttl_secs
        }
    }
}

/// PKCE at exchange time: a code carrying a challenge demands a matching
/// verifier; a code without one forbids a verifier.
fn verify_code_pkce(
    auth_code: &AuthorizationCode,
    code_verifier: Option<&str>,
) -> Result<(), OAuthError> {
    match (&auth_code.code_challenge, code_verifier) {
        (Some(challenge), Some(verifier)) => {
            if !validate_code_verifier(verifier) {
                return Err(OAuthError::InvalidGrant("malformed code_verifier".to_string()));
            }
            if !verify_pkce(verifier, challenge) {
                return Err(OAuthError::InvalidGrant(
                    "code_verifier does not match code_challenge".to_string(),
                ));
            }
            Ok(())
        }
        (Some(_), None) => Err(OAuthError::InvalidGrant("code_verifier is required".to_string())),
        (None, Some(_)) => Err(OAuthError::InvalidGrant(
            "code_verifier provided but no challenge was bound to this code".to_string(),
        )),
        (None, None) => Ok(()),
    }
}

fn timestamp(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code_with_challenge(challenge: Option<&str>) -> AuthorizationCode {
        let now = Utc::now();
        AuthorizationCode {
            id: Uuid::new_v4(),
            code_hash: "h".into(),
            client_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            redirect_uri: "https://c.test/cb".into(),
            scopes: vec!["openid".into()],
            nonce: None,
            code_challenge: challenge.map(String::from),
            code_challenge_method: challenge.map(|_| "S256".to_string()),
            expires_at: now + Duration::minutes(10),
            used: false,
            used_at: None,
            created_at: now,
        }
    }

    // RFC 7636 Appendix B vector.
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn matching_verifier_passes() {
        let code = code_with_challenge(Some(CHALLENGE));
        assert!(verify_code_pkce(&code, Some(VERIFIER)).is_ok());
    }

    #[test]
    fn wrong_verifier_fails() {
        let code = code_with_challenge(Some(CHALLENGE));
        let wrong = "a".repeat(50);
        assert!(verify_code_pkce(&code, Some(&wrong)).is_err());
    }

    #[test]
    fn challenge_demands_verifier() {
        let code = code_with_challenge(Some(CHALLENGE));
        assert!(matches!(
            verify_code_pkce(&code, None),
            Err(OAuthError::InvalidGrant(_))
        ));
    }

    #[test]
    fn no_challenge_forbids_verifier() {
        let code = code_with_challenge(None);
        assert!(verify_code_pkce(&code, None).is_ok());
        assert!(verify_code_pkce(&code, Some(VERIFIER)).is_err());
    }

    #[test]
    fn malformed_verifier_rejected_before_hashing() {
        let code = code_with_challenge(Some(CHALLENGE));
        assert!(verify_code_pkce(&code, Some("short")).is_err());
        let with_space = format!("{} ", &"a".repeat(43));
        assert!(verify_code_pkce(&code, Some(&with_space)).is_err());
    }
}
