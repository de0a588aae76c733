//! Client authentication for the OAuth endpoints.
//!
//! Supports `client_secret_basic`, `client_secret_post`, `private_key_jwt`
//! (with remote JWKS fetch, process-wide cache and replay protection) and
//! `none` for public clients. The method actually presented must match the
//! client's registered `token_endpoint_auth_method`.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{TimeZone, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::OAuthError;
use crate::models::{blacklist_type, Client, TokenEndpointAuthMethod};
use crate::repositories::{BlacklistRepository, ClientRepository};
use crate::utils::secret::verify_client_secret;

pub const ASSERTION_TYPE_JWT_BEARER: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Client credentials as presented on a request, before method resolution.
#[derive(Debug, Clone, Default)]
pub struct PresentedCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub client_assertion: Option<String>,
    pub client_assertion_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssertionClaims {
    iss: String,
    sub: String,
    exp: i64,
    #[serde(default)]
    jti: Option<String>,
}

struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Resolves and verifies the client on every protected OAuth endpoint.
///
/// Holds the process-wide JWKS cache; construct once and clone.
#[derive(Clone)]
pub struct ClientAuthenticator {
    client_repo: ClientRepository,
    blacklist_repo: BlacklistRepository,
    http: reqwest::Client,
    token_endpoint_url: String,
    jwks_cache: Arc<RwLock<HashMap<String, CachedJwks>>>,
    cache_ttl: Duration,
}

impl ClientAuthenticator {
    pub fn new(
        pool: MySqlPool,
        token_endpoint_url: String,
        fetch_timeout_secs: u64,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            client_repo: ClientRepository::new(pool.clone()),
            blacklist_repo: BlacklistRepository::new(pool),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(fetch_timeout_secs))
                .build()
                .expect("failed to build HTTP client"),
            token_endpoint_url,
            jwks_cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
        }
    }

    /// Authenticate the client presented on a request. Every mismatch is the
    /// same `invalid_client` to the caller.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        presented: &PresentedCredentials,
    ) -> Result<Client, OAuthError> {
        // HTTP Basic wins over body parameters when both are present.
        if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            if let Some(basic) = value.strip_prefix("Basic ") {
                let (client_id, client_secret) =
                    parse_basic_credentials(basic).ok_or(OAuthError::InvalidClient)?;
                return self
                    .verify_secret_auth(
                        &client_id,
                        &client_secret,
                        TokenEndpointAuthMethod::ClientSecretBasic,
                    )
                    .await;
            }
        }

        if let Some(assertion) = &presented.client_assertion {
            if presented.client_assertion_type.as_deref() != Some(ASSERTION_TYPE_JWT_BEARER) {
                return Err(OAuthError::InvalidRequest(
                    "unsupported client_assertion_type".to_string(),
                ));
            }
            return self
                .verify_private_key_jwt(assertion, presented.client_id.as_deref())
                .await;
        }

        if let (Some(client_id), Some(client_secret)) =
            (&presented.client_id, &presented.client_secret)
        {
            return self
                .verify_secret_auth(
                    client_id,
                    client_secret,
                    TokenEndpointAuthMethod::ClientSecretPost,
                )
                .await;
        }

        // No secret material at all: only public clients may proceed.
        if let Some(client_id) = &presented.client_id {
            let client = self.load_active(client_id).await?;
            if client.token_endpoint_auth_method != TokenEndpointAuthMethod::None
                || !client.is_public()
            {
                return Err(OAuthError::InvalidClient);
            }
            return Ok(client);
        }

        Err(OAuthError::InvalidClient)
    }

    async fn load_active(&self, client_id: &str) -> Result<Client, OAuthError> {
        self.client_repo
            .find_active_by_client_id(client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)
    }

    async fn verify_secret_auth(
        &self,
        client_id: &str,
        client_secret: &str,
        method: TokenEndpointAuthMethod,
    ) -> Result<Client, OAuthError> {
        let client = self.load_active(client_id).await?;
        if client.token_endpoint_auth_method != method {
            return Err(OAuthError::InvalidClient);
        }
        let hash = client
            .client_secret_hash
            .as_deref()
            .ok_or(OAuthError::InvalidClient)?;
        if !verify_client_secret(client_secret, hash) {
            return Err(OAuthError::InvalidClient);
        }
        Ok(client)
    }

    /// RFC 7523 client assertion: signature against the client's JWKS,
    /// `iss` = `sub` = client_id, `aud` = this token endpoint, unexpired,
    /// jti replay-protected through the blacklist.
    async fn verify_private_key_jwt(
        &self,
        assertion: &str,
        body_client_id: Option<&str>,
    ) -> Result<Client, OAuthError> {
        let header = decode_header(assertion).map_err(|_| OAuthError::InvalidClient)?;
        if !matches!(header.alg, Algorithm::RS256 | Algorithm::ES256 | Algorithm::PS256) {
            return Err(OAuthError::InvalidClient);
        }

        let client_id = match body_client_id {
            Some(id) => id.to_string(),
            None => unverified_issuer(assertion).ok_or(OAuthError::InvalidClient)?,
        };
        let client = self.load_active(&client_id).await?;
        if client.token_endpoint_auth_method != TokenEndpointAuthMethod::PrivateKeyJwt {
            return Err(OAuthError::InvalidClient);
        }
        let jwks_uri = client.jwks_uri.as_deref().ok_or(OAuthError::InvalidClient)?;

        let jwks = self.fetch_jwks(jwks_uri).await?;
        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.token_endpoint_url]);
        validation.validate_exp = true;

        let claims = self
            .decode_against_jwks(assertion, &jwks, header.kid.as_deref(), &validation)
            .ok_or(OAuthError::InvalidClient)?;

        if claims.iss != client.client_id || claims.sub != client.client_id {
            return Err(OAuthError::InvalidClient);
        }

        // A jti may only ever be presented once.
        if let Some(jti) = &claims.jti {
            let expires_at = Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or_else(Utc::now);
            let fresh = self
                .blacklist_repo
                .insert_if_absent(jti, blacklist_type::CLIENT_ASSERTION, expires_at)
                .await?;
            if !fresh {
                return Err(OAuthError::InvalidClient);
            }
        }

        Ok(client)
    }

    fn decode_against_jwks(
        &self,
        assertion: &str,
        jwks: &JwkSet,
        kid: Option<&str>,
        validation: &Validation,
    ) -> Option<AssertionClaims> {
        let candidates: Vec<&jsonwebtoken::jwk::Jwk> = match kid {
            Some(kid) => jwks
                .keys
                .iter()
                .filter(|k| k.common.key_id.as_deref() == Some(kid))
                .collect(),
            None => jwks.keys.iter().collect(),
        };
        for jwk in candidates {
            let Ok(key) = DecodingKey::from_jwk(jwk) else {
                continue;
            };
            if let Ok(data) = decode::<AssertionClaims>(assertion, &key, validation) {
                return Some(data.claims);
            }
        }
        None
    }

    /// Fetch a client's JWKS, served from the process-wide cache within its
    /// TTL. Fetches carry the configured network timeout.
    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<JwkSet, OAuthError> {
        {
            let cache = self.jwks_cache.read().await;
            if let Some(entry) = cache.get(jwks_uri) {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        let response = self.http.get(jwks_uri).send().await.map_err(|e| {
            tracing::warn!(jwks_uri = jwks_uri, error = %e, "JWKS fetch failed");
            OAuthError::InvalidClient
        })?;
        if !response.status().is_success() {
            tracing::warn!(jwks_uri = jwks_uri, status = %response.status(), "JWKS endpoint error");
            return Err(OAuthError::InvalidClient);
        }
        let jwks: JwkSet = response.json().await.map_err(|e| {
            tracing::warn!(jwks_uri = jwks_uri, error = %e, "JWKS parse failed");
            OAuthError::InvalidClient
        })?;

        let mut cache = self.jwks_cache.write().await;
        cache.insert(
            jwks_uri.to_string(),
            CachedJwks {
                jwks: jwks.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(jwks)
    }
}

/// Decode the credentials of an HTTP Basic header value (the part after
/// "Basic "). Both halves are percent-encoded per RFC 6749 §2.3.1.
fn parse_basic_credentials(encoded: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    let id = urlencoding::decode(id).ok()?.into_owned();
    let secret = urlencoding::decode(secret).ok()?.into_owned();
    Some((id, secret))
}

/// Read `iss` out of a JWT payload without verifying the signature; used only
/// to locate the client record, never to trust the assertion.
fn unverified_issuer(assertion: &str) -> Option<String> {
    let payload = assertion.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("iss")?.as_str().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_credentials_roundtrip() {
        let encoded = STANDARD.encode("web-app:s3cret");
        assert_eq!(
            parse_basic_credentials(&encoded),
            Some(("web-app".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn basic_credentials_are_percent_decoded() {
        let encoded = STANDARD.encode("web%2Bapp:p%40ss");
        assert_eq!(
            parse_basic_credentials(&encoded),
            Some(("web+app".to_string(), "p@ss".to_string()))
        );
    }

    #[test]
    fn basic_credentials_reject_garbage() {
        assert_eq!(parse_basic_credentials("!!!not-base64!!!"), None);
        let no_colon = STANDARD.encode("just-an-id");
        assert_eq!(parse_basic_credentials(&no_colon), None);
    }

    #[test]
    fn unverified_issuer_reads_payload() {
        // header/payload/signature; only the payload matters here.
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"iss":"svc-client","sub":"svc-client"}"#);
        let token = format!("eyJhbGciOiJSUzI1NiJ9.{}.sig", payload);
        assert_eq!(unverified_issuer(&token), Some("svc-client".to_string()));
        assert_eq!(unverified_issuer("only-one-part"), None);
    }
}
