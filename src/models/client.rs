use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Public,
    Confidential,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Public => "public",
            ClientType::Confidential => "confidential",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(ClientType::Public),
            "confidential" => Some(ClientType::Confidential),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    ClientSecretBasic,
    ClientSecretPost,
    PrivateKeyJwt,
    None,
}

impl TokenEndpointAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenEndpointAuthMethod::ClientSecretBasic => "client_secret_basic",
            TokenEndpointAuthMethod::ClientSecretPost => "client_secret_post",
            TokenEndpointAuthMethod::PrivateKeyJwt => "private_key_jwt",
            TokenEndpointAuthMethod::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client_secret_basic" => Some(TokenEndpointAuthMethod::ClientSecretBasic),
            "client_secret_post" => Some(TokenEndpointAuthMethod::ClientSecretPost),
            "private_key_jwt" => Some(TokenEndpointAuthMethod::PrivateKeyJwt),
            "none" => Some(TokenEndpointAuthMethod::None),
            _ => None,
        }
    }

    pub fn uses_secret(&self) -> bool {
        matches!(
            self,
            TokenEndpointAuthMethod::ClientSecretBasic | TokenEndpointAuthMethod::ClientSecretPost
        )
    }
}

/// A registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
    pub client_name: String,
    pub client_type: ClientType,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    pub jwks_uri: Option<String>,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub strict_redirect_uri_matching: bool,
    pub allow_localhost_redirect: bool,
    pub require_https_redirect: bool,
    pub access_token_lifetime: i64,
    pub refresh_token_lifetime: i64,
    pub code_lifetime: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub id: String,
    pub client_id: String,
    pub client_secret_hash: Option<String>,
    pub client_name: String,
    pub client_type: String,
    pub redirect_uris: serde_json::Value,
    pub allowed_scopes: serde_json::Value,
    pub grant_types: serde_json::Value,
    pub response_types: serde_json::Value,
    pub token_endpoint_auth_method: String,
    pub jwks_uri: Option<String>,
    pub require_pkce: bool,
    pub require_consent: bool,
    pub strict_redirect_uri_matching: bool,
    pub allow_localhost_redirect: bool,
    pub require_https_redirect: bool,
    pub access_token_lifetime: i64,
    pub refresh_token_lifetime: i64,
    pub code_lifetime: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn string_array(value: serde_json::Value) -> Vec<String> {
    serde_json::from_value(value).unwrap_or_default()
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            client_id: row.client_id,
            client_secret_hash: row.client_secret_hash,
            client_name: row.client_name,
            client_type: ClientType::parse(&row.client_type).unwrap_or(ClientType::Confidential),
            redirect_uris: string_array(row.redirect_uris),
            allowed_scopes: string_array(row.allowed_scopes),
            grant_types: string_array(row.grant_types),
            response_types: string_array(row.response_types),
            token_endpoint_auth_method: TokenEndpointAuthMethod::parse(
                &row.token_endpoint_auth_method,
            )
            .unwrap_or(TokenEndpointAuthMethod::ClientSecretBasic),
            jwks_uri: row.jwks_uri,
            require_pkce: row.require_pkce,
            require_consent: row.require_consent,
            strict_redirect_uri_matching: row.strict_redirect_uri_matching,
            allow_localhost_redirect: row.allow_localhost_redirect,
            require_https_redirect: row.require_https_redirect,
            access_token_lifetime: row.access_token_lifetime,
            refresh_token_lifetime: row.refresh_token_lifetime,
            code_lifetime: row.code_lifetime,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for Client {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Client::from(ClientRow::from_row(row)?))
    }
}

impl Client {
    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }

    pub fn allows_grant(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    pub fn allows_response_type(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|r| r == response_type)
    }

    pub fn allows_scopes(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.allowed_scopes.contains(s))
    }

    /// PKCE is mandatory for public clients and for confidential clients that
    /// opted in.
    pub fn pkce_required(&self) -> bool {
        self.is_public() || self.require_pkce
    }

    /// Exact, case-sensitive redirect URI matching. Fragments never match.
    /// When `strict_redirect_uri_matching` is off, a registered loopback URI
    /// also matches the same URI on any port (RFC 8252 §7.3 behavior for
    /// native apps).
    pub fn redirect_uri_matches(&self, uri: &str) -> bool {
        if uri.contains('#') {
            return false;
        }
        if self.redirect_uris.iter().any(|u| u == uri) {
            return true;
        }
        if !self.strict_redirect_uri_matching && is_loopback_uri(uri) {
            return self
                .redirect_uris
                .iter()
                .any(|registered| loopback_matches_ignoring_port(registered, uri));
        }
        false
    }

    /// Registration-time scheme policy for one redirect URI.
    pub fn redirect_uri_allowed_by_policy(&self, uri: &str) -> bool {
        if uri.contains('#') {
            return false;
        }
        if !self.require_https_redirect {
            return true;
        }
        if uri.starts_with("https://") {
            return true;
        }
        self.allow_localhost_redirect && is_loopback_uri(uri)
    }
}

pub fn is_loopback_uri(uri: &str) -> bool {
    let rest = uri
        .strip_prefix("http://")
        .or_else(|| uri.strip_prefix("https://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?']).next().unwrap_or("");
            let host = host.split(':').next().unwrap_or("");
            host == "localhost" || host == "127.0.0.1" || host == "[::1]"
        }
        None => false,
    }
}

fn loopback_matches_ignoring_port(registered: &str, presented: &str) -> bool {
    strip_loopback_port(registered) == strip_loopback_port(presented)
}

fn strip_loopback_port(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let host = authority.split(':').next().unwrap_or(authority);
    format!("{}://{}{}", scheme, host, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        let now = Utc::now();
        Client {
            id: Uuid::new_v4(),
            client_id: "web-app".into(),
            client_secret_hash: Some("$2b$12$hash".into()),
            client_name: "Web App".into(),
            client_type: ClientType::Confidential,
            redirect_uris: vec!["https://c.test/cb".into()],
            allowed_scopes: vec!["openid".into(), "profile".into()],
            grant_types: vec!["authorization_code".into(), "refresh_token".into()],
            response_types: vec!["code".into()],
            token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
            jwks_uri: None,
            require_pkce: true,
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

    #[test]
    fn redirect_match_is_exact() {
        let c = client();
        assert!(c.redirect_uri_matches("https://c.test/cb"));
        assert!(!c.redirect_uri_matches("https://c.test/cb/"));
        assert!(!c.redirect_uri_matches("https://c.test/CB"));
        assert!(!c.redirect_uri_matches("https://c.test/cb?x=1"));
        assert!(!c.redirect_uri_matches("https://c.test/other"));
    }

    #[test]
    fn fragments_never_match() {
        let mut c = client();
        c.redirect_uris = vec!["https://c.test/cb#frag".into()];
        assert!(!c.redirect_uri_matches("https://c.test/cb#frag"));
    }

    #[test]
    fn loopback_port_relaxation_requires_non_strict() {
        let mut c = client();
        c.redirect_uris = vec!["http://127.0.0.1:8000/cb".into()];
        assert!(!c.redirect_uri_matches("http://127.0.0.1:9000/cb"));
        c.strict_redirect_uri_matching = false;
        assert!(c.redirect_uri_matches("http://127.0.0.1:9000/cb"));
        assert!(!c.redirect_uri_matches("http://evil.test:9000/cb"));
    }

    #[test]
    fn https_policy_with_localhost_escape_hatch() {
        let mut c = client();
        assert!(c.redirect_uri_allowed_by_policy("https://c.test/cb"));
        assert!(!c.redirect_uri_allowed_by_policy("http://c.test/cb"));
        assert!(!c.redirect_uri_allowed_by_policy("http://localhost:3000/cb"));
        c.allow_localhost_redirect = true;
        assert!(c.redirect_uri_allowed_by_policy("http://localhost:3000/cb"));
        assert!(c.redirect_uri_allowed_by_policy("http://127.0.0.1/cb"));
        assert!(!c.redirect_uri_allowed_by_policy("http://c.test/cb"));
    }

    #[test]
    fn pkce_mandatory_for_public_clients() {
        let mut c = client();
        c.require_pkce = false;
        assert!(!c.pkce_required());
        c.client_type = ClientType::Public;
        assert!(c.pkce_required());
    }

    #[test]
    fn scope_subset_check() {
        let c = client();
        assert!(c.allows_scopes(&["openid".into()]));
        assert!(c.allows_scopes(&["openid".into(), "profile".into()]));
        assert!(!c.allows_scopes(&["openid".into(), "admin".into()]));
    }

    #[test]
    fn secret_hash_is_never_serialized() {
        let json = serde_json::to_value(client()).unwrap();
        assert!(json.get("client_secret_hash").is_none());
    }

    #[test]
    fn auth_method_parse_roundtrip() {
        for m in [
            TokenEndpointAuthMethod::ClientSecretBasic,
            TokenEndpointAuthMethod::ClientSecretPost,
            TokenEndpointAuthMethod::PrivateKeyJwt,
            TokenEndpointAuthMethod::None,
        ] {
            assert_eq!(TokenEndpointAuthMethod::parse(m.as_str()), Some(m));
        }
        assert_eq!(TokenEndpointAuthMethod::parse("tls_client_auth"), None);
    }
}
