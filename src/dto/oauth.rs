//! Request/response shapes for the OAuth2/OIDC endpoints, RFC 6749/7009/7662
//! field names on the wire.

use serde::{Deserialize, Serialize};

use crate::services::{AuthorizeParams, ConsentDecision, IssuedTokens, PresentedCredentials};

fn split_scope(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

/// GET /oauth/authorize query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub prompt: Option<String>,
}

impl AuthorizeRequest {
    pub fn into_params(self) -> AuthorizeParams {
        AuthorizeParams {
            response_type: self.response_type,
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
            scopes: split_scope(self.scope.as_deref()),
            state: self.state,
            nonce: self.nonce,
            code_challenge: self.code_challenge,
            code_challenge_method: self.code_challenge_method,
            prompt: self.prompt,
        }
    }
}

/// POST /oauth/authorize/consent body: the consent UI's verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentForm {
    pub approved: bool,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

impl ConsentForm {
    pub fn into_decision(self) -> ConsentDecision {
        ConsentDecision {
            approved: self.approved,
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
            scopes: split_scope(self.scope.as_deref()),
            state: self.state,
            nonce: self.nonce,
            code_challenge: self.code_challenge,
            code_challenge_method: self.code_challenge_method,
        }
    }
}

/// POST /oauth/token form body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub client_assertion: Option<String>,
    pub client_assertion_type: Option<String>,
}

impl TokenRequest {
    pub fn scopes(&self) -> Option<Vec<String>> {
        self.scope.as_deref().map(|s| split_scope(Some(s)))
    }

    pub fn credentials(&self) -> PresentedCredentials {
        PresentedCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            client_assertion: self.client_assertion.clone(),
            client_assertion_type: self.client_assertion_type.clone(),
        }
    }
}

/// POST /oauth/token success body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(tokens: IssuedTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token: tokens.refresh_token,
            scope: tokens.scopes.join(" "),
            id_token: tokens.id_token,
        }
    }
}

/// POST /oauth/introspect and /oauth/revoke form bodies.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub client_assertion: Option<String>,
    pub client_assertion_type: Option<String>,
}

impl IntrospectRequest {
    pub fn credentials(&self) -> PresentedCredentials {
        PresentedCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            client_assertion: self.client_assertion.clone(),
            client_assertion_type: self.client_assertion_type.clone(),
        }
    }
}

/// GET /oauth/userinfo response, fields gated by scope.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

/// GET /.well-known/openid-configuration document.
#[derive(Debug, Clone, Serialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl OpenIdConfiguration {
    pub fn new(issuer: &str, base_url: &str, scopes: Vec<String>, algorithm: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{}/api/v2/oauth/authorize", base_url),
            token_endpoint: format!("{}/api/v2/oauth/token", base_url),
            userinfo_endpoint: format!("{}/api/v2/oauth/userinfo", base_url),
            introspection_endpoint: format!("{}/api/v2/oauth/introspect", base_url),
            revocation_endpoint: format!("{}/api/v2/oauth/revoke", base_url),
            jwks_uri: format!("{}/.well-known/jwks.json", base_url),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
                "client_credentials".to_string(),
            ],
            scopes_supported: scopes,
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_string(),
                "client_secret_post".to_string(),
                "private_key_jwt".to_string(),
                "none".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string()],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec![algorithm.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_splitting() {
        let request = TokenRequest {
            grant_type: "client_credentials".into(),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            refresh_token: None,
            scope: Some("api:read  api:write".into()),
            client_id: None,
            client_secret: None,
            client_assertion: None,
            client_assertion_type: None,
        };
        assert_eq!(
            request.scopes(),
            Some(vec!["api:read".to_string(), "api:write".to_string()])
        );
    }

    #[test]
    fn token_response_omits_absent_fields() {
        let response = TokenResponse::from(IssuedTokens {
            access_token: "jwt".into(),
            refresh_token: None,
            id_token: None,
            expires_in: 3600,
            scopes: vec!["api".into()],
        });
        let json = serde_json::to_value(response).unwrap();
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("id_token").is_none());
        assert_eq!(json["token_type"], "Bearer");
    }

    #[test]
    fn authorize_request_parses_scope_list() {
        let request = AuthorizeRequest {
            response_type: "code".into(),
            client_id: "web-app".into(),
            redirect_uri: "https://c.test/cb".into(),
            scope: Some("openid profile".into()),
            state: Some("xyz".into()),
            nonce: None,
            code_challenge: None,
            code_challenge_method: None,
            prompt: None,
        };
        let params = request.into_params();
        assert_eq!(params.scopes, vec!["openid", "profile"]);
        assert_eq!(params.state.as_deref(), Some("xyz"));
    }
}
