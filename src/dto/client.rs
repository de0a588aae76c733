use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Client, ClientType, TokenEndpointAuthMethod};
use crate::services::{ClientCreateParams, ClientUpdateParams};

/// POST /clients body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClientRequest {
    pub client_id: Option<String>,
    pub client_name: String,
    pub client_type: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: Option<String>,
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

impl CreateClientRequest {
    pub fn into_params(self) -> Result<ClientCreateParams, ApiError> {
        let client_type = ClientType::parse(&self.client_type)
            .ok_or_else(|| ApiError::Validation("client_type must be 'public' or 'confidential'".to_string()))?;
        let default_method = match client_type {
            ClientType::Public => TokenEndpointAuthMethod::None,
            ClientType::Confidential => TokenEndpointAuthMethod::ClientSecretBasic,
        };
        let token_endpoint_auth_method = match self.token_endpoint_auth_method.as_deref() {
            Some(raw) => TokenEndpointAuthMethod::parse(raw).ok_or_else(|| {
                ApiError::Validation(format!("unknown token_endpoint_auth_method: {}", raw))
            })?,
            None => default_method,
        };
        Ok(ClientCreateParams {
            client_id: self.client_id,
            client_name: self.client_name,
            client_type,
            redirect_uris: self.redirect_uris,
            allowed_scopes: self.allowed_scopes,
            grant_types: self.grant_types,
            response_types: self.response_types,
            token_endpoint_auth_method,
            jwks_uri: self.jwks_uri,
            require_pkce: self.require_pkce,
            require_consent: self.require_consent,
            strict_redirect_uri_matching: self.strict_redirect_uri_matching,
            allow_localhost_redirect: self.allow_localhost_redirect,
            require_https_redirect: self.require_https_redirect,
            access_token_lifetime: self.access_token_lifetime,
            refresh_token_lifetime: self.refresh_token_lifetime,
            code_lifetime: self.code_lifetime,
        })
    }
}

/// PUT /clients/{id} body; absent fields stay untouched. `jwks_uri` uses an
/// explicit null to clear.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateClientRequest {
    pub client_name: Option<String>,
    pub client_type: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub allowed_scopes: Option<Vec<String>>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    pub token_endpoint_auth_method: Option<String>,
    /// Missing = keep, null = clear, string = set.
    #[serde(default)]
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
    #[serde(default)]
    pub regenerate_secret: bool,
}

/// Response for client creation and secret rotation; `client_secret` appears
/// exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct ClientWithSecret {
    #[serde(flatten)]
    pub client: Client,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl UpdateClientRequest {
    pub fn into_params(self) -> Result<ClientUpdateParams, ApiError> {
        let client_type = match self.client_type.as_deref() {
            Some(raw) => Some(ClientType::parse(raw).ok_or_else(|| {
                ApiError::Validation("client_type must be 'public' or 'confidential'".to_string())
            })?),
            None => None,
        };
        let token_endpoint_auth_method = match self.token_endpoint_auth_method.as_deref() {
            Some(raw) => Some(TokenEndpointAuthMethod::parse(raw).ok_or_else(|| {
                ApiError::Validation(format!("unknown token_endpoint_auth_method: {}", raw))
            })?),
            None => None,
        };
        Ok(ClientUpdateParams {
            client_name: self.client_name,
            client_type,
            redirect_uris: self.redirect_uris,
            allowed_scopes: self.allowed_scopes,
            grant_types: self.grant_types,
            response_types: self.response_types,
            token_endpoint_auth_method,
            jwks_uri: self.jwks_uri,
            require_pkce: self.require_pkce,
            require_consent: self.require_consent,
            strict_redirect_uri_matching: self.strict_redirect_uri_matching,
            allow_localhost_redirect: self.allow_localhost_redirect,
            require_https_redirect: self.require_https_redirect,
            access_token_lifetime: self.access_token_lifetime,
            refresh_token_lifetime: self.refresh_token_lifetime,
            code_lifetime: self.code_lifetime,
            is_active: self.is_active,
            regenerate_secret: self.regenerate_secret,
        })
    }
}
