use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::config::AppState;
use crate::error::ApiError;
use crate::repositories::{AccessTokenRepository, BlacklistRepository};
use crate::utils::keys::KeyError;
use crate::utils::token::TokenClaims;

/// Authenticated principal attached to the request after bearer decoding:
/// the token's user (if any), client, scopes and frozen permissions claim.
#[derive(Clone)]
pub struct AuthContext {
    pub user_id: Option<Uuid>,
    pub client_id: String,
    pub jti: String,
    pub token_iat: i64,
    pub scopes: Vec<String>,
    /// `permissions` claim as minted into the token; authoritative when
    /// present.
    pub permissions_claim: Option<Vec<String>>,
    /// Effective permission set, computed at most once per request.
    pub(crate) effective: Arc<OnceCell<HashSet<String>>>,
}

impl AuthContext {
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.user_id(),
            client_id: claims.client_id.clone(),
            jti: claims.jti.clone(),
            token_iat: claims.iat,
            scopes: claims.scopes(),
            permissions_claim: claims.permissions.clone(),
            effective: Arc::new(OnceCell::new()),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn has_all_scopes(&self, required: &[&str]) -> bool {
        required.iter().all(|r| self.scopes.iter().any(|s| s == r))
    }
}

/// Bearer decoder for the protected JSON surface.
///
/// Verifies signature, audience and expiry through the codec, then checks the
/// jti against the blacklist and the persisted token row. On success the
/// request carries an [`AuthContext`] extension.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&request)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let claims = state.codec.decode_access(token).map_err(|e| match e {
        KeyError::Expired => ApiError::Unauthorized("token expired".to_string()),
        _ => ApiError::Unauthorized("invalid token".to_string()),
    })?;

    let blacklist = BlacklistRepository::new(state.pool.clone());
    if blacklist.contains(&claims.jti).await? {
        return Err(ApiError::Unauthorized("token revoked".to_string()));
    }

    let tokens = AccessTokenRepository::new(state.pool.clone());
    let row = tokens
        .find_by_jti(&claims.jti)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("unknown token".to_string()))?;
    if row.revoked {
        return Err(ApiError::Unauthorized("token revoked".to_string()));
    }

    let ctx = AuthContext::from_claims(&claims);
    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}

fn extract_bearer<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn request_with_auth(value: &str) -> Request<()> {
        Request::builder()
            .uri("/protected")
            .header(AUTHORIZATION, value)
            .body(())
            .unwrap()
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(
            extract_bearer(&request_with_auth("Bearer abc.def.ghi")),
            Some("abc.def.ghi")
        );
        assert_eq!(extract_bearer(&request_with_auth("Bearer ")), None);
        assert_eq!(extract_bearer(&request_with_auth("Basic abc")), None);
        assert_eq!(extract_bearer(&request_with_auth("bearer abc")), None);
        let no_header = Request::builder().uri("/x").body(()).unwrap();
        assert_eq!(extract_bearer(&no_header), None);
    }

    #[test]
    fn context_scope_helpers() {
        let claims = TokenClaims {
            iss: "iss".into(),
            aud: "aud".into(),
            sub: Uuid::new_v4().to_string(),
            iat: 0,
            exp: 0,
            jti: "jti".into(),
            client_id: "web-app".into(),
            scope: "openid profile".into(),
            permissions: Some(vec!["users:read".into()]),
            token_use: "access".into(),
        };
        let ctx = AuthContext::from_claims(&claims);
        assert!(ctx.user_id.is_some());
        assert!(ctx.has_scope("openid"));
        assert!(!ctx.has_scope("email"));
        assert!(ctx.has_all_scopes(&["openid", "profile"]));
        assert!(!ctx.has_all_scopes(&["openid", "email"]));
        assert_eq!(ctx.permissions_claim.as_ref().unwrap().len(), 1);
    }
}
