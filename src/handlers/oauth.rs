//! HTTP handlers for the OAuth2/OIDC endpoints.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{
    AuthorizeRequest, ConsentForm, IntrospectRequest, OpenIdConfiguration, TokenRequest,
    TokenResponse, UserInfoResponse,
};
use crate::error::OAuthError;
use crate::middleware::{AuthContext, RequestMeta};
use crate::repositories::ScopeRepository;
use crate::services::{
    AuthorizeOutcome, AuthorizeReject, AuthorizeService, IntrospectionService, TokenService,
    UserService,
};

/// Resolve the authorize-flow session: a session JWT in the `session_token`
/// cookie or as a bearer token. Issuing that JWT is the login collaborator's
/// job.
fn resolve_session_user(state: &AppState, headers: &HeaderMap) -> Option<Uuid> {
    let token = session_token_from_cookie(headers).or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string())
    })?;
    state
        .codec
        .decode_session(&token)
        .ok()
        .and_then(|claims| claims.user_id())
}

fn session_token_from_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "session_token").then(|| value.to_string())
    })
}

fn reject_to_response(reject: AuthorizeReject) -> Response {
    match reject {
        AuthorizeReject::Direct(error) => error.into_response(),
        AuthorizeReject::Redirect(url) => Redirect::to(&url).into_response(),
    }
}

/// GET /api/v2/oauth/authorize
pub async fn authorize_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    headers: HeaderMap,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let service = AuthorizeService::new(state.pool.clone(), state.config.clone());
    let session_user = resolve_session_user(&state, &headers);
    let params = request.into_params();

    match service.begin(&params, session_user, &meta).await {
        Ok(AuthorizeOutcome::RedirectToLogin(url))
        | Ok(AuthorizeOutcome::RedirectToConsent(url))
        | Ok(AuthorizeOutcome::RedirectWithCode(url)) => Redirect::to(&url).into_response(),
        Err(reject) => reject_to_response(reject),
    }
}

/// POST /api/v2/oauth/authorize/consent — the consent UI posts the user's
/// decision back here.
pub async fn consent_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    headers: HeaderMap,
    Json(form): Json<ConsentForm>,
) -> Response {
    let Some(user_id) = resolve_session_user(&state, &headers) else {
        return OAuthError::InvalidRequest("authentication required".to_string()).into_response();
    };

    let service = AuthorizeService::new(state.pool.clone(), state.config.clone());
    match service.finish_consent(&form.into_decision(), user_id, &meta).await {
        Ok(AuthorizeOutcome::RedirectWithCode(url)) => Redirect::to(&url).into_response(),
        Ok(AuthorizeOutcome::RedirectToLogin(url))
        | Ok(AuthorizeOutcome::RedirectToConsent(url)) => Redirect::to(&url).into_response(),
        Err(reject) => reject_to_response(reject),
    }
}

/// POST /api/v2/oauth/token — the grant dispatcher.
pub async fn token_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    headers: HeaderMap,
    Form(form): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let client = state
        .client_auth
        .authenticate(&headers, &form.credentials())
        .await?;

    let service = TokenService::new(state.pool.clone(), state.codec.clone(), state.config.clone());

    let tokens = match form.grant_type.as_str() {
        "authorization_code" => {
            let code = form
                .code
                .as_deref()
                .ok_or_else(|| OAuthError::InvalidRequest("code is required".to_string()))?;
            let redirect_uri = form.redirect_uri.as_deref().ok_or_else(|| {
                OAuthError::InvalidRequest("redirect_uri is required".to_string())
            })?;
            service
                .exchange_authorization_code(
                    &client,
                    code,
                    redirect_uri,
                    form.code_verifier.as_deref(),
                    &meta,
                )
                .await?
        }
        "refresh_token" => {
            let refresh_token = form.refresh_token.as_deref().ok_or_else(|| {
                OAuthError::InvalidRequest("refresh_token is required".to_string())
            })?;
            service
                .refresh_grant(&client, refresh_token, form.scopes(), &meta)
                .await?
        }
        "client_credentials" => {
            service
                .client_credentials_grant(&client, form.scopes(), &meta)
                .await?
        }
        _ => return Err(OAuthError::UnsupportedGrantType),
    };

    Ok(Json(TokenResponse::from(tokens)))
}

/// POST /api/v2/oauth/introspect (RFC 7662)
pub async fn introspect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<IntrospectRequest>,
) -> Result<Json<crate::services::IntrospectionResponse>, OAuthError> {
    state
        .client_auth
        .authenticate(&headers, &form.credentials())
        .await?;

    let service = IntrospectionService::new(state.pool.clone(), state.codec.clone());
    let response = service
        .introspect(&form.token, form.token_type_hint.as_deref())
        .await?;
    Ok(Json(response))
}

/// POST /api/v2/oauth/revoke (RFC 7009) — 200 whatever the token was.
pub async fn revoke_handler(
    State(state): State<AppState>,
    meta: RequestMeta,
    headers: HeaderMap,
    Form(form): Form<IntrospectRequest>,
) -> Result<Json<serde_json::Value>, OAuthError> {
    let client = state
        .client_auth
        .authenticate(&headers, &form.credentials())
        .await?;

    let service = IntrospectionService::new(state.pool.clone(), state.codec.clone());
    service
        .revoke(&client, &form.token, form.token_type_hint.as_deref(), &meta)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// GET/POST /api/v2/oauth/userinfo — requires the `openid` scope.
pub async fn userinfo_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<UserInfoResponse>, OAuthError> {
    if !ctx.has_scope("openid") {
        return Err(OAuthError::InsufficientScope);
    }
    let Some(user_id) = ctx.user_id else {
        return Err(OAuthError::InvalidRequest(
            "token is not bound to a user".to_string(),
        ));
    };

    let users = UserService::new(state.pool.clone(), Default::default());
    let user = users
        .get(user_id)
        .await
        .map_err(|_| OAuthError::InvalidRequest("unknown user".to_string()))?;

    let profile = ctx.has_scope("profile");
    let email = ctx.has_scope("email");
    Ok(Json(UserInfoResponse {
        sub: user.id.to_string(),
        preferred_username: profile.then(|| user.username.clone()),
        name: profile.then(|| user.display_name.clone().unwrap_or(user.username.clone())),
        email: email.then(|| user.email.clone()),
        email_verified: email.then_some(user.email_verified),
    }))
}

/// GET /.well-known/jwks.json
pub async fn jwks_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.keys.public_jwks())
}

/// GET /.well-known/openid-configuration
pub async fn openid_configuration_handler(
    State(state): State<AppState>,
) -> Result<Json<OpenIdConfiguration>, OAuthError> {
    let scope_repo = ScopeRepository::new(state.pool.clone());
    let scopes = scope_repo
        .list()
        .await?
        .into_iter()
        .map(|s| s.name)
        .collect();
    Ok(Json(OpenIdConfiguration::new(
        &state.config.jwt_issuer,
        &state.config.public_base_url,
        scopes,
        &state.config.jwt_algorithm,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; session_token=abc.def.ghi; lang=en"),
        );
        assert_eq!(
            session_token_from_cookie(&headers),
            Some("abc.def.ghi".to_string())
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark"),
        );
        assert_eq!(session_token_from_cookie(&headers), None);
    }
}
