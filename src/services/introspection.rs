//! RFC 7662 introspection and RFC 7009 revocation, plus self-service session
//! revocation. Inactive tokens always introspect as exactly `{"active":false}`.

use chrono::Utc;
use serde::Serialize;
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::{ApiError, OAuthError};
use crate::middleware::RequestMeta;
use crate::models::{actions, blacklist_type, Client};
use crate::repositories::{
    AccessTokenRepository, BlacklistRepository, RefreshTokenRepository, UserRepository,
};
use crate::services::audit::{AuditEvent, AuditService};
use crate::utils::secret::hash_token;
use crate::utils::token::{TokenCodec, TOKEN_USE_ACCESS, TOKEN_USE_REFRESH};

/// RFC 7662 response. Everything except `active` is omitted for inactive
/// tokens so nothing leaks about unknown or revoked credentials.
#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            sub: None,
            aud: None,
            iss: None,
            exp: None,
            iat: None,
            jti: None,
            token_type: None,
            username: None,
            user_id: None,
            permissions: None,
        }
    }
}

/// Introspection, revocation and session management over the token stores.
#[derive(Clone)]
pub struct IntrospectionService {
    access_repo: AccessTokenRepository,
    refresh_repo: RefreshTokenRepository,
    blacklist_repo: BlacklistRepository,
    user_repo: UserRepository,
    audit: AuditService,
    codec: TokenCodec,
}

impl IntrospectionService {
    pub fn new(pool: MySqlPool, codec: TokenCodec) -> Self {
        Self {
            access_repo: AccessTokenRepository::new(pool.clone()),
            refresh_repo: RefreshTokenRepository::new(pool.clone()),
            blacklist_repo: BlacklistRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            audit: AuditService::new(pool),
            codec,
        }
    }

    /// RFC 7662. The hint orders the lookups; a wrong hint only costs a
    /// second attempt.
    pub async fn introspect(
        &self,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> Result<IntrospectionResponse, OAuthError> {
        let refresh_first = token_type_hint == Some("refresh_token");

        if refresh_first {
            if let Some(response) = self.try_refresh(token).await? {
                return Ok(response);
            }
            if let Some(response) = self.try_access(token).await? {
                return Ok(response);
            }
        } else {
            if let Some(response) = self.try_access(token).await? {
                return Ok(response);
            }
            if let Some(response) = self.try_refresh(token).await? {
                return Ok(response);
            }
        }
        Ok(IntrospectionResponse::inactive())
    }

    async fn try_access(&self, token: &str) -> Result<Option<IntrospectionResponse>, OAuthError> {
        // Signature and shape first; a forged token never reaches the store.
        let Ok(claims) = self.codec.decode_for_introspection(token, TOKEN_USE_ACCESS) else {
            return Ok(None);
        };
        if claims.exp <= Utc::now().timestamp() {
            return Ok(None);
        }
        if self.blacklist_repo.contains(&claims.jti).await? {
            return Ok(None);
        }
        let Some(row) = self.access_repo.find_by_hash(&hash_token(token)).await? else {
            return Ok(None);
        };
        if !row.is_active(Utc::now()) {
            return Ok(None);
        }

        let username = match row.user_id {
            Some(user_id) => self
                .user_repo
                .find_by_id(user_id)
                .await?
                .map(|u| u.username),
            None => None,
        };

        Ok(Some(IntrospectionResponse {
            active: true,
            scope: Some(claims.scope.clone()),
            client_id: Some(claims.client_id.clone()),
            sub: Some(claims.sub.clone()),
            aud: Some(claims.aud.clone()),
            iss: Some(claims.iss.clone()),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            jti: Some(claims.jti.clone()),
            token_type: Some("Bearer".to_string()),
            username,
            user_id: row.user_id.map(|u| u.to_string()),
            permissions: claims.permissions,
        }))
    }

    async fn try_refresh(&self, token: &str) -> Result<Option<IntrospectionResponse>, OAuthError> {
        let Ok(claims) = self.codec.decode_for_introspection(token, TOKEN_USE_REFRESH) else {
            return Ok(None);
        };
        if claims.exp <= Utc::now().timestamp() {
            return Ok(None);
        }
        if self.blacklist_repo.contains(&claims.jti).await? {
            return Ok(None);
        }
        let Some(row) = self.refresh_repo.find_by_hash(&hash_token(token)).await? else {
            return Ok(None);
        };
        if !row.is_active(Utc::now()) {
            return Ok(None);
        }

        Ok(Some(IntrospectionResponse {
            active: true,
            scope: Some(claims.scope.clone()),
            client_id: Some(claims.client_id.clone()),
            sub: Some(claims.sub.clone()),
            aud: Some(claims.aud.clone()),
            iss: Some(claims.iss.clone()),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            jti: Some(claims.jti.clone()),
            token_type: Some("refresh_token".to_string()),
            username: None,
            user_id: row.user_id.map(|u| u.to_string()),
            permissions: None,
        }))
    }

    /// RFC 7009. Always succeeds, including for unknown tokens and tokens
    /// belonging to other clients; a second revocation is a no-op.
    pub async fn revoke(
        &self,
        client: &Client,
        token: &str,
        token_type_hint: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<(), OAuthError> {
        let token_hash = hash_token(token);
        let refresh_first = token_type_hint == Some("refresh_token");

        let outcome = if refresh_first {
            match self.revoke_refresh(client, &token_hash).await? {
                Some(o) => Some(o),
                None => self.revoke_access(client, &token_hash).await?,
            }
        } else {
            match self.revoke_access(client, &token_hash).await? {
                Some(o) => Some(o),
                None => self.revoke_refresh(client, &token_hash).await?,
            }
        };

        let event = AuditEvent::by_client(&client.client_id, actions::TOKEN_REVOKED, "token")
            .from_addr(meta.ip(), meta.user_agent());
        let event = match outcome {
            Some((jti, metadata)) => event.resource(jti).metadata(metadata),
            None => event.metadata(serde_json::json!({ "found": false })),
        };
        self.audit.record(event).await;
        Ok(())
    }

    /// Revoke an access token and, with it, its issuing refresh chain.
    async fn revoke_access(
        &self,
        client: &Client,
        token_hash: &str,
    ) -> Result<Option<(String, serde_json::Value)>, OAuthError> {
        let Some(row) = self.access_repo.find_by_hash(token_hash).await? else {
            return Ok(None);
        };
        if row.client_id != client.id {
            return Ok(None);
        }

        self.access_repo.revoke_by_jti(&row.jti).await?;
        self.blacklist_repo
            .insert(&row.jti, blacklist_type::ACCESS, row.expires_at)
            .await?;

        let mut cascaded = 0u64;
        if let Some(refresh_jti) = &row.refresh_jti {
            if let Some(refresh_row) = self.refresh_repo.find_by_jti(refresh_jti).await? {
                cascaded = self.refresh_repo.revoke_chain(&refresh_row.chain_jti).await?;
                self.blacklist_repo
                    .insert(&refresh_row.jti, blacklist_type::REFRESH, refresh_row.expires_at)
                    .await?;
            }
        }

        Ok(Some((
            row.jti.clone(),
            serde_json::json!({
                "token_type": "access_token",
                "revoked_refresh_tokens": cascaded,
            }),
        )))
    }

    /// Revoke a refresh token: the whole rotation chain dies, along with
    /// every access token of that user+client issued at or after it.
    async fn revoke_refresh(
        &self,
        client: &Client,
        token_hash: &str,
    ) -> Result<Option<(String, serde_json::Value)>, OAuthError> {
        let Some(row) = self.refresh_repo.find_by_hash(token_hash).await? else {
            return Ok(None);
        };
        if row.client_id != client.id {
            return Ok(None);
        }

        let refresh_revoked = self.refresh_repo.revoke_chain(&row.chain_jti).await?;
        self.blacklist_repo
            .insert(&row.jti, blacklist_type::REFRESH, row.expires_at)
            .await?;

        let mut access_revoked = self.access_repo.revoke_by_refresh_chain(&row.chain_jti).await?;
        if let Some(user_id) = row.user_id {
            access_revoked += self
                .access_repo
                .revoke_issued_since(user_id, row.client_id, row.issued_at)
                .await?;
        }

        Ok(Some((
            row.jti.clone(),
            serde_json::json!({
                "token_type": "refresh_token",
                "revoked_refresh_tokens": refresh_revoked,
                "revoked_access_tokens": access_revoked,
            }),
        )))
    }

    /// Active sessions of a user, one per live refresh token.
    pub async fn list_sessions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<crate::models::RefreshToken>, ApiError> {
        Ok(self.refresh_repo.list_active_for_user(user_id).await?)
    }

    /// Self-service session delete: revoke refresh token N plus its cascade.
    /// Only the owner may do this; any other session id is a 404.
    pub async fn delete_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        let row = self
            .refresh_repo
            .find_by_id(session_id)
            .await?
            .filter(|row| row.user_id == Some(user_id))
            .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

        let refresh_revoked = self.refresh_repo.revoke_chain(&row.chain_jti).await?;
        self.blacklist_repo
            .insert(&row.jti, blacklist_type::REFRESH, row.expires_at)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
        let mut access_revoked = self.access_repo.revoke_by_refresh_chain(&row.chain_jti).await?;
        access_revoked += self
            .access_repo
            .revoke_issued_since(user_id, row.client_id, row.issued_at)
            .await?;

        self.audit
            .record(
                AuditEvent::by_user(user_id, actions::SESSION_REVOKED, "session")
                    .resource(session_id.to_string())
                    .metadata(serde_json::json!({
                        "revoked_refresh_tokens": refresh_revoked,
                        "revoked_access_tokens": access_revoked,
                    }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_response_serializes_to_single_field() {
        let json = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object["active"], false);
    }
}
