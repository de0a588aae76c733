//! Request-admission authorization: required scopes against token scopes,
//! required permissions against the effective permission set.

use sqlx::MySqlPool;
use std::collections::HashSet;

use crate::error::ApiError;
use crate::middleware::AuthContext;
use crate::repositories::{ClientRepository, PermissionRepository};

/// Intersection of a client-credentials token's scopes with the client's
/// currently allowed scopes; such tokens have no user to resolve roles for.
pub fn client_effective(scopes: &[String], allowed: &[String]) -> HashSet<String> {
    scopes
        .iter()
        .filter(|s| allowed.contains(s))
        .cloned()
        .collect()
}

/// Grants or denies access to protected endpoints.
#[derive(Clone)]
pub struct AccessDecider {
    permission_repo: PermissionRepository,
    client_repo: ClientRepository,
}

impl AccessDecider {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            permission_repo: PermissionRepository::new(pool.clone()),
            client_repo: ClientRepository::new(pool),
        }
    }

    /// The effective permission set for this request, computed at most once
    /// and cached on the context.
    ///
    /// Resolution order: a `permissions` claim frozen into the token is
    /// authoritative; otherwise user tokens resolve live role and direct
    /// grants, and user-less tokens fall back to scope intersection.
    pub async fn effective_permissions<'a>(
        &self,
        ctx: &'a AuthContext,
    ) -> Result<&'a HashSet<String>, ApiError> {
        ctx.effective
            .get_or_try_init(|| async {
                if let Some(claim) = &ctx.permissions_claim {
                    return Ok(claim.iter().cloned().collect());
                }
                if let Some(user_id) = ctx.user_id {
                    let names = self.permission_repo.effective_for_user(user_id).await?;
                    return Ok(names.into_iter().collect());
                }
                let allowed = self
                    .client_repo
                    .find_active_by_client_id(&ctx.client_id)
                    .await?
                    .map(|c| c.allowed_scopes)
                    .unwrap_or_default();
                Ok::<_, ApiError>(client_effective(&ctx.scopes, &allowed))
            })
            .await
    }

    /// Admission check: all required scopes present on the token AND all
    /// required permissions in the effective set.
    pub async fn require(
        &self,
        ctx: &AuthContext,
        required_scopes: &[&str],
        required_permissions: &[&str],
    ) -> Result<(), ApiError> {
        if !ctx.has_all_scopes(required_scopes) {
            return Err(ApiError::Forbidden("insufficient scope".to_string()));
        }
        if required_permissions.is_empty() {
            return Ok(());
        }
        let effective = self.effective_permissions(ctx).await?;
        for required in required_permissions {
            if !effective.contains(*required) {
                return Err(ApiError::Forbidden(format!(
                    "missing permission: {}",
                    required
                )));
            }
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
    fn client_effective_is_scope_intersection() {
        let effective = client_effective(
            &strings(&["api:read", "api:write", "unknown"]),
            &strings(&["api:read", "api:write", "api:admin"]),
        );
        assert!(effective.contains("api:read"));
        assert!(effective.contains("api:write"));
        assert!(!effective.contains("unknown"));
        assert!(!effective.contains("api:admin"));
    }

    #[test]
    fn client_effective_empty_cases() {
        assert!(client_effective(&[], &strings(&["a"])).is_empty());
        assert!(client_effective(&strings(&["a"]), &[]).is_empty());
    }
}
