use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::RequestMeta;
use crate::models::{actions, Permission, Role, UserPermission};
use crate::repositories::{PermissionRepository, RoleRepository, UserRepository};
use crate::services::audit::{AuditEvent, AuditService};

fn permission_name_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9_-]+:[a-z0-9_-]+$").unwrap())
}

/// Coded permission names look like `resource:action`.
pub fn validate_permission_name(name: &str) -> Result<(), ApiError> {
    if permission_name_regex().is_match(name) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "permission name must look like 'resource:action'".to_string(),
        ))
    }
}

/// Role and permission administration plus direct user grants.
#[derive(Clone)]
pub struct RbacService {
    role_repo: RoleRepository,
    permission_repo: PermissionRepository,
    user_repo: UserRepository,
    audit: AuditService,
}

impl RbacService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            role_repo: RoleRepository::new(pool.clone()),
            permission_repo: PermissionRepository::new(pool.clone()),
            user_repo: UserRepository::new(pool.clone()),
            audit: AuditService::new(pool),
        }
    }

    // Roles

    pub async fn create_role(
        &self,
        name: &str,
        display_name: &str,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<Role, ApiError> {
        if name.is_empty() || name.len() > 64 {
            return Err(ApiError::Validation("role name must be 1-64 characters".to_string()));
        }
        if self.role_repo.find_by_name(name).await?.is_some() {
            return Err(ApiError::Conflict("role name already exists".to_string()));
        }
        let role = self
            .role_repo
            .create(Uuid::new_v4(), name, display_name)
            .await?;
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::ROLE_CREATED, "role")
                    .resource(role.id.to_string())
                    .metadata(serde_json::json!({ "name": role.name }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(role)
    }

    pub async fn get_role(&self, id: Uuid) -> Result<Role, ApiError> {
        self.role_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("role not found".to_string()))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, ApiError> {
        Ok(self.role_repo.list().await?)
    }

    pub async fn update_role(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        is_active: Option<bool>,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<Role, ApiError> {
        self.get_role(id).await?;
        self.role_repo.update(id, display_name, is_active).await?;
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::ROLE_UPDATED, "role")
                    .resource(id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        self.get_role(id).await
    }

    pub async fn delete_role(&self, id: Uuid, actor: Uuid, meta: &RequestMeta) -> Result<(), ApiError> {
        if !self.role_repo.delete(id).await? {
            return Err(ApiError::NotFound("role not found".to_string()));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::ROLE_DELETED, "role")
                    .resource(id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    pub async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>, ApiError> {
        self.get_role(role_id).await?;
        Ok(self.role_repo.list_permissions(role_id).await?)
    }

    pub async fn assign_permission_to_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        self.get_role(role_id).await?;
        self.get_permission(permission_id).await?;
        if !self.role_repo.assign_permission(role_id, permission_id).await? {
            return Err(ApiError::Conflict(
                "permission already assigned to role".to_string(),
            ));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::ROLE_PERMISSION_ASSIGNED, "role")
                    .resource(role_id.to_string())
                    .metadata(serde_json::json!({ "permission_id": permission_id }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    pub async fn remove_permission_from_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if !self.role_repo.remove_permission(role_id, permission_id).await? {
            return Err(ApiError::NotFound(
                "permission is not assigned to role".to_string(),
            ));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::ROLE_PERMISSION_REMOVED, "role")
                    .resource(role_id.to_string())
                    .metadata(serde_json::json!({ "permission_id": permission_id }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    // User-role assignment

    pub async fn assign_role_to_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        self.require_user(user_id).await?;
        self.get_role(role_id).await?;
        if !self.role_repo.assign_to_user(user_id, role_id).await? {
            return Err(ApiError::Conflict("user already has this role".to_string()));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_ROLE_ASSIGNED, "user")
                    .user(user_id)
                    .resource(user_id.to_string())
                    .metadata(serde_json::json!({ "role_id": role_id }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    pub async fn remove_role_from_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if !self.role_repo.remove_from_user(user_id, role_id).await? {
            return Err(ApiError::NotFound("user does not have this role".to_string()));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_ROLE_REMOVED, "user")
                    .user(user_id)
                    .resource(user_id.to_string())
                    .metadata(serde_json::json!({ "role_id": role_id }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    pub async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, ApiError> {
        self.require_user(user_id).await?;
        Ok(self.role_repo.list_for_user(user_id).await?)
    }

    // Permissions

    #[allow(clippy::too_many_arguments)]
    pub async fn create_permission(
        &self,
        name: &str,
        permission_type: &str,
        display_name: Option<&str>,
        description: Option<&str>,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<Permission, ApiError> {
        validate_permission_name(name)?;
        if self.permission_repo.find_by_name(name).await?.is_some() {
            return Err(ApiError::Conflict("permission name already exists".to_string()));
        }
        let (resource, action) = name.split_once(':').expect("validated above");
        let permission = self
            .permission_repo
            .create(
                Uuid::new_v4(),
                name,
                resource,
                action,
                permission_type,
                display_name,
                description,
            )
            .await?;
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::PERMISSION_CREATED, "permission")
                    .resource(permission.id.to_string())
                    .metadata(serde_json::json!({ "name": permission.name }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(permission)
    }

    pub async fn get_permission(&self, id: Uuid) -> Result<Permission, ApiError> {
        self.permission_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("permission not found".to_string()))
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ApiError> {
        Ok(self.permission_repo.list().await?)
    }

    pub async fn update_permission(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        description: Option<&str>,
        is_active: Option<bool>,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<Permission, ApiError> {
        self.get_permission(id).await?;
        self.permission_repo
            .update(id, display_name, description, is_active)
            .await?;
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::PERMISSION_UPDATED, "permission")
                    .resource(id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        self.get_permission(id).await
    }

    pub async fn delete_permission(
        &self,
        id: Uuid,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if !self.permission_repo.delete(id).await? {
            return Err(ApiError::NotFound("permission not found".to_string()));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::PERMISSION_DELETED, "permission")
                    .resource(id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    // Direct grants

    pub async fn grant_permission_to_user(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        self.require_user(user_id).await?;
        let permission = self.get_permission(permission_id).await?;
        let created = self
            .permission_repo
            .grant_to_user(user_id, &permission.resource, permission_id, Some(actor), expires_at)
            .await?;
        if !created {
            return Err(ApiError::Conflict(
                "user already holds this permission for the resource".to_string(),
            ));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_PERMISSION_GRANTED, "user")
                    .user(user_id)
                    .resource(user_id.to_string())
                    .metadata(serde_json::json!({
                        "permission": permission.name,
                        "expires_at": expires_at,
                    }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    pub async fn revoke_permission_from_user(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<(), ApiError> {
        if !self
            .permission_repo
            .revoke_from_user(user_id, permission_id)
            .await?
        {
            return Err(ApiError::NotFound(
                "user does not hold this permission".to_string(),
            ));
        }
        self.audit
            .record(
                AuditEvent::by_user(actor, actions::USER_PERMISSION_REVOKED, "user")
                    .user(user_id)
                    .resource(user_id.to_string())
                    .metadata(serde_json::json!({ "permission_id": permission_id }))
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(())
    }

    pub async fn user_direct_permissions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserPermission>, ApiError> {
        self.require_user(user_id).await?;
        Ok(self.permission_repo.list_direct_for_user(user_id).await?)
    }

    pub async fn user_effective_permissions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<String>, ApiError> {
        self.require_user(user_id).await?;
        Ok(self.permission_repo.effective_for_user(user_id).await?)
    }

    async fn require_user(&self, user_id: Uuid) -> Result<(), ApiError> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound("user not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_name_shape() {
        assert!(validate_permission_name("users:create").is_ok());
        assert!(validate_permission_name("audit-logs:read").is_ok());
        assert!(validate_permission_name("users").is_err());
        assert!(validate_permission_name("users:create:extra").is_err());
        assert!(validate_permission_name("Users:Create").is_err());
        assert!(validate_permission_name(":action").is_err());
        assert!(validate_permission_name("resource:").is_err());
    }
}
