use serde::Deserialize;

/// POST /roles body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub display_name: String,
}

/// PUT /roles/{id} body.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateRoleRequest {
    pub display_name: Option<String>,
    pub is_active: Option<bool>,
}

/// POST /roles/{id}/permissions body.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignPermissionRequest {
    pub permission_id: uuid::Uuid,
}

/// POST /permissions body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub permission_type: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

/// PUT /permissions/{id} body.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdatePermissionRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// POST /scopes body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScopeRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// PUT /scopes/{id} body.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateScopeRequest {
    pub description: Option<String>,
    pub is_default: Option<bool>,
}
