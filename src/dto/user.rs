use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// POST /users body (admin create).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// PUT /users/{id} body; absent fields stay untouched.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: Option<bool>,
    pub must_change_password: Option<bool>,
    pub password: Option<String>,
}

/// POST /users/{id}/lock body.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LockUserRequest {
    pub minutes: Option<i64>,
}

/// POST /users/{id}/permissions body (direct grant).
#[derive(Debug, Clone, Deserialize)]
pub struct GrantPermissionRequest {
    pub permission_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST /users/{id}/roles body.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}
