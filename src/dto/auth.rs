use serde::{Deserialize, Serialize};

use crate::models::User;

/// POST /auth/register body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// POST /auth/login body (development session helper).
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Session JWT handed to the login collaborator flow.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// GET /auth/me: the caller plus what their token says about them.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub permissions: Vec<String>,
}
