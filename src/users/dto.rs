use serde::{Deserialize, Serialize};

use crate::users::model::DEFAULT_STATUS;

/// Request body for registration and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Request body for admin-side user creation.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_status")]
    pub status: i64,
}

fn default_status() -> i64 {
    DEFAULT_STATUS
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Identity of the bearer of the current token.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}
