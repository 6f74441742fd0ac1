use serde::{Deserialize, Serialize};

use crate::users::model::User;

/// Identity embedded into a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub user_id: i64,
    pub username: String,
    pub uuid: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<&User> for TokenContext {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.id,
            username: u.username.clone(),
            uuid: u.uuid.clone(),
            email: u.email.clone(),
            is_admin: u.is_admin,
        }
    }
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub uuid: String,
    pub email: String,
    pub is_admin: bool,
    pub iat: usize, // issued at (unix timestamp)
    pub nbf: usize, // not before
    pub exp: usize, // expires at
    pub iss: String,
    pub aud: String,
}
