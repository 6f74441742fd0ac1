use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Status assigned by the schema when a user registers without one.
pub const DEFAULT_STATUS: i64 = 1;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub uuid: String,         // external identifier, immutable
    pub name: String,
    pub username: String,
    pub email: String,
    pub phone: Option<i64>,
    pub avatar: String,
    #[serde(skip_serializing)]
    pub password: String,     // Argon2 hash, not exposed in JSON
    pub status: i64,          // 0 = disabled
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status != 0
    }
}

/// Row to insert. Timestamps are stamped by the repository.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub status: Option<i64>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<i64>,
    pub avatar: Option<String>,
    pub status: Option<i64>,
    pub is_admin: Option<bool>,
}

/// Row returned by the user listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub status: i64,
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            status: u.status,
            is_admin: u.is_admin,
            created_at: u.created_at,
        }
    }
}
