use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hash error: {0}")]
    Hash(String),
    #[error("password mismatch")]
    Mismatch,
}

/// Hashes and checks account passwords.
pub trait PasswordHasher: Send + Sync {
    fn encrypt(&self, plain: &str) -> Result<String, PasswordError>;
    /// `Ok(())` when `plain` matches `hash`.
    fn compare(&self, hash: &str, plain: &str) -> Result<(), PasswordError>;
}

#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn encrypt(&self, plain: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                PasswordError::Hash(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn compare(&self, hash: &str, plain: &str) -> Result<(), PasswordError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            PasswordError::Hash(e.to_string())
        })?;
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .map_err(|_| PasswordError::Mismatch)
    }
}
