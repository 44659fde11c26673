//! Password hashing with Argon2id

use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// The account has no local password (federated-only)
    #[error("account has no stored password")]
    NoStoredHash,
    #[error("password does not match")]
    Mismatch,
    #[error("stored password hash is not a valid PHC string")]
    InvalidHash,
    #[error("failed to hash password: {0}")]
    Hashing(String),
}

/// Hash a password into a salted PHC string
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Check a password against the stored hash.
///
/// The comparison itself is argon2's constant-time check.
pub fn check_password(password: &str, stored_hash: Option<&str>) -> Result<(), PasswordError> {
    let stored_hash = stored_hash.ok_or(PasswordError::NoStoredHash)?;
    let parsed = PasswordHash::new(stored_hash).map_err(|_| PasswordError::InvalidHash)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| PasswordError::Mismatch)
}

/// Boolean form of [`check_password`]; a missing or unreadable hash is a mismatch
pub fn verify_password(password: &str, stored_hash: Option<&str>) -> bool {
    check_password(password, stored_hash).is_ok()
}

/// Hash of a random throwaway password, computed on first use
fn dummy_hash() -> Option<&'static str> {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    DUMMY_HASH
        .get_or_init(|| {
            let throwaway = SaltString::generate(&mut OsRng);
            hash_password(throwaway.as_str()).ok()
        })
        .as_deref()
}

/// Spend one full verification on an account that has no usable hash.
///
/// Keeps unknown and federated-only accounts as slow to reject as a wrong
/// password. Always returns `false`.
pub fn verify_against_dummy(password: &str) -> bool {
    let _ = check_password(password, dummy_hash());
    false
}
