//! Client secret hashing.
//!
//! argon2id with a fresh random salt per secret, stored as a PHC string.
//! Test builds use deliberately weak parameters so the suite stays fast.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash secret")]
    Hash(argon2::password_hash::Error),
}

#[cfg(not(test))]
fn argon2_instance() -> Argon2<'static> {
    // argon2id, m=19456 KiB, t=2, p=1
    Argon2::default()
}

#[cfg(test)]
fn argon2_instance() -> Argon2<'static> {
    use argon2::{Algorithm, Params, Version};
    // Weak parameters, tests only.
    let params = Params::new(1024, 1, 1, None).expect("valid argon2 params");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Hash a client secret for storage. Each call salts freshly, so hashing the
/// same secret twice yields different strings.
pub fn hash_secret(secret: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(argon2_instance()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(PasswordError::Hash)?
        .to_string())
}

/// Verify a presented secret against a stored PHC string. An unparseable
/// hash verifies as false rather than erroring: the caller's answer is the
/// same uniform "invalid credentials" either way.
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    argon2_instance()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_secret("hunter2!").unwrap();
        assert!(verify_secret("hunter2!", &hash));
        assert!(!verify_secret("wrong", &hash));
    }

    #[test]
    fn hash_is_phc_argon2id() {
        let hash = hash_secret("hunter2!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn same_secret_hashes_differently() {
        let a = hash_secret("hunter2!").unwrap();
        let b = hash_secret("hunter2!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_secret("anything", "not-a-phc-string"));
    }
}
