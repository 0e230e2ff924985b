use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Password hash error")]
    PasswordHash,
}

/// One-way credential capability: produce a digest from a password, and
/// check a password against a stored digest. The plaintext never leaves
/// this boundary.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, AuthError>;
    fn verify(&self, password: &str, digest: &str) -> Result<bool, AuthError>;
}

/// Argon2 implementation used in production.
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::PasswordHash)
    }

    fn verify(&self, password: &str, digest: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(digest).map_err(|_| AuthError::PasswordHash)?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Test double that skips real hashing so store and router tests stay fast.
#[cfg(test)]
pub(crate) struct PlainTextVerifier;

#[cfg(test)]
impl CredentialVerifier for PlainTextVerifier {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, digest: &str) -> Result<bool, AuthError> {
        Ok(digest == format!("plain:{password}"))
    }
}
