//! Password Hashing
//!
//! One-way password hashing behind the [`HashingProvider`] trait. The default
//! provider is Argon2id (OWASP recommended) with an optional pepper.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use zeroize::Zeroizing;

use crate::config::PasswordConfig;
use crate::error::{AuthError, AuthResult};

/// Pluggable one-way password hashing
pub trait HashingProvider: Send + Sync {
    /// Hash a password for storage
    fn hash(&self, password: &str) -> AuthResult<String>;

    /// Compare a password with a stored hash
    fn verify(&self, password: &str, hash: &str) -> AuthResult<bool>;
}

/// Argon2id hashing provider
#[derive(Clone)]
pub struct Argon2Hasher {
    config: PasswordConfig,
}

impl Argon2Hasher {
    /// Create a new Argon2id provider
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    fn peppered(&self, password: &str) -> Zeroizing<String> {
        match self.config.pepper {
            Some(ref pepper) => Zeroizing::new(format!("{}{}", password, pepper)),
            None => Zeroizing::new(password.to_string()),
        }
    }

    fn check_length(&self, password: &str) -> AuthResult<()> {
        if password.is_empty() {
            return Err(AuthError::MalformedInput("password must not be empty".to_string()));
        }
        if password.len() > self.config.max_password_length {
            return Err(AuthError::MalformedInput(format!(
                "password must be at most {} characters",
                self.config.max_password_length
            )));
        }
        Ok(())
    }
}

impl HashingProvider for Argon2Hasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        self.check_length(password)?;
        let password = self.peppered(password);

        let salt = SaltString::generate(&mut OsRng);

        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            Some(self.config.hash_length as usize),
        )
        .map_err(|e| AuthError::Internal(format!("Invalid Argon2 params: {}", e)))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let hash = argon2.hash_password(password.as_bytes(), &salt)?;

        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> AuthResult<bool> {
        // Over-long input can never have been hashed; skip the work
        if password.len() > self.config.max_password_length {
            return Ok(false);
        }
        let password = self.peppered(password);

        let parsed_hash = PasswordHash::new(hash)?;

        // Parameters are read back from the PHC string
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PasswordConfig {
        PasswordConfig {
            memory_cost: 1024,
            time_cost: 1,
            ..PasswordConfig::default()
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher::new(test_config());
        let hash = hasher.hash("correct horse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash).unwrap());
        assert!(!hasher.verify("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = Argon2Hasher::new(test_config());
        let a = hasher.hash("pw").unwrap();
        let b = hasher.hash("pw").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_pepper_is_required_to_verify() {
        let mut config = test_config();
        config.pepper = Some("server-side-pepper".to_string());
        let peppered = Argon2Hasher::new(config);
        let plain = Argon2Hasher::new(test_config());

        let hash = peppered.hash("pw").unwrap();
        assert!(peppered.verify("pw", &hash).unwrap());
        assert!(!plain.verify("pw", &hash).unwrap());
    }

    #[test]
    fn test_rejects_empty_and_oversized_passwords() {
        let hasher = Argon2Hasher::new(test_config());
        assert!(matches!(hasher.hash(""), Err(AuthError::MalformedInput(_))));
        let long = "x".repeat(129);
        assert!(matches!(hasher.hash(&long), Err(AuthError::MalformedInput(_))));
    }

    #[test]
    fn test_verify_with_garbage_hash_errors() {
        let hasher = Argon2Hasher::new(test_config());
        assert!(hasher.verify("pw", "not-a-phc-string").is_err());
    }
}
