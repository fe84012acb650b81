//! Authentication configuration
//!
//! Centralized configuration for all authentication components with
//! secure defaults following OWASP recommendations.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Password hashing configuration
    pub password: PasswordConfig,
    /// TOTP (2FA) configuration
    pub totp: TotpConfig,
    /// API key configuration
    pub api_key: ApiKeyConfig,
}

/// JWT token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for signing tokens (should be at least 256 bits)
    pub secret: String,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
    /// Token issuer claim
    pub issuer: String,
    /// Token audience claim
    pub audience: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(), // Must be set in production
            access_token_lifetime: Duration::from_secs(60 * 60), // 1 hour
            refresh_token_lifetime: Duration::from_secs(24 * 60 * 60), // 1 day
            issuer: "warden".to_string(),
            audience: "warden-api".to_string(),
        }
    }
}

/// Password hashing configuration (Argon2id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB (OWASP recommends 19456 KiB = 19 MiB minimum)
    pub memory_cost: u32,
    /// Time cost (iterations) - OWASP recommends 2 minimum
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
    /// Output hash length in bytes
    pub hash_length: u32,
    /// Pepper (additional secret, optional)
    pub pepper: Option<String>,
    /// Maximum password length (to prevent DoS)
    pub max_password_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
            hash_length: 32,
            pepper: None,
            max_password_length: 128,
        }
    }
}

/// TOTP (Time-based One-Time Password) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpConfig {
    /// TOTP issuer name (shown in authenticator apps)
    pub issuer: String,
    /// Number of digits in OTP (6 or 8)
    pub digits: u32,
    /// Time step in seconds (usually 30)
    pub step: u64,
    /// Algorithm (SHA1, SHA256, SHA512)
    pub algorithm: String,
    /// Allow time skew (number of periods before/after current)
    pub skew: u8,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Warden".to_string(),
            digits: 6,
            step: 30,
            algorithm: "SHA1".to_string(), // Most compatible with authenticator apps
            skew: 1,
        }
    }
}

/// API key configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Random secret length in bytes
    pub secret_length: usize,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            secret_length: 32, // 256 bits
        }
    }
}

impl AuthConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        // JWT configuration
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.jwt.secret = secret;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            config.jwt.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("JWT_AUDIENCE") {
            config.jwt.audience = audience;
        }
        if let Ok(ttl) = std::env::var("JWT_ACCESS_TOKEN_TTL") {
            config.jwt.access_token_lifetime = parse_ttl(&ttl)?;
        }
        if let Ok(ttl) = std::env::var("JWT_REFRESH_TOKEN_TTL") {
            config.jwt.refresh_token_lifetime = parse_ttl(&ttl)?;
        }

        // Password pepper
        if let Ok(pepper) = std::env::var("PASSWORD_PEPPER") {
            config.password.pepper = Some(pepper);
        }

        // TOTP issuer
        if let Ok(issuer) = std::env::var("TOTP_ISSUER") {
            config.totp.issuer = issuer;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // JWT validation
        if self.jwt.secret.is_empty() {
            errors.push("JWT secret must be set".to_string());
        } else if self.jwt.secret.len() < 32 {
            errors.push("JWT secret should be at least 256 bits (32 bytes)".to_string());
        }
        if self.jwt.access_token_lifetime >= self.jwt.refresh_token_lifetime {
            errors.push("Access token lifetime must be shorter than refresh token lifetime".to_string());
        }

        // Password validation
        if self.password.memory_cost < 19456 {
            errors.push("Argon2 memory cost should be at least 19456 KiB (OWASP recommendation)".to_string());
        }
        if self.password.time_cost < 2 {
            errors.push("Argon2 time cost should be at least 2 (OWASP recommendation)".to_string());
        }

        // TOTP validation
        if !(6..=8).contains(&self.totp.digits) {
            errors.push("TOTP digits must be between 6 and 8".to_string());
        }
        if self.totp.step == 0 {
            errors.push("TOTP step must be non-zero".to_string());
        }

        // API key validation
        if self.api_key.secret_length < 16 {
            errors.push("API key secret should be at least 128 bits (16 bytes)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Parse a TTL given either as plain seconds ("3600") or humantime ("15m")
fn parse_ttl(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| format!("Invalid duration '{}': {}", value, e))
}
