//! TOTP (Time-based One-Time Password) Service
//!
//! Two-factor authentication implementation with:
//! - TOTP generation and verification (RFC 6238)
//! - otpauth:// enrollment URIs for authenticator apps
//! - Time skew tolerance

use base32::{decode as base32_decode, encode as base32_encode, Alphabet};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::clock::Clock;
use crate::config::TotpConfig;
use crate::error::{AuthError, AuthResult};
use crate::types::TotpEnrollment;

const SECRET_ALPHABET: Alphabet = Alphabet::RFC4648 { padding: false };

/// TOTP service for two-factor authentication
#[derive(Clone)]
pub struct TotpService {
    config: TotpConfig,
    clock: Arc<dyn Clock>,
}

impl TotpService {
    /// Create a new TOTP service
    ///
    /// Fails with `InvalidConfig` for a zero step or a digit count outside 6..=8.
    pub fn new(config: TotpConfig, clock: Arc<dyn Clock>) -> AuthResult<Self> {
        if config.step == 0 {
            return Err(AuthError::InvalidConfig("TOTP step must be non-zero".to_string()));
        }
        if !(6..=8).contains(&config.digits) {
            return Err(AuthError::InvalidConfig(format!(
                "TOTP digits must be between 6 and 8, got {}",
                config.digits
            )));
        }
        Ok(Self { config, clock })
    }

    /// Generate a new secret and its enrollment URI
    ///
    /// Nothing is persisted here; the secret is stored once the user confirms
    /// enrollment.
    pub fn generate_secret(&self, email: &str) -> TotpEnrollment {
        // 20 bytes for SHA1, 32 for SHA256, 64 for SHA512
        let secret_len = match self.config.algorithm.as_str() {
            "SHA256" => 32,
            "SHA512" => 64,
            _ => 20,
        };

        let mut secret_bytes = vec![0u8; secret_len];
        rand::thread_rng().fill_bytes(&mut secret_bytes);

        let secret = base32_encode(SECRET_ALPHABET, &secret_bytes);
        let qr_payload = self.otpauth_uri(&secret, email);

        TotpEnrollment { secret, qr_payload }
    }

    /// Verify a code against the current step and `skew` steps either side
    ///
    /// Returns false for an empty or malformed code and for an undecodable
    /// secret; never errors.
    pub fn verify_code(&self, code: &str, secret: &str) -> bool {
        let code = code.trim();
        if code.len() != self.config.digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        let Some(secret_bytes) = base32_decode(SECRET_ALPHABET, secret) else {
            warn!("Stored TOTP secret is not valid base32");
            return false;
        };

        let Some(counter) = self.counter_at(self.clock.now()) else {
            return false;
        };

        let skew = self.config.skew as u64;
        let first = counter.saturating_sub(skew);
        (first..=counter + skew).any(|step| match self.code_for_counter(&secret_bytes, step) {
            Ok(expected) => constant_time_compare(code, &expected),
            Err(_) => false,
        })
    }

    /// Code for the step containing `at`
    pub fn code_at(&self, secret: &str, at: DateTime<Utc>) -> AuthResult<String> {
        let secret_bytes = base32_decode(SECRET_ALPHABET, secret)
            .ok_or_else(|| AuthError::MalformedInput("Invalid TOTP secret".to_string()))?;
        let counter = self
            .counter_at(at)
            .ok_or_else(|| AuthError::Internal("Time before Unix epoch".to_string()))?;

        self.code_for_counter(&secret_bytes, counter)
    }

    /// Generate the current TOTP code (for testing/display)
    pub fn current_code(&self, secret: &str) -> AuthResult<String> {
        self.code_at(secret, self.clock.now())
    }

    /// Get seconds remaining until next code
    pub fn seconds_remaining(&self) -> u64 {
        let now = self.clock.now().timestamp().max(0) as u64;
        self.config.step - (now % self.config.step)
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    fn counter_at(&self, at: DateTime<Utc>) -> Option<u64> {
        u64::try_from(at.timestamp()).ok().map(|secs| secs / self.config.step)
    }

    /// Generate otpauth:// URI for QR codes
    fn otpauth_uri(&self, secret: &str, account_name: &str) -> String {
        let issuer_encoded = urlencoding::encode(&self.config.issuer);
        let account_encoded = urlencoding::encode(account_name);

        format!(
            "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm={}&digits={}&period={}",
            issuer_encoded,
            account_encoded,
            secret,
            issuer_encoded,
            self.config.algorithm,
            self.config.digits,
            self.config.step,
        )
    }

    /// Generate TOTP code for a specific counter value
    fn code_for_counter(&self, secret: &[u8], counter: u64) -> AuthResult<String> {
        let counter_bytes = counter.to_be_bytes();

        let hash = match self.config.algorithm.as_str() {
            "SHA256" => hmac_digest::<Hmac<Sha256>>(secret, &counter_bytes)?,
            "SHA512" => hmac_digest::<Hmac<Sha512>>(secret, &counter_bytes)?,
            _ => hmac_digest::<Hmac<Sha1>>(secret, &counter_bytes)?,
        };

        // Dynamic truncation (RFC 4226)
        let offset = (hash.last().copied().unwrap_or(0) & 0x0f) as usize;
        let binary = ((hash[offset] & 0x7f) as u32) << 24
            | (hash[offset + 1] as u32) << 16
            | (hash[offset + 2] as u32) << 8
            | (hash[offset + 3] as u32);

        let modulo = 10u32.pow(self.config.digits);
        let code = binary % modulo;

        Ok(format!("{:0width$}", code, width = self.config.digits as usize))
    }
}

fn hmac_digest<M: Mac + hmac::digest::KeyInit>(key: &[u8], message: &[u8]) -> AuthResult<Vec<u8>> {
    let mut mac = <M as hmac::digest::KeyInit>::new_from_slice(key).map_err(|_| AuthError::CryptoError)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes().ct_eq(b.as_bytes()).into()
}
