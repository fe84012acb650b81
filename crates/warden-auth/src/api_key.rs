//! API Key Authentication Service
//!
//! Machine-to-machine credentials of the form `{key_id}.{secret}`:
//! - `key_id` is a UUID used for an O(1) record lookup before any hashing
//! - the secret is 256 bits of randomness, stored only as a SHA-256 hash
//! - validation uses a constant-time hash comparison

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::ApiKeyConfig;
use crate::error::{AuthError, AuthResult};
use crate::types::{ApiKeyRecord, IssuedApiKey};

/// Separator between the key id and the secret
const SEPARATOR: char = '.';

/// Header carrying a raw API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// `Authorization` scheme carrying a raw API key
pub const API_KEY_SCHEME: &str = "ApiKey";

/// API key service for authentication
#[derive(Debug, Clone, Default)]
pub struct ApiKeyService {
    config: ApiKeyConfig,
}

impl ApiKeyService {
    /// Create a new API key service
    pub fn new(config: ApiKeyConfig) -> Self {
        Self { config }
    }

    /// Generate a new key for `owner_user_id`
    ///
    /// The raw key is returned once and can never be recovered from the record.
    pub fn create_key(&self, owner_user_id: Uuid) -> IssuedApiKey {
        let key_id = Uuid::new_v4();

        let mut secret_bytes = vec![0u8; self.config.secret_length];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let secret = URL_SAFE_NO_PAD.encode(&secret_bytes);

        IssuedApiKey {
            raw_key: format!("{}{}{}", key_id, SEPARATOR, secret),
            record: ApiKeyRecord {
                key_id,
                secret_hash: hash_secret(&secret),
                owner_user_id,
            },
        }
    }

    /// Parse the key id without touching the secret
    pub fn extract_id(&self, raw_key: &str) -> AuthResult<Uuid> {
        let (key_id, _) = split(raw_key)?;
        Ok(key_id)
    }

    /// Check the secret portion of `raw_key` against a stored hash
    pub fn validate(&self, raw_key: &str, stored_hash: &str) -> AuthResult<()> {
        let (_, secret) = split(raw_key)?;
        let computed = hash_secret(secret);

        // Hex digests of the same algorithm always have equal length
        if computed.as_bytes().ct_eq(stored_hash.as_bytes()).into() {
            Ok(())
        } else {
            Err(AuthError::InvalidApiKey)
        }
    }
}

/// Hash an API key secret for storage (SHA-256, hex encoded)
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn split(raw_key: &str) -> AuthResult<(Uuid, &str)> {
    let (id, secret) = raw_key
        .trim()
        .split_once(SEPARATOR)
        .ok_or_else(|| AuthError::MalformedInput("API key has no separator".to_string()))?;

    if id.is_empty() || secret.is_empty() {
        return Err(AuthError::MalformedInput("API key has an empty part".to_string()));
    }

    let key_id = Uuid::parse_str(id)
        .map_err(|_| AuthError::MalformedInput("API key id is not a UUID".to_string()))?;

    Ok((key_id, secret))
}

/// Extract a raw API key from `Authorization: ApiKey <key>` or `X-API-Key`
pub fn extract_api_key_from_headers(headers: &http::HeaderMap) -> Option<String> {
    let from_authorization = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(API_KEY_SCHEME))
        .map(|(_, key)| key.trim().to_string());

    from_authorization
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        })
        .filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue};

    #[test]
    fn test_create_key() {
        let service = ApiKeyService::default();
        let owner = Uuid::new_v4();
        let issued = service.create_key(owner);

        assert_eq!(issued.record.owner_user_id, owner);
        assert!(issued.raw_key.starts_with(&issued.record.key_id.to_string()));
        // SHA-256 hex
        assert_eq!(issued.record.secret_hash.len(), 64);
        assert!(!issued.raw_key.contains(&issued.record.secret_hash));
    }

    #[test]
    fn test_keys_are_unique() {
        let service = ApiKeyService::default();
        let owner = Uuid::new_v4();
        let a = service.create_key(owner);
        let b = service.create_key(owner);

        assert_ne!(a.raw_key, b.raw_key);
        assert_ne!(a.record.key_id, b.record.key_id);
    }

    #[test]
    fn test_extract_id() {
        let service = ApiKeyService::default();
        let issued = service.create_key(Uuid::new_v4());
        assert_eq!(service.extract_id(&issued.raw_key).unwrap(), issued.record.key_id);
    }

    #[test]
    fn test_extract_id_malformed() {
        let service = ApiKeyService::default();
        let id = Uuid::new_v4();

        for raw in [
            "no-separator-here".to_string(),
            format!("{}.", id),
            ".secret".to_string(),
            "not-a-uuid.secret".to_string(),
            String::new(),
        ] {
            assert!(
                matches!(service.extract_id(&raw), Err(AuthError::MalformedInput(_))),
                "expected malformed for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_validate() {
        let service = ApiKeyService::default();
        let issued = service.create_key(Uuid::new_v4());

        assert!(service.validate(&issued.raw_key, &issued.record.secret_hash).is_ok());
    }

    #[test]
    fn test_any_secret_mutation_fails() {
        let service = ApiKeyService::default();
        let issued = service.create_key(Uuid::new_v4());
        let hash = &issued.record.secret_hash;
        let secret_start = issued.raw_key.find(SEPARATOR).unwrap() + 1;

        for i in secret_start..issued.raw_key.len() {
            let mut bytes = issued.raw_key.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();

            assert!(matches!(
                service.validate(&mutated, hash),
                Err(AuthError::InvalidApiKey)
            ));
        }
    }

    #[test]
    fn test_validate_against_other_key_hash() {
        let service = ApiKeyService::default();
        let owner = Uuid::new_v4();
        let a = service.create_key(owner);
        let b = service.create_key(owner);

        assert!(service.validate(&a.raw_key, &b.record.secret_hash).is_err());
    }

    #[test]
    fn test_extract_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_api_key_from_headers(&headers), None);

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("abc.def"));
        assert_eq!(extract_api_key_from_headers(&headers).as_deref(), Some("abc.def"));

        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("ApiKey xyz.uvw"),
        );
        assert_eq!(extract_api_key_from_headers(&headers).as_deref(), Some("xyz.uvw"));
    }

    #[test]
    fn test_bearer_authorization_is_not_an_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer some.jwt.token"),
        );
        assert_eq!(extract_api_key_from_headers(&headers), None);
    }
}
