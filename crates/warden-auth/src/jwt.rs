//! JWT Token Service
//!
//! Signs and verifies the two token kinds:
//! - Access tokens (short-lived) carry identity claims and are verified
//!   without any store lookup
//! - Refresh tokens (long-lived) carry only the subject and a refresh id that
//!   is checked against the refresh session store
//!
//! Expiry is judged against the injected [`Clock`] rather than the system
//! time so it can be faked in tests.

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::types::{
    AccessClaims, Identity, IssuedPair, RefreshClaims, TimeBoundClaims, TokenPair, TokenType,
};

/// JWT service for token management
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig, clock: Arc<dyn Clock>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
            clock,
        }
    }

    /// Issue a new access + refresh pair for an identity
    ///
    /// The caller must persist `refresh_token_id` in the refresh store.
    pub fn issue_pair(&self, identity: &Identity) -> AuthResult<IssuedPair> {
        let now = self.clock.now();
        let access_exp = now + lifetime(self.config.access_token_lifetime)?;
        let refresh_exp = now + lifetime(self.config.refresh_token_lifetime)?;
        let refresh_token_id = Uuid::new_v4();

        let mut permissions: Vec<_> = identity.permissions.iter().cloned().collect();
        permissions.sort();

        let access_claims = AccessClaims {
            sub: identity.subject_id,
            token_type: TokenType::Access,
            email: identity.email.clone(),
            role: identity.role,
            permissions,
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let refresh_claims = RefreshClaims {
            sub: identity.subject_id,
            token_type: TokenType::Refresh,
            refresh_token_id,
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let access_token = encode(&Header::default(), &access_claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode access token: {}", e)))?;
        let refresh_token = encode(&Header::default(), &refresh_claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to encode refresh token: {}", e)))?;

        Ok(IssuedPair {
            tokens: TokenPair::new(
                access_token,
                refresh_token,
                access_exp.timestamp(),
                refresh_exp.timestamp(),
            ),
            refresh_token_id,
        })
    }

    /// Verify signature, audience, issuer and expiry, then return the claims
    pub fn verify<C>(&self, token: &str, audience: &str, issuer: &str) -> AuthResult<C>
    where
        C: DeserializeOwned + TimeBoundClaims,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        // Expiry is checked below against the injected clock
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let claims = decode::<C>(token, &self.decoding_key, &validation)?.claims;

        if claims.expires_at() <= self.clock.now().timestamp() {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Validate an access token against the configured audience and issuer
    pub fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        let claims: AccessClaims = self.verify(token, &self.config.audience, &self.config.issuer)?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::InvalidTokenType);
        }
        Ok(claims)
    }

    /// Validate a refresh token against the configured audience and issuer
    pub fn verify_refresh(&self, token: &str) -> AuthResult<RefreshClaims> {
        let claims: RefreshClaims = self.verify(token, &self.config.audience, &self.config.issuer)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::InvalidTokenType);
        }
        Ok(claims)
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

fn lifetime(duration: std::time::Duration) -> AuthResult<Duration> {
    Duration::from_std(duration).map_err(|e| AuthError::Internal(e.to_string()))
}
