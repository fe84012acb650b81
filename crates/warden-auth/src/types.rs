//! Core authentication types
//!
//! Shared types used across all authentication components.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Identity Types
// =============================================================================

/// Authenticated identity established for a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject (user ID)
    pub subject_id: Uuid,
    /// User email
    pub email: String,
    /// User role
    pub role: Role,
    /// Fine-grained grants
    pub permissions: HashSet<Permission>,
    /// Authentication method used
    pub auth_method: AuthMethod,
    /// API key ID (if using API key auth)
    pub api_key_id: Option<Uuid>,
}

impl Identity {
    /// Check if identity holds a specific permission
    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    /// Check if identity holds every one of the given permissions
    pub fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(p))
    }

    /// Check if identity's role is any of the given roles
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// Build an identity from a stored credential record
    pub fn from_record(record: &CredentialRecord, auth_method: AuthMethod) -> Self {
        Self {
            subject_id: record.id,
            email: record.email.clone(),
            role: record.role,
            permissions: record.permissions.clone(),
            auth_method,
            api_key_id: None,
        }
    }
}

/// User roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular user
    #[default]
    Regular,
    /// Administrator
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A named fine-grained grant such as `coffees:create`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Authentication method used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Access token presented as `Authorization: Bearer`
    Bearer,
    /// API key
    ApiKey,
}

// =============================================================================
// Credential Types
// =============================================================================

/// Stored user credentials (owned by the user repository)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub permissions: HashSet<Permission>,
    pub totp_enabled: bool,
    pub totp_secret: Option<String>,
}

impl CredentialRecord {
    /// New regular account with no grants and 2FA off
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            role: Role::Regular,
            permissions: HashSet::new(),
            totp_enabled: false,
            totp_secret: None,
        }
    }
}

/// Sign-in request
#[derive(Debug, Clone, Deserialize)]
pub struct SignIn {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
    /// 2FA code (if enabled)
    #[serde(default)]
    pub totp_code: Option<String>,
}

// =============================================================================
// Token Types
// =============================================================================

/// JWT token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiry (Unix timestamp)
    pub refresh_expires_at: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

impl TokenPair {
    pub fn new(
        access_token: String,
        refresh_token: String,
        access_expires_at: i64,
        refresh_expires_at: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
            token_type: "Bearer".to_string(),
        }
    }
}

/// Token type enum for JWT claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims whose validity window is judged against the injected clock
pub trait TimeBoundClaims {
    /// Expiration time (Unix timestamp)
    fn expires_at(&self) -> i64;
}

/// Access token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Token type
    pub token_type: TokenType,
    /// User email
    pub email: String,
    /// User role
    pub role: Role,
    /// User permissions
    pub permissions: Vec<Permission>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

impl TimeBoundClaims for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl From<AccessClaims> for Identity {
    fn from(claims: AccessClaims) -> Self {
        Self {
            subject_id: claims.sub,
            email: claims.email,
            role: claims.role,
            permissions: claims.permissions.into_iter().collect(),
            auth_method: AuthMethod::Bearer,
            api_key_id: None,
        }
    }
}

/// Refresh token claims (deliberately no identity data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Token type
    pub token_type: TokenType,
    /// Id of the refresh session this token redeems
    pub refresh_token_id: Uuid,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

impl TimeBoundClaims for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// A freshly signed pair plus the refresh id the caller must persist
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub tokens: TokenPair,
    pub refresh_token_id: Uuid,
}

// =============================================================================
// API Key Types
// =============================================================================

/// Persisted form of an API key (the secret itself is never stored)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_id: Uuid,
    pub secret_hash: String,
    pub owner_user_id: Uuid,
}

/// Result of creating an API key
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    /// `"{key_id}.{secret}"`, shown to the caller once
    pub raw_key: String,
    pub record: ApiKeyRecord,
}

// =============================================================================
// 2FA Types
// =============================================================================

/// TOTP enrollment material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpEnrollment {
    /// Secret key (base32 encoded)
    pub secret: String,
    /// `otpauth://` URI handed to the QR renderer
    pub qr_payload: String,
}
