//! Authentication error types
//!
//! Errors keep fine-grained internal variants so that logs can tell a replayed
//! refresh token from an expired one, while [`AuthError::into_public`] collapses
//! every credential failure into a single `Unauthorized` before it leaves a
//! public operation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::repository::StoreError;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Outward-facing error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    Conflict,
    NotFound,
    MalformedInput,
    InvalidInput,
    Internal,
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Public
    // =========================================================================
    /// Generic credential failure returned by public operations
    #[error("Unauthorized")]
    Unauthorized,

    // =========================================================================
    // Token Errors
    // =========================================================================
    /// Bad signature or unexpected claim shape
    #[error("Invalid token")]
    TokenInvalid,

    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// Token audience does not match
    #[error("Token audience mismatch")]
    TokenAudienceMismatch,

    /// Token issuer does not match
    #[error("Token issuer mismatch")]
    TokenIssuerMismatch,

    /// Token type mismatch (expected access, got refresh, etc.)
    #[error("Invalid token type")]
    InvalidTokenType,

    /// Refresh token id no longer matches the stored session
    #[error("Refresh token reuse detected")]
    RefreshTokenReused,

    // =========================================================================
    // Credential Errors
    // =========================================================================
    /// No account for the given email
    #[error("User does not exist")]
    UnknownUser,

    /// Password did not match the stored hash
    #[error("Email or password does not match")]
    InvalidPassword,

    /// Invalid API key
    #[error("Invalid API key")]
    InvalidApiKey,

    /// No credential of an accepted type was presented
    #[error("Missing credentials")]
    MissingCredentials,

    // =========================================================================
    // 2FA Errors
    // =========================================================================
    /// Two-factor authentication is required
    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    /// Invalid 2FA code
    #[error("Invalid 2FA code")]
    InvalidTwoFactorCode,

    // =========================================================================
    // Authorization Errors
    // =========================================================================
    /// Role not among the ones the route accepts
    #[error("Insufficient role")]
    InsufficientRole,

    /// Required permissions missing
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// Route declares requirements but no identity was established
    #[error("No authenticated identity")]
    MissingIdentity,

    // =========================================================================
    // Account Errors
    // =========================================================================
    /// Email is already registered
    #[error("Email already registered")]
    Conflict,

    /// Subject referenced by a credential no longer exists
    #[error("Subject {0} not found")]
    SubjectNotFound(String),

    /// Unparseable token or key
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Sign-up data rejected before anything was stored
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Password hashing failed
    #[error("Password hashing failed")]
    PasswordHashingFailed,

    /// Cryptographic operation failed
    #[error("Cryptographic error")]
    CryptoError,

    /// Configuration values the services cannot run with
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (should not be exposed to clients)
    #[error("Internal error")]
    Internal(String),
}

impl AuthError {
    /// Outward category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized
            | Self::TokenInvalid
            | Self::TokenExpired
            | Self::TokenAudienceMismatch
            | Self::TokenIssuerMismatch
            | Self::InvalidTokenType
            | Self::RefreshTokenReused
            | Self::UnknownUser
            | Self::InvalidPassword
            | Self::InvalidApiKey
            | Self::MissingCredentials
            | Self::TwoFactorRequired
            | Self::InvalidTwoFactorCode => ErrorKind::Unauthorized,

            Self::InsufficientRole | Self::InsufficientPermissions | Self::MissingIdentity => {
                ErrorKind::Forbidden
            }

            Self::Conflict => ErrorKind::Conflict,
            Self::SubjectNotFound(_) => ErrorKind::NotFound,
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
            Self::InvalidRegistration(_) => ErrorKind::InvalidInput,

            Self::Storage(_)
            | Self::PasswordHashingFailed
            | Self::CryptoError
            | Self::InvalidConfig(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error
    ///
    /// `NotFound` and `MalformedInput` are credential failures from the
    /// client's point of view and share the 401.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Unauthorized | ErrorKind::NotFound | ErrorKind::MalformedInput => 401,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    /// Get an error code for the client (safe to expose)
    pub fn error_code(&self) -> &'static str {
        match self.status_code() {
            400 => "BAD_REQUEST",
            401 => "UNAUTHORIZED",
            403 => "FORBIDDEN",
            409 => "CONFLICT",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Get safe message for client (doesn't leak internal details)
    pub fn client_message(&self) -> String {
        match self.status_code() {
            400 => "Bad request".to_string(),
            401 => "Unauthorized".to_string(),
            403 => "Forbidden".to_string(),
            409 => "Conflict".to_string(),
            _ => "An internal error occurred".to_string(),
        }
    }

    /// Log the internal cause and collapse credential failures
    ///
    /// Called at the boundary of every public operation. Storage and other
    /// internal failures pass through unchanged.
    pub fn into_public(self, operation: &'static str) -> Self {
        match self.kind() {
            ErrorKind::Unauthorized | ErrorKind::NotFound | ErrorKind::MalformedInput => {
                warn!(operation, reason = %self, "Rejected credentials");
                Self::Unauthorized
            }
            ErrorKind::Internal => {
                error!(operation, error = %self, "Authentication backend failure");
                self
            }
            ErrorKind::Forbidden | ErrorKind::Conflict | ErrorKind::InvalidInput => self,
        }
    }
}

/// Error response for API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (machine-readable)
    pub code: String,
    /// Error message (human-readable)
    pub message: String,
}

impl From<&AuthError> for ErrorResponse {
    fn from(error: &AuthError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.client_message(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidAudience => Self::TokenAudienceMismatch,
            ErrorKind::InvalidIssuer => Self::TokenIssuerMismatch,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
                Self::MalformedInput("token is not a decodable JWT".to_string())
            }
            _ => Self::TokenInvalid,
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(_: argon2::password_hash::Error) -> Self {
        Self::PasswordHashingFailed
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::SubjectNotFound(what),
            StoreError::Duplicate(_) => Self::Conflict,
            StoreError::Unavailable(msg) => Self::Storage(msg),
            StoreError::Serialization(msg) => Self::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::InvalidPassword.status_code(), 401);
        assert_eq!(AuthError::RefreshTokenReused.status_code(), 401);
        assert_eq!(AuthError::SubjectNotFound("x".into()).status_code(), 401);
        assert_eq!(AuthError::MalformedInput("x".into()).status_code(), 401);
        assert_eq!(AuthError::InsufficientPermissions.status_code(), 403);
        assert_eq!(AuthError::MissingIdentity.status_code(), 403);
        assert_eq!(AuthError::Conflict.status_code(), 409);
        assert_eq!(AuthError::InvalidRegistration("x".into()).status_code(), 400);
        assert_eq!(AuthError::Storage("down".into()).status_code(), 500);
        assert_eq!(AuthError::InvalidConfig("step".into()).status_code(), 500);
    }

    #[test]
    fn test_error_codes_do_not_distinguish_credential_failures() {
        assert_eq!(AuthError::UnknownUser.error_code(), "UNAUTHORIZED");
        assert_eq!(AuthError::InvalidPassword.error_code(), "UNAUTHORIZED");
        assert_eq!(AuthError::TokenExpired.error_code(), "UNAUTHORIZED");
        assert_eq!(
            AuthError::UnknownUser.client_message(),
            AuthError::InvalidPassword.client_message()
        );
    }

    #[test]
    fn test_client_message_hides_internal_details() {
        let err = AuthError::Storage("connection string with password".to_string());
        assert!(!err.client_message().contains("password"));
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_into_public() {
        assert!(matches!(
            AuthError::RefreshTokenReused.into_public("refresh"),
            AuthError::Unauthorized
        ));
        assert!(matches!(
            AuthError::SubjectNotFound("42".into()).into_public("refresh"),
            AuthError::Unauthorized
        ));
        assert!(matches!(AuthError::Conflict.into_public("sign_up"), AuthError::Conflict));
        assert!(matches!(
            AuthError::InvalidRegistration("empty email".into()).into_public("sign_up"),
            AuthError::InvalidRegistration(_)
        ));
        assert!(matches!(
            AuthError::Storage("down".into()).into_public("sign_in"),
            AuthError::Storage(_)
        ));
    }

    #[test]
    fn test_store_error_conversion() {
        assert!(matches!(
            AuthError::from(StoreError::Duplicate("a@x.com".into())),
            AuthError::Conflict
        ));
        assert!(matches!(
            AuthError::from(StoreError::Unavailable("timeout".into())),
            AuthError::Storage(_)
        ));
    }

    #[test]
    fn test_error_response() {
        let response = ErrorResponse::from(&AuthError::InvalidTwoFactorCode);
        assert_eq!(response.code, "UNAUTHORIZED");
        assert_eq!(response.message, "Unauthorized");
    }
}
