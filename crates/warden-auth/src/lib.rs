//! Warden Authentication Layer
//!
//! Authentication and authorization core for multi-tenant HTTP services:
//!
//! - **JWT Authentication**: Access tokens + refresh tokens with strict rotation
//! - **Reuse Detection**: A replayed refresh token revokes the subject's session
//! - **2FA**: TOTP-based two-factor authentication
//! - **API Key Authentication**: `{key_id}.{secret}` keys, stored as hashes
//! - **Password Security**: Argon2id hashing (OWASP recommended)
//! - **Guards**: Per-route auth types, roles (any of) and permissions (all of)
//!
//! # Security Features
//!
//! - Constant-time comparisons to prevent timing attacks
//! - Secure random token and key generation
//! - One generic `Unauthorized` for every credential failure
//! - Injectable clock for token expiry and TOTP steps
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Authentication Flow                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request → enforce (RouteGuard) → Handler                   │
//! │                  │                                          │
//! │                  ▼                                          │
//! │            GuardComposer                                    │
//! │          ┌───────┴────────┐                                 │
//! │          ▼                ▼                                 │
//! │     TokenService     ApiKeyService                          │
//! │          │                │                                 │
//! │          └───────┬────────┘                                 │
//! │                  ▼                                          │
//! │               Identity → RolesGuard → PermissionsGuard      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api_key;
pub mod authentication;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod repository;
pub mod session;
pub mod totp;
pub mod types;

pub use api_key::ApiKeyService;
pub use authentication::AuthenticationService;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult, ErrorKind, ErrorResponse};
pub use guard::{AuthType, GuardComposer, PermissionsGuard, RolesGuard, RouteRequirements};
pub use jwt::TokenService;
pub use middleware::{enforce, ActiveUser, MaybeUser, RouteGuard};
pub use password::{Argon2Hasher, HashingProvider};
pub use repository::{ApiKeyRepository, StoreError, StoreResult, UserRepository};
pub use session::{InMemoryRefreshStore, Redemption, RefreshTokenStore};
pub use totp::TotpService;
pub use types::*;

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Main authentication service combining all auth methods
#[derive(Clone)]
pub struct AuthService {
    pub authentication: AuthenticationService,
    pub guards: GuardComposer,
    pub tokens: TokenService,
    pub api_keys: ApiKeyService,
    pub totp: TotpService,
    api_key_repo: Arc<dyn ApiKeyRepository>,
    config: AuthConfig,
}

impl AuthService {
    /// Create a new auth service with the in-memory refresh store and wall clock
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserRepository>,
        api_key_repo: Arc<dyn ApiKeyRepository>,
    ) -> AuthResult<Self> {
        Self::with_components(
            config,
            users,
            api_key_repo,
            Arc::new(InMemoryRefreshStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Create with an explicit refresh store (e.g. a shared one) and clock
    ///
    /// Settings the services cannot run with fail here as `InvalidConfig`.
    /// The advisory strength checks of [`AuthConfig::validate`] are left to
    /// the caller.
    pub fn with_components(
        config: AuthConfig,
        users: Arc<dyn UserRepository>,
        api_key_repo: Arc<dyn ApiKeyRepository>,
        sessions: Arc<dyn RefreshTokenStore>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        let tokens = TokenService::new(config.jwt.clone(), clock.clone());
        let totp = TotpService::new(config.totp.clone(), clock)?;
        let api_keys = ApiKeyService::new(config.api_key.clone());
        let hasher: Arc<dyn HashingProvider> = Arc::new(Argon2Hasher::new(config.password.clone()));

        let authentication = AuthenticationService::new(
            users.clone(),
            hasher,
            tokens.clone(),
            totp.clone(),
            sessions,
        );
        let guards = GuardComposer::new(tokens.clone(), api_keys.clone(), api_key_repo.clone(), users);

        Ok(Self {
            authentication,
            guards,
            tokens,
            api_keys,
            totp,
            api_key_repo,
            config,
        })
    }

    /// Get the config reference
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create and persist an API key; the raw key is only returned here
    pub async fn issue_api_key(&self, owner_user_id: Uuid) -> AuthResult<String> {
        let issued = self.api_keys.create_key(owner_user_id);
        self.api_key_repo
            .save(&issued.record)
            .await
            .map_err(|e| AuthError::from(e).into_public("issue_api_key"))?;

        info!(user_id = %owner_user_id, key_id = %issued.record.key_id, "API key created");
        Ok(issued.raw_key)
    }

    /// Middleware state for a route, see [`middleware::enforce`]
    pub fn route_guard(&self, route: RouteRequirements) -> RouteGuard {
        RouteGuard::new(self.guards.clone(), route)
    }
}
