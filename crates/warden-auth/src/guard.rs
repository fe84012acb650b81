//! Guard Composer and Authorization Guards
//!
//! Each route declares a [`RouteRequirements`] value in code. Per request the
//! [`GuardComposer`] tries the accepted authentication types in a fixed
//! priority (Bearer, then API key), and the first success becomes the request's
//! [`Identity`]. The role and permission guards then run against that identity.
//!
//! ```text
//! headers ──► Bearer? ──► ApiKey? ──► Identity ──► RolesGuard ──► PermissionsGuard
//!                 │           │
//!                 └─────┬─────┘
//!                       ▼
//!              all failed: Unauthorized
//! ```

use headers::authorization::Bearer as BearerToken;
use headers::{Authorization, HeaderMapExt};
use http::HeaderMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::api_key::{extract_api_key_from_headers, ApiKeyService};
use crate::error::{AuthError, AuthResult, ErrorKind};
use crate::jwt::TokenService;
use crate::repository::{ApiKeyRepository, UserRepository};
use crate::types::{AuthMethod, Identity, Permission, Role};

/// Authentication types a route can accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    /// No credential needed; authorization is skipped
    None,
    /// `Authorization: Bearer <access token>`
    Bearer,
    /// `Authorization: ApiKey <key>` or `X-API-Key`
    ApiKey,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bearer => write!(f, "bearer"),
            Self::ApiKey => write!(f, "api_key"),
        }
    }
}

/// Order in which credential types are attempted
const PRIORITY: [AuthType; 2] = [AuthType::Bearer, AuthType::ApiKey];

/// Statically declared access rules for a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequirements {
    /// Any one succeeding is sufficient
    pub auth: Vec<AuthType>,
    /// Identity role must be one of these (empty = any)
    pub roles: Vec<Role>,
    /// Identity must hold all of these
    pub permissions: Vec<Permission>,
}

impl Default for RouteRequirements {
    fn default() -> Self {
        Self::bearer()
    }
}

impl RouteRequirements {
    /// Accessible without credentials
    pub fn public() -> Self {
        Self::with_auth([AuthType::None])
    }

    pub fn bearer() -> Self {
        Self::with_auth([AuthType::Bearer])
    }

    pub fn api_key() -> Self {
        Self::with_auth([AuthType::ApiKey])
    }

    pub fn with_auth(auth: impl IntoIterator<Item = AuthType>) -> Self {
        Self {
            auth: auth.into_iter().collect(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_permissions<P: Into<Permission>>(mut self, permissions: impl IntoIterator<Item = P>) -> Self {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn accepts(&self, auth_type: AuthType) -> bool {
        self.auth.contains(&auth_type)
    }

    pub fn is_public(&self) -> bool {
        self.accepts(AuthType::None)
    }
}

/// Grants access iff the identity has one of the declared roles
pub struct RolesGuard;

impl RolesGuard {
    pub fn check(identity: Option<&Identity>, roles: &[Role]) -> AuthResult<()> {
        if roles.is_empty() {
            return Ok(());
        }
        let identity = identity.ok_or(AuthError::MissingIdentity)?;

        if identity.has_any_role(roles) {
            Ok(())
        } else {
            debug!(user_id = %identity.subject_id, role = %identity.role, "Role not accepted");
            Err(AuthError::InsufficientRole)
        }
    }
}

/// Grants access iff the identity holds every declared permission
pub struct PermissionsGuard;

impl PermissionsGuard {
    pub fn check(identity: Option<&Identity>, permissions: &[Permission]) -> AuthResult<()> {
        if permissions.is_empty() {
            return Ok(());
        }
        let identity = identity.ok_or(AuthError::MissingIdentity)?;

        if identity.has_all_permissions(permissions) {
            Ok(())
        } else {
            debug!(user_id = %identity.subject_id, "Missing required permissions");
            Err(AuthError::InsufficientPermissions)
        }
    }
}

/// Authenticates a request and applies the authorization guards
#[derive(Clone)]
pub struct GuardComposer {
    tokens: TokenService,
    api_keys: ApiKeyService,
    api_key_repo: Arc<dyn ApiKeyRepository>,
    users: Arc<dyn UserRepository>,
}

impl GuardComposer {
    pub fn new(
        tokens: TokenService,
        api_keys: ApiKeyService,
        api_key_repo: Arc<dyn ApiKeyRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            tokens,
            api_keys,
            api_key_repo,
            users,
        }
    }

    /// Establish the request identity and check it against `route`
    ///
    /// Returns `Ok(None)` only for public routes where no credential verified.
    /// Credential failures surface as `Unauthorized`, guard failures as
    /// `Forbidden` variants, storage failures unchanged.
    pub async fn verify_and_guard(
        &self,
        headers: &HeaderMap,
        route: &RouteRequirements,
    ) -> AuthResult<Option<Identity>> {
        let identity = self
            .authenticate(headers, route)
            .await
            .map_err(|e| e.into_public("verify_and_guard"))?;

        if route.is_public() {
            return Ok(identity);
        }

        RolesGuard::check(identity.as_ref(), &route.roles)?;
        PermissionsGuard::check(identity.as_ref(), &route.permissions)?;

        Ok(identity)
    }

    async fn authenticate(
        &self,
        headers: &HeaderMap,
        route: &RouteRequirements,
    ) -> AuthResult<Option<Identity>> {
        let mut last_failure = None;

        for auth_type in PRIORITY.into_iter().filter(|t| route.accepts(*t)) {
            let attempt = match auth_type {
                AuthType::Bearer => self.authenticate_bearer(headers).await,
                AuthType::ApiKey => self.authenticate_api_key(headers).await,
                AuthType::None => continue,
            };

            match attempt {
                Ok(identity) => return Ok(Some(identity)),
                Err(e) if e.kind() == ErrorKind::Internal => return Err(e),
                Err(e) => {
                    debug!(auth_type = %auth_type, reason = %e, "Authentication attempt failed");
                    last_failure = Some(e);
                }
            }
        }

        if route.is_public() {
            return Ok(None);
        }

        Err(last_failure.unwrap_or(AuthError::MissingCredentials))
    }

    async fn authenticate_bearer(&self, headers: &HeaderMap) -> AuthResult<Identity> {
        let Authorization(bearer) = headers
            .typed_get::<Authorization<BearerToken>>()
            .ok_or(AuthError::MissingCredentials)?;

        let claims = self.tokens.verify_access(bearer.token())?;
        Ok(Identity::from(claims))
    }

    async fn authenticate_api_key(&self, headers: &HeaderMap) -> AuthResult<Identity> {
        let raw_key = extract_api_key_from_headers(headers).ok_or(AuthError::MissingCredentials)?;
        let key_id = self.api_keys.extract_id(&raw_key)?;

        let record = self
            .api_key_repo
            .find_by_key_id(key_id)
            .await?
            .ok_or(AuthError::InvalidApiKey)?;
        self.api_keys.validate(&raw_key, &record.secret_hash)?;

        let owner = self
            .users
            .find_by_id(record.owner_user_id)
            .await?
            .ok_or_else(|| AuthError::SubjectNotFound(record.owner_user_id.to_string()))?;

        let mut identity = Identity::from_record(&owner, AuthMethod::ApiKey);
        identity.api_key_id = Some(key_id);
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::JwtConfig;
    use crate::repository::{MemoryApiKeyRepository, MemoryUserRepository, StoreError, StoreResult};
    use crate::types::{ApiKeyRecord, CredentialRecord};
    use async_trait::async_trait;
    use http::HeaderValue;
    use std::collections::HashSet;
    use uuid::Uuid;

    struct Fixture {
        composer: GuardComposer,
        tokens: TokenService,
        clock: ManualClock,
        users: MemoryUserRepository,
        keys: MemoryApiKeyRepository,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::default();
        let tokens = TokenService::new(
            JwtConfig {
                secret: "test-secret-key-for-jwt-tokens-min-32-bytes!".to_string(),
                ..JwtConfig::default()
            },
            Arc::new(clock.clone()),
        );
        let users = MemoryUserRepository::new();
        let keys = MemoryApiKeyRepository::new();
        let composer = GuardComposer::new(
            tokens.clone(),
            ApiKeyService::default(),
            Arc::new(keys.clone()),
            Arc::new(users.clone()),
        );

        Fixture {
            composer,
            tokens,
            clock,
            users,
            keys,
        }
    }

    fn identity(role: Role, permissions: &[&str]) -> Identity {
        Identity {
            subject_id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            role,
            permissions: permissions.iter().map(|p| Permission::from(*p)).collect(),
            auth_method: AuthMethod::Bearer,
            api_key_id: None,
        }
    }

    fn bearer_headers(tokens: &TokenService, identity: &Identity) -> HeaderMap {
        let issued = tokens.issue_pair(identity).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", issued.tokens.access_token)).unwrap(),
        );
        headers
    }

    fn api_key_headers(raw_key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", HeaderValue::from_str(raw_key).unwrap());
        headers
    }

    async fn user_with_key(f: &Fixture, permissions: &[&str]) -> (CredentialRecord, String) {
        let mut record = CredentialRecord::new("bot@x.com", "hash");
        record.permissions = permissions.iter().map(|p| Permission::from(*p)).collect();
        f.users.save(&record).await.unwrap();

        let issued = ApiKeyService::default().create_key(record.id);
        f.keys.save(&issued.record).await.unwrap();
        (record, issued.raw_key)
    }

    #[test]
    fn test_default_route_requires_bearer() {
        let route = RouteRequirements::default();
        assert_eq!(route.auth, vec![AuthType::Bearer]);
        assert!(!route.is_public());
        assert!(RouteRequirements::public().is_public());
    }

    #[test]
    fn test_roles_guard_is_or() {
        let roles = [Role::Regular, Role::Admin];
        assert!(RolesGuard::check(Some(&identity(Role::Regular, &[])), &roles).is_ok());
        assert!(RolesGuard::check(Some(&identity(Role::Admin, &[])), &roles).is_ok());
        assert!(matches!(
            RolesGuard::check(Some(&identity(Role::Regular, &[])), &[Role::Admin]),
            Err(AuthError::InsufficientRole)
        ));
        assert!(RolesGuard::check(Some(&identity(Role::Regular, &[])), &[]).is_ok());
    }

    #[test]
    fn test_permissions_guard_is_and() {
        let required: Vec<Permission> = vec!["a".into(), "b".into()];

        assert!(PermissionsGuard::check(Some(&identity(Role::Regular, &["a", "b"])), &required).is_ok());
        assert!(PermissionsGuard::check(Some(&identity(Role::Regular, &["a", "b", "c"])), &required).is_ok());
        assert!(matches!(
            PermissionsGuard::check(Some(&identity(Role::Regular, &["a"])), &required),
            Err(AuthError::InsufficientPermissions)
        ));
        // Admin gets no implicit grants
        assert!(PermissionsGuard::check(Some(&identity(Role::Admin, &[])), &required).is_err());
    }

    #[test]
    fn test_guards_fail_closed_without_identity() {
        assert!(matches!(
            RolesGuard::check(None, &[Role::Admin]),
            Err(AuthError::MissingIdentity)
        ));
        assert!(matches!(
            PermissionsGuard::check(None, &["a".into()]),
            Err(AuthError::MissingIdentity)
        ));
        assert!(RolesGuard::check(None, &[]).is_ok());
        assert!(PermissionsGuard::check(None, &[]).is_ok());
    }

    #[tokio::test]
    async fn test_bearer_route() {
        let f = fixture();
        let id = identity(Role::Regular, &["coffees:read"]);
        let headers = bearer_headers(&f.tokens, &id);

        let established = f
            .composer
            .verify_and_guard(&headers, &RouteRequirements::bearer())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(established, id);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_unauthorized() {
        let f = fixture();
        assert!(matches!(
            f.composer
                .verify_and_guard(&HeaderMap::new(), &RouteRequirements::bearer())
                .await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_unauthorized() {
        let f = fixture();
        let headers = bearer_headers(&f.tokens, &identity(Role::Regular, &[]));
        f.clock.advance(chrono::Duration::hours(2));

        assert!(matches!(
            f.composer
                .verify_and_guard(&headers, &RouteRequirements::bearer())
                .await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_public_route_never_rejects() {
        let f = fixture();
        let route = RouteRequirements::public().with_roles([Role::Admin]);

        assert_eq!(f.composer.verify_and_guard(&HeaderMap::new(), &route).await.unwrap(), None);

        let mut garbage = HeaderMap::new();
        garbage.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert_eq!(f.composer.verify_and_guard(&garbage, &route).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_public_route_still_establishes_identity() {
        let f = fixture();
        let id = identity(Role::Regular, &[]);
        let headers = bearer_headers(&f.tokens, &id);
        let route = RouteRequirements::with_auth([AuthType::None, AuthType::Bearer]);

        assert_eq!(f.composer.verify_and_guard(&headers, &route).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_api_key_route() {
        let f = fixture();
        let (owner, raw_key) = user_with_key(&f, &["coffees:create"]).await;

        let established = f
            .composer
            .verify_and_guard(&api_key_headers(&raw_key), &RouteRequirements::api_key())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(established.subject_id, owner.id);
        assert_eq!(established.auth_method, AuthMethod::ApiKey);
        assert!(established.api_key_id.is_some());
        assert_eq!(established.permissions, HashSet::from([Permission::new("coffees:create")]));
    }

    #[tokio::test]
    async fn test_tampered_api_key_is_unauthorized() {
        let f = fixture();
        let (_, raw_key) = user_with_key(&f, &[]).await;
        let tampered = format!("{}x", raw_key);

        assert!(matches!(
            f.composer
                .verify_and_guard(&api_key_headers(&tampered), &RouteRequirements::api_key())
                .await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_falls_back_to_api_key_when_bearer_fails() {
        let f = fixture();
        let (owner, raw_key) = user_with_key(&f, &[]).await;
        let mut headers = api_key_headers(&raw_key);
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer expired.or.bad"));

        let route = RouteRequirements::with_auth([AuthType::ApiKey, AuthType::Bearer]);
        let established = f.composer.verify_and_guard(&headers, &route).await.unwrap().unwrap();
        assert_eq!(established.subject_id, owner.id);
    }

    #[tokio::test]
    async fn test_bearer_takes_priority() {
        let f = fixture();
        let (_, raw_key) = user_with_key(&f, &[]).await;
        let id = identity(Role::Admin, &[]);
        let mut headers = bearer_headers(&f.tokens, &id);
        headers.insert("X-API-Key", HeaderValue::from_str(&raw_key).unwrap());

        let route = RouteRequirements::with_auth([AuthType::ApiKey, AuthType::Bearer]);
        let established = f.composer.verify_and_guard(&headers, &route).await.unwrap().unwrap();
        assert_eq!(established.auth_method, AuthMethod::Bearer);
        assert_eq!(established.subject_id, id.subject_id);
    }

    #[tokio::test]
    async fn test_api_key_route_ignores_bearer() {
        let f = fixture();
        let headers = bearer_headers(&f.tokens, &identity(Role::Admin, &[]));

        assert!(matches!(
            f.composer
                .verify_and_guard(&headers, &RouteRequirements::api_key())
                .await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_route_guards_after_authentication() {
        let f = fixture();
        let headers = bearer_headers(&f.tokens, &identity(Role::Regular, &["a"]));

        let admin_only = RouteRequirements::bearer().with_roles([Role::Admin]);
        assert!(matches!(
            f.composer.verify_and_guard(&headers, &admin_only).await,
            Err(AuthError::InsufficientRole)
        ));

        let needs_ab = RouteRequirements::bearer().with_permissions(["a", "b"]);
        assert!(matches!(
            f.composer.verify_and_guard(&headers, &needs_ab).await,
            Err(AuthError::InsufficientPermissions)
        ));

        let needs_a = RouteRequirements::bearer()
            .with_roles([Role::Regular, Role::Admin])
            .with_permissions(["a"]);
        assert!(f.composer.verify_and_guard(&headers, &needs_a).await.is_ok());
    }

    struct UnavailableKeys;

    #[async_trait]
    impl ApiKeyRepository for UnavailableKeys {
        async fn find_by_key_id(&self, _key_id: Uuid) -> StoreResult<Option<ApiKeyRecord>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn save(&self, _record: &ApiKeyRecord) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let f = fixture();
        let composer = GuardComposer::new(
            f.tokens.clone(),
            ApiKeyService::default(),
            Arc::new(UnavailableKeys),
            Arc::new(f.users.clone()),
        );
        let raw_key = ApiKeyService::default().create_key(Uuid::new_v4()).raw_key;

        assert!(matches!(
            composer
                .verify_and_guard(&api_key_headers(&raw_key), &RouteRequirements::api_key())
                .await,
            Err(AuthError::Storage(_))
        ));
    }
}
