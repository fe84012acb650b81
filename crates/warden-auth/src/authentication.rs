//! Authentication Service
//!
//! Account-level flows built on the lower-level services:
//! - sign-up / sign-in (with optional TOTP second factor)
//! - refresh-token rotation with reuse detection
//! - two-factor enrollment
//!
//! Every public method logs the precise failure and returns
//! [`AuthError::into_public`], so callers only ever see a generic
//! `Unauthorized` for credential problems.

use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::jwt::TokenService;
use crate::password::HashingProvider;
use crate::repository::UserRepository;
use crate::session::{Redemption, RefreshTokenStore};
use crate::totp::TotpService;
use crate::types::{AuthMethod, CredentialRecord, Identity, SignIn, TokenPair, TotpEnrollment};

/// Hashed once and verified against when the email is unknown
const DUMMY_PASSWORD: &str = "warden-timing-equalizer";

/// Sign-up, sign-in, refresh and 2FA flows
#[derive(Clone)]
pub struct AuthenticationService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn HashingProvider>,
    tokens: TokenService,
    totp: TotpService,
    sessions: Arc<dyn RefreshTokenStore>,
    dummy_hash: Arc<OnceLock<Option<String>>>,
}

impl AuthenticationService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn HashingProvider>,
        tokens: TokenService,
        totp: TotpService,
        sessions: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            totp,
            sessions,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Register a new account and return its id
    ///
    /// Fails with `Conflict` if the email is already registered and with
    /// `InvalidRegistration` (400) for an empty email or a password of
    /// unacceptable length.
    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<Uuid> {
        self.sign_up_inner(email, password)
            .await
            .map_err(|e| match e {
                AuthError::MalformedInput(reason) => AuthError::InvalidRegistration(reason),
                other => other,
            })
            .map_err(|e| e.into_public("sign_up"))
    }

    /// Authenticate with email, password and (if enabled) a TOTP code
    ///
    /// An unknown email still pays for one password verification, so response
    /// time does not reveal whether the account exists.
    pub async fn sign_in(&self, request: SignIn) -> AuthResult<TokenPair> {
        self.sign_in_inner(request)
            .await
            .map_err(|e| e.into_public("sign_in"))
    }

    /// Redeem a refresh token for a new pair
    ///
    /// The presented token is retired whether or not it was current. A stale
    /// token clears the subject's session so that the holder of the newest
    /// token must sign in again too.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        self.refresh_tokens_inner(refresh_token)
            .await
            .map_err(|e| e.into_public("refresh_tokens"))
    }

    /// Drop the subject's refresh session
    pub async fn sign_out(&self, subject_id: Uuid) -> AuthResult<()> {
        self.sessions
            .invalidate(subject_id)
            .await
            .map_err(|e| e.into_public("sign_out"))?;

        info!(user_id = %subject_id, "User signed out");
        Ok(())
    }

    /// Fresh TOTP secret and enrollment URI for a subject; nothing is stored
    pub async fn generate_two_factor_enrollment(&self, subject_id: Uuid) -> AuthResult<TotpEnrollment> {
        let record = self
            .load_subject(subject_id)
            .await
            .map_err(|e| e.into_public("generate_two_factor_enrollment"))?;

        Ok(self.totp.generate_secret(&record.email))
    }

    /// Persist `secret` against the user and turn 2FA on
    pub async fn enable_two_factor(&self, email: &str, secret: &str) -> AuthResult<()> {
        self.enable_two_factor_inner(email, secret)
            .await
            .map_err(|e| e.into_public("enable_two_factor"))
    }

    /// Check a first code from the authenticator app, then enable 2FA
    pub async fn confirm_two_factor(&self, subject_id: Uuid, secret: &str, code: &str) -> AuthResult<()> {
        async {
            let record = self.load_subject(subject_id).await?;
            if !self.totp.verify_code(code, secret) {
                return Err(AuthError::InvalidTwoFactorCode);
            }
            self.enable_two_factor_inner(&record.email, secret).await
        }
        .await
        .map_err(|e| e.into_public("confirm_two_factor"))
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn totp(&self) -> &TotpService {
        &self.totp
    }

    pub fn sessions(&self) -> &Arc<dyn RefreshTokenStore> {
        &self.sessions
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    async fn sign_up_inner(&self, email: &str, password: &str) -> AuthResult<Uuid> {
        let email = normalize_email(email)?;
        let password_hash = self.hasher.hash(password)?;

        let record = CredentialRecord::new(email, password_hash);
        self.users.save(&record).await?;

        info!(user_id = %record.id, email = %record.email, "New user registered");
        Ok(record.id)
    }

    async fn sign_in_inner(&self, request: SignIn) -> AuthResult<TokenPair> {
        let email = normalize_email(&request.email)?;

        let Some(record) = self.users.find_by_email(&email).await? else {
            self.verify_against_dummy(&request.password);
            return Err(AuthError::UnknownUser);
        };

        if !self.hasher.verify(&request.password, &record.password_hash)? {
            return Err(AuthError::InvalidPassword);
        }

        if record.totp_enabled {
            let code = request
                .totp_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or(AuthError::TwoFactorRequired)?;
            let secret = record
                .totp_secret
                .as_deref()
                .ok_or(AuthError::InvalidTwoFactorCode)?;

            if !self.totp.verify_code(code, secret) {
                return Err(AuthError::InvalidTwoFactorCode);
            }
        }

        let tokens = self
            .issue_and_store(&Identity::from_record(&record, AuthMethod::Bearer))
            .await?;

        info!(user_id = %record.id, email = %record.email, "User signed in");
        Ok(tokens)
    }

    async fn refresh_tokens_inner(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let record = self.load_subject(claims.sub).await?;

        match self.sessions.redeem(claims.sub, claims.refresh_token_id).await? {
            Redemption::Rotated => {
                let tokens = self
                    .issue_and_store(&Identity::from_record(&record, AuthMethod::Bearer))
                    .await?;
                info!(user_id = %record.id, "Refresh token rotated");
                Ok(tokens)
            }
            Redemption::Reused => {
                warn!(
                    user_id = %record.id,
                    refresh_token_id = %claims.refresh_token_id,
                    "Refresh token reuse detected, session revoked"
                );
                Err(AuthError::RefreshTokenReused)
            }
            Redemption::Missing => Err(AuthError::RefreshTokenReused),
        }
    }

    async fn enable_two_factor_inner(&self, email: &str, secret: &str) -> AuthResult<()> {
        // Reject secrets no code could ever be derived from
        self.totp.current_code(secret)?;

        let email = normalize_email(email)?;
        let mut record = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        record.totp_secret = Some(secret.to_string());
        record.totp_enabled = true;
        self.users.update(&record).await?;

        info!(user_id = %record.id, "Two-factor authentication enabled");
        Ok(())
    }

    fn verify_against_dummy(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_init(|| self.hasher.hash(DUMMY_PASSWORD).ok());
        if let Some(hash) = dummy {
            let _ = self.hasher.verify(password, hash);
        }
    }

    async fn load_subject(&self, subject_id: Uuid) -> AuthResult<CredentialRecord> {
        self.users
            .find_by_id(subject_id)
            .await?
            .ok_or_else(|| AuthError::SubjectNotFound(subject_id.to_string()))
    }

    /// Sign a pair and record its refresh id as the subject's only session
    async fn issue_and_store(&self, identity: &Identity) -> AuthResult<TokenPair> {
        let issued = self.tokens.issue_pair(identity)?;
        self.sessions
            .insert(identity.subject_id, issued.refresh_token_id)
            .await?;
        Ok(issued.tokens)
    }
}

fn normalize_email(email: &str) -> AuthResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::MalformedInput("email must not be empty".to_string()));
    }
    Ok(email)
}
