//! Storage collaborators
//!
//! The core never talks to a database directly. It consumes these traits,
//! which hosts implement over their storage engine. In-memory implementations
//! are provided for tests and single-process deployments, and Postgres ones
//! behind the `postgres` feature.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ApiKeyRecord, CredentialRecord};

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::{MemoryApiKeyRepository, MemoryUserRepository};
#[cfg(feature = "postgres")]
pub use postgres::{PgApiKeyRepository, PgUserRepository};

/// Repository operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation
    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations
pub type StoreResult<T> = Result<T, StoreError>;

/// User credential storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<CredentialRecord>>;

    /// `Ok(None)` when absent; `Err` only when the store itself failed
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<CredentialRecord>>;

    /// Insert a new record; `Duplicate` if the email is taken
    async fn save(&self, record: &CredentialRecord) -> StoreResult<()>;

    /// Replace an existing record; `NotFound` if there is none
    async fn update(&self, record: &CredentialRecord) -> StoreResult<()>;
}

/// API key storage
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn find_by_key_id(&self, key_id: Uuid) -> StoreResult<Option<ApiKeyRecord>>;

    async fn save(&self, record: &ApiKeyRecord) -> StoreResult<()>;
}
