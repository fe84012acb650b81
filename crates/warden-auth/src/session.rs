//! Refresh Session Store
//!
//! Tracks the single live refresh-token id of each subject and backs reuse
//! detection:
//! - `insert` overwrites (rotation)
//! - `redeem` atomically checks and retires the presented id
//! - any mismatch clears the session so the subject must sign in again
//!
//! The in-memory store is only correct for a single process. Multi-instance
//! deployments need an implementation over a shared store with atomic
//! per-key compare-and-delete.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AuthResult;

/// Outcome of redeeming a refresh-token id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    /// Id matched and has been retired
    Rotated,
    /// Id did not match the live one; the session has been cleared
    Reused,
    /// Subject had no live session
    Missing,
}

/// Storage of `subject -> current refresh-token id`
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Record `refresh_token_id` as the subject's only live session
    async fn insert(&self, subject_id: Uuid, refresh_token_id: Uuid) -> AuthResult<()>;

    /// True iff the stored id equals `refresh_token_id`
    async fn validate(&self, subject_id: Uuid, refresh_token_id: Uuid) -> AuthResult<bool>;

    /// Clear the subject's session
    async fn invalidate(&self, subject_id: Uuid) -> AuthResult<()>;

    /// Validate and invalidate as one atomic step for this subject
    async fn redeem(&self, subject_id: Uuid, refresh_token_id: Uuid) -> AuthResult<Redemption>;
}

/// Process-local refresh session store
#[derive(Clone, Default)]
pub struct InMemoryRefreshStore {
    sessions: Arc<DashMap<Uuid, Uuid>>,
}

impl InMemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subjects with a live session
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshStore {
    async fn insert(&self, subject_id: Uuid, refresh_token_id: Uuid) -> AuthResult<()> {
        self.sessions.insert(subject_id, refresh_token_id);
        Ok(())
    }

    async fn validate(&self, subject_id: Uuid, refresh_token_id: Uuid) -> AuthResult<bool> {
        Ok(self
            .sessions
            .get(&subject_id)
            .map(|stored| *stored == refresh_token_id)
            .unwrap_or(false))
    }

    async fn invalidate(&self, subject_id: Uuid) -> AuthResult<()> {
        self.sessions.remove(&subject_id);
        Ok(())
    }

    async fn redeem(&self, subject_id: Uuid, refresh_token_id: Uuid) -> AuthResult<Redemption> {
        // The entry holds the shard lock for the whole check-and-remove
        let outcome = match self.sessions.entry(subject_id) {
            Entry::Occupied(entry) => {
                let matched = *entry.get() == refresh_token_id;
                entry.remove();
                if matched {
                    Redemption::Rotated
                } else {
                    Redemption::Reused
                }
            }
            Entry::Vacant(_) => Redemption::Missing,
        };
        Ok(outcome)
    }
}
