//! In-memory repositories backed by `DashMap`

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiKeyRepository, StoreError, StoreResult, UserRepository};
use crate::types::{ApiKeyRecord, CredentialRecord};

/// Process-local user store with a unique email index
#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<DashMap<Uuid, CredentialRecord>>,
    emails: Arc<DashMap<String, Uuid>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Drop a user, as if deleted out of band
    pub fn remove(&self, id: Uuid) -> Option<CredentialRecord> {
        let (_, record) = self.users.remove(&id)?;
        self.emails.remove(&record.email);
        Some(record)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<CredentialRecord>> {
        let Some(id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|r| r.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<CredentialRecord>> {
        Ok(self.users.get(&id).map(|r| r.clone()))
    }

    async fn save(&self, record: &CredentialRecord) -> StoreResult<()> {
        // The email shard stays locked until the record is in place
        match self.emails.entry(record.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "Email {} already exists",
                record.email
            ))),
            Entry::Vacant(slot) => {
                self.users.insert(record.id, record.clone());
                slot.insert(record.id);
                Ok(())
            }
        }
    }

    async fn update(&self, record: &CredentialRecord) -> StoreResult<()> {
        let previous_email = self
            .users
            .get(&record.id)
            .map(|r| r.email.clone())
            .ok_or_else(|| StoreError::NotFound(format!("User {}", record.id)))?;

        if previous_email != record.email {
            match self.emails.entry(record.email.clone()) {
                Entry::Occupied(_) => {
                    return Err(StoreError::Duplicate(format!(
                        "Email {} already exists",
                        record.email
                    )))
                }
                Entry::Vacant(slot) => {
                    slot.insert(record.id);
                }
            }
            self.emails.remove(&previous_email);
        }

        self.users.insert(record.id, record.clone());
        Ok(())
    }
}

/// Process-local API key store
#[derive(Clone, Default)]
pub struct MemoryApiKeyRepository {
    keys: Arc<DashMap<Uuid, ApiKeyRecord>>,
}

impl MemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryApiKeyRepository {
    async fn find_by_key_id(&self, key_id: Uuid) -> StoreResult<Option<ApiKeyRecord>> {
        Ok(self.keys.get(&key_id).map(|r| r.clone()))
    }

    async fn save(&self, record: &ApiKeyRecord) -> StoreResult<()> {
        match self.keys.entry(record.key_id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("API key {}", record.key_id))),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }
}
