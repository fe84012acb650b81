//! Postgres repositories
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE credentials (
//!     id            UUID PRIMARY KEY,
//!     email         TEXT NOT NULL UNIQUE,
//!     password_hash TEXT NOT NULL,
//!     role          TEXT NOT NULL DEFAULT 'regular',
//!     permissions   TEXT[] NOT NULL DEFAULT '{}',
//!     totp_enabled  BOOLEAN NOT NULL DEFAULT FALSE,
//!     totp_secret   TEXT
//! );
//!
//! CREATE TABLE api_keys (
//!     key_id        UUID PRIMARY KEY,
//!     secret_hash   TEXT NOT NULL,
//!     owner_user_id UUID NOT NULL REFERENCES credentials (id)
//! );
//! ```

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{ApiKeyRepository, StoreError, StoreResult, UserRepository};
use crate::types::{ApiKeyRecord, CredentialRecord, Permission, Role};

/// Postgres `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                StoreError::Duplicate(db_err.message().to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(err.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// User repository over the `credentials` table
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn credential_from_row(row: &PgRow) -> StoreResult<CredentialRecord> {
    let role: String = row.try_get("role")?;
    let permissions: Vec<String> = row.try_get("permissions")?;

    Ok(CredentialRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse::<Role>().map_err(StoreError::Serialization)?,
        permissions: permissions.into_iter().map(Permission::new).collect(),
        totp_enabled: row.try_get("totp_enabled")?,
        totp_secret: row.try_get("totp_secret")?,
    })
}

fn permission_names(record: &CredentialRecord) -> Vec<String> {
    let mut names: Vec<String> = record.permissions.iter().map(|p| p.to_string()).collect();
    names.sort();
    names
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<CredentialRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, role, permissions, totp_enabled, totp_secret
            FROM credentials
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(credential_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<CredentialRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, role, permissions, totp_enabled, totp_secret
            FROM credentials
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(credential_from_row).transpose()
    }

    async fn save(&self, record: &CredentialRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials
                (id, email, password_hash, role, permissions, totp_enabled, totp_secret)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.role.to_string())
        .bind(permission_names(record))
        .bind(record.totp_enabled)
        .bind(&record.totp_secret)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, record: &CredentialRecord) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE credentials
            SET email = $2, password_hash = $3, role = $4, permissions = $5,
                totp_enabled = $6, totp_secret = $7
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.role.to_string())
        .bind(permission_names(record))
        .bind(record.totp_enabled)
        .bind(&record.totp_secret)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("User {}", record.id)));
        }
        Ok(())
    }
}

/// API key repository over the `api_keys` table
#[derive(Clone)]
pub struct PgApiKeyRepository {
    pool: PgPool,
}

impl PgApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for PgApiKeyRepository {
    async fn find_by_key_id(&self, key_id: Uuid) -> StoreResult<Option<ApiKeyRecord>> {
        let row = sqlx::query(
            "SELECT key_id, secret_hash, owner_user_id FROM api_keys WHERE key_id = $1",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> StoreResult<ApiKeyRecord> {
            Ok(ApiKeyRecord {
                key_id: row.try_get("key_id")?,
                secret_hash: row.try_get("secret_hash")?,
                owner_user_id: row.try_get("owner_user_id")?,
            })
        })
        .transpose()
    }

    async fn save(&self, record: &ApiKeyRecord) -> StoreResult<()> {
        sqlx::query("INSERT INTO api_keys (key_id, secret_hash, owner_user_id) VALUES ($1, $2, $3)")
            .bind(record.key_id)
            .bind(&record.secret_hash)
            .bind(record.owner_user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
