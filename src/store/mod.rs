//! Persistence contracts consumed by the auth engine.
//!
//! The engine never talks to a database directly. It holds a
//! [`CredentialStore`] for user identities and a [`TokenLedger`] for refresh
//! token records, both as trait objects, so the Postgres adapters can be
//! swapped for the in-memory ones in tests.
//!
//! Only the one-way hash of a refresh secret ever reaches a ledger; the raw
//! value is handed back to the caller once and then forgotten.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCredentialStore, MemoryTokenLedger};
pub use postgres::{PgCredentialStore, PgTokenLedger};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("database error")]
    Database(#[source] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        if is_unique_violation(&error) {
            Self::UniqueViolation
        } else {
            Self::Database(error)
        }
    }
}

/// SQLSTATE 23505 is Postgres' `unique_violation`.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// A registered identity.
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// PHC-formatted Argon2id hash.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"***")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// One row of the refresh token ledger.
///
/// Records are never deleted, only flagged revoked, so the ledger doubles as
/// an audit trail of every session a user has held.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Lowercase hex SHA-256 of the raw secret.
    pub hashed_token: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub device_info: String,
    pub ip_address: Option<IpAddr>,
}

impl RefreshTokenRecord {
    /// Usable while not revoked and strictly before its expiry.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// The subset of a ledger row the rotation protocol needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenState {
    pub user_id: Uuid,
    pub revoked: bool,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a new user and return it as stored.
    ///
    /// A taken username surfaces as [`StoreError::UniqueViolation`].
    async fn create(&self, user: &User) -> Result<User, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find_by_hash(&self, hashed_token: &str) -> Result<Option<TokenState>, StoreError>;

    /// Flag a record revoked. Returns `true` only if this call flipped it.
    async fn revoke_by_hash(&self, hashed_token: &str) -> Result<bool, StoreError>;

    /// Atomically persist `replacement` and revoke the record behind
    /// `hashed_token`.
    ///
    /// Returns `Ok(false)` without writing anything when the old record is
    /// already revoked, which is how a concurrent duplicate presentation
    /// loses the race. On `Err` nothing has been written either.
    async fn rotate(
        &self,
        hashed_token: &str,
        replacement: &RefreshTokenRecord,
    ) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
