//! In-process store adapters.
//!
//! Both stores keep their rows behind a single `Mutex`, which gives the same
//! per-row atomicity the Postgres adapter gets from its transaction: a
//! rotation checks and flips the revoked flag under one lock.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{CredentialStore, RefreshTokenRecord, StoreError, TokenLedger, TokenState, User};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(&self, user: &User) -> Result<User, StoreError> {
        let mut users = lock(&self.users)?;
        if users.contains_key(&user.username) {
            return Err(StoreError::UniqueViolation);
        }
        users.insert(user.username.clone(), user.clone());
        Ok(user.clone())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users)?.get(username).cloned())
    }
}

/// Refresh token ledger keyed by token hash.
#[derive(Debug, Default)]
pub struct MemoryTokenLedger {
    records: Mutex<HashMap<String, RefreshTokenRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryTokenLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`]
    /// until switched off again. Reads keep working.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of a stored record, for inspection.
    pub fn get(&self, hashed_token: &str) -> Option<RefreshTokenRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(hashed_token).cloned())
    }

    /// Number of records held, revoked ones included.
    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenLedger for MemoryTokenLedger {
    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut records = lock(&self.records)?;
        if records.contains_key(&record.hashed_token) {
            return Err(StoreError::UniqueViolation);
        }
        records.insert(record.hashed_token.clone(), record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, hashed_token: &str) -> Result<Option<TokenState>, StoreError> {
        Ok(lock(&self.records)?
            .get(hashed_token)
            .map(|record| TokenState {
                user_id: record.user_id,
                revoked: record.revoked,
                expires_at: record.expires_at,
            }))
    }

    async fn revoke_by_hash(&self, hashed_token: &str) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut records = lock(&self.records)?;
        match records.get_mut(hashed_token) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                record.last_used_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate(
        &self,
        hashed_token: &str,
        replacement: &RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut records = lock(&self.records)?;

        match records.get(hashed_token) {
            Some(current) if !current.revoked => {}
            _ => return Ok(false),
        }
        if records.contains_key(&replacement.hashed_token) {
            return Err(StoreError::UniqueViolation);
        }

        records.insert(replacement.hashed_token.clone(), replacement.clone());
        if let Some(current) = records.get_mut(hashed_token) {
            current.revoked = true;
            current.last_used_at = Some(Utc::now());
        }
        Ok(true)
    }
}
