//! Credential lookup collaborator.
//!
//! The relational user table lives outside this crate; the core only needs to
//! read a subject's password hash, insert new users and upgrade stale hashes.
use std::fmt;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;

/// Stored credentials of one subject
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub subject: String,
    /// Encoded PHC string; never logged
    pub password_hash: String,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("subject", &self.subject)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserStoreError {
    #[error("subject not found")]
    NotFound,

    #[error("subject already exists")]
    AlreadyExists,

    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_credential_record(&self, subject: &str)
        -> Result<CredentialRecord, UserStoreError>;

    /// Insert a new subject; fails with `AlreadyExists` if taken
    async fn insert_credential_record(&self, record: CredentialRecord)
        -> Result<(), UserStoreError>;

    /// Replace the stored hash of an existing subject
    async fn update_password_hash(
        &self,
        subject: &str,
        password_hash: String,
    ) -> Result<(), UserStoreError>;
}

/// In-memory user store for tests and local tooling
#[derive(Default)]
pub struct MemoryUserStore {
    records: DashMap<String, String>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_credential_record(
        &self,
        subject: &str,
    ) -> Result<CredentialRecord, UserStoreError> {
        self.records
            .get(subject)
            .map(|hash| CredentialRecord {
                subject: subject.to_string(),
                password_hash: hash.clone(),
            })
            .ok_or(UserStoreError::NotFound)
    }

    async fn insert_credential_record(
        &self,
        record: CredentialRecord,
    ) -> Result<(), UserStoreError> {
        match self.records.entry(record.subject) {
            Entry::Occupied(_) => Err(UserStoreError::AlreadyExists),
            Entry::Vacant(vacant) => {
                vacant.insert(record.password_hash);
                Ok(())
            },
        }
    }

    async fn update_password_hash(
        &self,
        subject: &str,
        password_hash: String,
    ) -> Result<(), UserStoreError> {
        match self.records.get_mut(subject) {
            Some(mut hash) => {
                *hash = password_hash;
                Ok(())
            },
            None => Err(UserStoreError::NotFound),
        }
    }
}
