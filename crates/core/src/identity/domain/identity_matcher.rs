use thiserror::Error;

use crate::detection::domain::face_encoder::Embedding;
use crate::identity::domain::identity::{Identity, IdentityMatch, IdentityRecord};

#[derive(Error, Debug)]
pub enum IdentityStoreError {
    #[error("an identity with roll number {0} already exists")]
    DuplicateId(String),
    #[error("identity store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored embedding for {0} is corrupt")]
    CorruptEmbedding(String),
    #[error("identity store lock poisoned")]
    LockPoisoned,
}

/// The registered-identity store as seen by the pipelines.
///
/// Implementations must make every call atomic with respect to the others:
/// a match never sees a half-written identity.
pub trait IdentityMatcher: Send + Sync {
    /// Nearest identity within the store's tolerance, or `None`.
    fn find_match(&self, embedding: &Embedding) -> Result<Option<IdentityMatch>, IdentityStoreError>;

    /// Fails with [`IdentityStoreError::DuplicateId`] if the roll number is taken.
    fn enroll(&self, identity: Identity) -> Result<(), IdentityStoreError>;

    /// Returns whether a record was removed.
    fn remove(&self, roll_no: &str) -> Result<bool, IdentityStoreError>;

    fn contains(&self, roll_no: &str) -> Result<bool, IdentityStoreError>;

    fn record(&self, roll_no: &str) -> Result<Option<IdentityRecord>, IdentityStoreError>;

    /// Sets the snapshot reference of an identity that has none yet.
    /// Returns whether the record changed.
    fn attach_snapshot(&self, roll_no: &str, snapshot_ref: &str) -> Result<bool, IdentityStoreError>;

    /// All identities ordered by name.
    fn list(&self) -> Result<Vec<IdentityRecord>, IdentityStoreError>;

    fn count(&self) -> Result<usize, IdentityStoreError>;
}
