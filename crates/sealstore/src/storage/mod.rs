//! Storage transaction contract consumed by the identity and access engines.
//!
//! Rows hold only [`Sealed`] envelopes plus the plaintext columns the engine
//! needs to address them (identifier, ACL version, soft-delete marker).
//!
//! # Module invariants
//!
//! - Every method reports an absent target row as [`StorageError::NotFound`].
//! - Nothing becomes visible to other transactions before [`Transaction::commit`].
//! - Dropping a transaction without committing is a rollback.

pub mod memory;

pub use memory::MemoryDatabase;

use thiserror::Error;

use crate::crypto::Sealed;
use crate::identity::{ObjectId, PrincipalId};

/// Errors surfaced by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The targeted row does not exist (or was soft-deleted).
    #[error("row not found")]
    NotFound,

    /// Duplicate insert, or the row changed since it was read.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Any other backend failure.
    #[error("storage failure: {0}")]
    Internal(String),
}

/// A persisted access-control row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessObjectRow {
    /// Mirrors the version inside the sealed record; used for compare-and-swap.
    pub version: u64,
    pub sealed: Sealed,
}

/// One unit of atomic work against the backing store.
pub trait Transaction {
    fn commit(self) -> Result<(), StorageError>
    where
        Self: Sized;

    fn rollback(self)
    where
        Self: Sized;

    fn insert_user(&mut self, id: PrincipalId, data: Sealed) -> Result<(), StorageError>;
    fn update_user(&mut self, id: PrincipalId, data: Sealed) -> Result<(), StorageError>;
    /// Soft delete: the row is kept with a deletion timestamp.
    fn remove_user(&mut self, id: PrincipalId) -> Result<(), StorageError>;
    fn get_user_data(&self, id: PrincipalId) -> Result<Sealed, StorageError>;

    fn insert_group(&mut self, id: PrincipalId, data: Sealed) -> Result<(), StorageError>;
    fn group_exists(&self, id: PrincipalId) -> Result<bool, StorageError>;
    /// Fetch every group in `ids` that exists; absent groups are skipped.
    fn get_group_data_batch(
        &self,
        ids: &[PrincipalId],
    ) -> Result<Vec<(PrincipalId, Sealed)>, StorageError>;

    fn insert_access_object(
        &mut self,
        id: ObjectId,
        row: AccessObjectRow,
    ) -> Result<(), StorageError>;
    fn get_access_object(&self, id: ObjectId) -> Result<AccessObjectRow, StorageError>;
    /// Replace the row only if its stored version equals `expected_version`.
    fn update_access_object(
        &mut self,
        id: ObjectId,
        expected_version: u64,
        row: AccessObjectRow,
    ) -> Result<(), StorageError>;
    /// Remove the row only if its stored version equals `expected_version`.
    fn delete_access_object(
        &mut self,
        id: ObjectId,
        expected_version: u64,
    ) -> Result<(), StorageError>;
}

/// A backend able to open transactions.
pub trait Database: Send + Sync {
    type Tx: Transaction;

    fn begin(&self) -> Self::Tx;
}

/// Run `f` inside a fresh transaction: commit on `Ok`, roll back on `Err`.
///
/// A failed commit is reported through `E` like any other storage error.
pub fn with_transaction<D, F, R, E>(db: &D, f: F) -> Result<R, E>
where
    D: Database + ?Sized,
    F: FnOnce(&mut D::Tx) -> Result<R, E>,
    E: From<StorageError>,
{
    let mut tx = db.begin();
    match f(&mut tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback();
            Err(e)
        }
    }
}
