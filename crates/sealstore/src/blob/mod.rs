//! Object blob store contract.
//!
//! Each revision of a stored object owns two blobs: the sealed payload under
//! `"<objectID>/<revision>/payload"` and the caller's associated data under
//! `"<objectID>/<revision>/aad"`. A revision is written once and never
//! overwritten; the access record names the current one. Blobs are opaque
//! to the store.

pub mod memory;

pub use memory::MemoryBlobStore;

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::identity::ObjectId;

/// Errors surfaced by a blob backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob store failure: {0}")]
    Internal(String),
}

/// Key of the sealed payload blob for `id` at `revision`.
pub fn payload_key(id: ObjectId, revision: Uuid) -> String {
    format!("{id}/{revision}/payload")
}

/// Key of the associated-data blob for `id` at `revision`.
pub fn aad_key(id: ObjectId, revision: Uuid) -> String {
    format!("{id}/{revision}/aad")
}

/// Keyed byte storage for object payloads.
#[cfg_attr(test, mockall::automock)]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `key`, replacing any previous value.
    fn store(&self, key: &str, data: Bytes) -> Result<(), BlobError>;

    fn retrieve(&self, key: &str) -> Result<Bytes, BlobError>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), BlobError>;
}
