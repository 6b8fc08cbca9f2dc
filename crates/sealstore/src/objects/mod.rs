//! Object operations: the composition of access control, payload encryption
//! and blob I/O behind each client request.
//!
//! Every call takes the authenticated principal explicitly and runs its
//! storage work in one transaction. The payload is sealed under the object's
//! data key with associated data `objectID || aad`, so neither blob can be
//! moved to another object or paired with different metadata.
//!
//! Blobs are never overwritten. Each write lands under a fresh revision and
//! the access record, updated by compare-and-swap, names the live one, so a
//! reader always sees a matching payload and aad pair.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{AccessEngine, AccessError};
use crate::blob::{aad_key, payload_key, BlobError, BlobStore};
use crate::crypto::{CryptoError, Cryptors, DataKey, EnvelopeCryptor};
use crate::identity::{ObjectId, PrincipalId};
use crate::storage::{with_transaction, Database, StorageError, Transaction};

/// Errors produced by object operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl From<StorageError> for ObjectError {
    fn from(err: StorageError) -> Self {
        ObjectError::Access(err.into())
    }
}

/// A decrypted object as returned to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub plaintext: Vec<u8>,
    pub associated_data: Vec<u8>,
}

pub struct ObjectService<D> {
    db: D,
    access: AccessEngine,
    payload: Arc<EnvelopeCryptor>,
    blobs: Arc<dyn BlobStore>,
}

impl<D: Database> ObjectService<D> {
    pub fn new(db: D, cryptors: &Cryptors, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            access: AccessEngine::new(cryptors),
            payload: Arc::clone(&cryptors.payload),
            blobs,
        }
    }

    /// Create an object readable only by `principal`.
    ///
    /// On any failure the access record is rolled back and whatever blobs
    /// were written are removed again.
    pub fn store(
        &self,
        principal: PrincipalId,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<ObjectId, ObjectError> {
        let object_id = ObjectId::new();
        let mut written = None;
        let result: Result<(), ObjectError> = with_transaction(&self.db, |tx| {
            let wrapped = self
                .access
                .create_access_object(tx, object_id, principal)?;
            let revision = self.access.fetch_access_object(tx, object_id)?.revision;
            let key = self.payload.unwrap_key(&wrapped)?;
            written = Some(revision);
            self.write_blobs(object_id, revision, &key, plaintext, aad)
        });
        if let Err(e) = result {
            warn!(object_id = %object_id, error = %e, "store failed; discarding blobs");
            if let Some(revision) = written {
                self.discard_blobs(object_id, revision);
            }
            return Err(e);
        }
        info!(object_id = %object_id, principal = %principal, "object stored");
        Ok(object_id)
    }

    pub fn retrieve(
        &self,
        principal: PrincipalId,
        object_id: ObjectId,
    ) -> Result<Retrieved, ObjectError> {
        let tx = self.db.begin();
        let outcome = self.read(&tx, principal, object_id);
        tx.rollback();
        outcome
    }

    /// Replace an object's payload and associated data, keeping its data key.
    ///
    /// The new content is written under a fresh revision and the access
    /// record is switched to it in the same transaction. Until that commits
    /// the previous revision stays current; on failure the new blobs are
    /// removed, on success the previous ones are.
    pub fn update(
        &self,
        principal: PrincipalId,
        object_id: ObjectId,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(), ObjectError> {
        let revision = Uuid::new_v4();
        let mut written = false;
        let result: Result<Uuid, ObjectError> = with_transaction(&self.db, |tx| {
            let record = self.access.authorize(tx, object_id, principal)?;
            let key = self.access.object_key(&record)?;
            written = true;
            self.write_blobs(object_id, revision, &key, plaintext, aad)?;
            self.access.set_revision(tx, object_id, revision)?;
            Ok(record.revision)
        });
        match result {
            Ok(previous) => {
                self.discard_blobs(object_id, previous);
                info!(object_id = %object_id, principal = %principal, "object updated");
                Ok(())
            }
            Err(e) => {
                if written {
                    warn!(object_id = %object_id, error = %e, "update failed; discarding blobs");
                    self.discard_blobs(object_id, revision);
                }
                Err(e)
            }
        }
    }

    /// Delete an object. Deleting an object that no longer exists succeeds.
    pub fn delete(&self, principal: PrincipalId, object_id: ObjectId) -> Result<(), ObjectError> {
        let deleted = with_transaction(&self.db, |tx| {
            let record = match self.access.authorize(tx, object_id, principal) {
                Ok(record) => record,
                Err(AccessError::NotFound) => return Ok(None),
                Err(e) => return Err(ObjectError::from(e)),
            };
            self.access.delete_access_object(tx, object_id)?;
            Ok(Some(record.revision))
        })?;
        if let Some(revision) = deleted {
            // The data key went with the access record, so leftovers are unreadable.
            self.discard_blobs(object_id, revision);
            info!(object_id = %object_id, principal = %principal, "object deleted");
        }
        Ok(())
    }

    /// Grant `target` access. `principal` must already hold access.
    pub fn add_permission(
        &self,
        principal: PrincipalId,
        object_id: ObjectId,
        target: PrincipalId,
    ) -> Result<(), ObjectError> {
        with_transaction(&self.db, |tx| {
            self.access.authorize(tx, object_id, principal)?;
            self.access.add_permission(tx, object_id, target)?;
            Ok(())
        })
    }

    /// Revoke `target`'s access, which may be `principal` itself.
    pub fn remove_permission(
        &self,
        principal: PrincipalId,
        object_id: ObjectId,
        target: PrincipalId,
    ) -> Result<(), ObjectError> {
        with_transaction(&self.db, |tx| {
            self.access.authorize(tx, object_id, principal)?;
            self.access.remove_permission(tx, object_id, target)?;
            Ok(())
        })
    }

    /// The principals currently holding access, in identifier order.
    pub fn permissions(
        &self,
        principal: PrincipalId,
        object_id: ObjectId,
    ) -> Result<Vec<PrincipalId>, ObjectError> {
        let tx = self.db.begin();
        let outcome = self.access.authorize(&tx, object_id, principal);
        tx.rollback();
        Ok(outcome?.principals.into_iter().collect())
    }

    fn read(
        &self,
        tx: &D::Tx,
        principal: PrincipalId,
        object_id: ObjectId,
    ) -> Result<Retrieved, ObjectError> {
        let record = self.access.authorize(tx, object_id, principal)?;
        let key = self.access.object_key(&record)?;
        let sealed = self.blobs.retrieve(&payload_key(object_id, record.revision))?;
        let associated_data = self
            .blobs
            .retrieve(&aad_key(object_id, record.revision))?
            .to_vec();
        let plaintext = self.payload.decrypt_with_key(
            &sealed,
            &bound_aad(object_id, &associated_data),
            &key,
        )?;
        Ok(Retrieved {
            plaintext,
            associated_data,
        })
    }

    fn write_blobs(
        &self,
        object_id: ObjectId,
        revision: Uuid,
        key: &DataKey,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(), ObjectError> {
        let sealed =
            self.payload
                .encrypt_with_key(plaintext, &bound_aad(object_id, aad), key)?;
        self.blobs
            .store(&payload_key(object_id, revision), Bytes::from(sealed))?;
        self.blobs
            .store(&aad_key(object_id, revision), Bytes::copy_from_slice(aad))?;
        Ok(())
    }

    fn discard_blobs(&self, object_id: ObjectId, revision: Uuid) {
        for key in [payload_key(object_id, revision), aad_key(object_id, revision)] {
            if let Err(e) = self.blobs.delete(&key) {
                warn!(blob = %key, error = %e, "failed to delete blob");
            }
        }
    }
}

fn bound_aad(object_id: ObjectId, aad: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + aad.len());
    out.extend_from_slice(object_id.as_bytes());
    out.extend_from_slice(aad);
    out
}
