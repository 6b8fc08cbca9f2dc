//! [`AccessEngine`]: lifecycle of per-object access-control records.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::record::AccessObject;
use crate::crypto::{CryptoError, Cryptors, DataKey, EnvelopeCryptor, Sealed};
use crate::identity::{ObjectId, PrincipalId};
use crate::storage::{AccessObjectRow, StorageError, Transaction};

/// Errors produced by the access-control layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The principal is not in the record. Carries nothing else.
    #[error("access denied")]
    Denied,

    #[error("access object not found")]
    NotFound,

    /// The record changed after it was read.
    #[error("access object changed concurrently: {0}")]
    Conflict(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("record encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for AccessError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => AccessError::NotFound,
            StorageError::Conflict(msg) => AccessError::Conflict(msg),
            other => AccessError::Storage(other),
        }
    }
}

/// Gatekeeper for object data keys.
///
/// Records are sealed under the access domain with the object ID as
/// associated data; the object data keys they carry are wrapped under the
/// payload domain.
#[derive(Debug, Clone)]
pub struct AccessEngine {
    access: Arc<EnvelopeCryptor>,
    payload: Arc<EnvelopeCryptor>,
}

impl AccessEngine {
    pub fn new(cryptors: &Cryptors) -> Self {
        Self {
            access: Arc::clone(&cryptors.access),
            payload: Arc::clone(&cryptors.payload),
        }
    }

    /// Persist a fresh record owned by `creator` and return its wrapped data key.
    pub fn create_access_object<T: Transaction>(
        &self,
        tx: &mut T,
        object_id: ObjectId,
        creator: PrincipalId,
    ) -> Result<Vec<u8>, AccessError> {
        let (_key, wrapped) = self.payload.generate_data_key()?;
        let record = AccessObject::new(object_id, creator, wrapped.clone());
        let sealed = self.seal(&record)?;
        tx.insert_access_object(
            object_id,
            AccessObjectRow {
                version: record.version,
                sealed,
            },
        )?;
        info!(object_id = %object_id, "access object created");
        Ok(wrapped)
    }

    /// Load and decrypt a record.
    ///
    /// A row whose version column disagrees with the sealed record, or whose
    /// envelope was sealed for another object, fails as invalid ciphertext.
    pub fn fetch_access_object<T: Transaction>(
        &self,
        tx: &T,
        object_id: ObjectId,
    ) -> Result<AccessObject, AccessError> {
        let row = tx.get_access_object(object_id)?;
        let plaintext = self.access.decrypt(&row.sealed, object_id.as_bytes())?;
        let record: AccessObject = serde_json::from_slice(&plaintext)
            .map_err(|e| AccessError::Encoding(e.to_string()))?;
        if record.object_id != object_id || record.version != row.version {
            return Err(CryptoError::InvalidCiphertext.into());
        }
        Ok(record)
    }

    /// Return the record only if `principal` is a member.
    pub fn authorize<T: Transaction>(
        &self,
        tx: &T,
        object_id: ObjectId,
        principal: PrincipalId,
    ) -> Result<AccessObject, AccessError> {
        let record = self.fetch_access_object(tx, object_id)?;
        if !record.contains(principal) {
            debug!(object_id = %object_id, principal = %principal, "access denied");
            return Err(AccessError::Denied);
        }
        Ok(record)
    }

    pub fn add_permission<T: Transaction>(
        &self,
        tx: &mut T,
        object_id: ObjectId,
        target: PrincipalId,
    ) -> Result<(), AccessError> {
        self.mutate(tx, object_id, |record| record.grant(target))?;
        info!(object_id = %object_id, principal = %target, "permission added");
        Ok(())
    }

    pub fn remove_permission<T: Transaction>(
        &self,
        tx: &mut T,
        object_id: ObjectId,
        target: PrincipalId,
    ) -> Result<(), AccessError> {
        self.mutate(tx, object_id, |record| record.revoke(target))?;
        info!(object_id = %object_id, principal = %target, "permission removed");
        Ok(())
    }

    /// Switch the record to blob revision `revision`.
    pub fn set_revision<T: Transaction>(
        &self,
        tx: &mut T,
        object_id: ObjectId,
        revision: Uuid,
    ) -> Result<(), AccessError> {
        self.mutate(tx, object_id, |record| record.set_revision(revision))?;
        debug!(object_id = %object_id, revision = %revision, "revision advanced");
        Ok(())
    }

    /// Delete a record. Deleting an absent record succeeds.
    ///
    /// The delete is conditional on the version this transaction read, so it
    /// conflicts with any mutation committed in between.
    pub fn delete_access_object<T: Transaction>(
        &self,
        tx: &mut T,
        object_id: ObjectId,
    ) -> Result<(), AccessError> {
        let version = match tx.get_access_object(object_id) {
            Ok(row) => row.version,
            Err(StorageError::NotFound) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        match tx.delete_access_object(object_id, version) {
            Ok(()) => {
                info!(object_id = %object_id, "access object deleted");
                Ok(())
            }
            Err(StorageError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Unwrap the object's data key for payload encryption.
    pub fn object_key(&self, record: &AccessObject) -> Result<DataKey, AccessError> {
        Ok(self.payload.unwrap_key(&record.wrapped_object_key)?)
    }

    /// Apply `f`, re-seal, and compare-and-swap against the version read.
    fn mutate<T, F>(&self, tx: &mut T, object_id: ObjectId, f: F) -> Result<(), AccessError>
    where
        T: Transaction,
        F: FnOnce(&mut AccessObject),
    {
        let mut record = self.fetch_access_object(tx, object_id)?;
        let observed = record.version;
        f(&mut record);
        let sealed = self.seal(&record)?;
        tx.update_access_object(
            object_id,
            observed,
            AccessObjectRow {
                version: record.version,
                sealed,
            },
        )?;
        Ok(())
    }

    fn seal(&self, record: &AccessObject) -> Result<Sealed, AccessError> {
        let plaintext =
            serde_json::to_vec(record).map_err(|e| AccessError::Encoding(e.to_string()))?;
        Ok(self.access.encrypt(&plaintext, record.object_id.as_bytes())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RootKeys;
    use crate::storage::{with_transaction, Database, MemoryDatabase};

    fn setup() -> (AccessEngine, MemoryDatabase) {
        (
            AccessEngine::new(&Cryptors::new(RootKeys::generate())),
            MemoryDatabase::new(),
        )
    }

    fn created(engine: &AccessEngine, db: &MemoryDatabase, creator: PrincipalId) -> ObjectId {
        let id = ObjectId::new();
        with_transaction(db, |tx| engine.create_access_object(tx, id, creator)).unwrap();
        id
    }

    #[test]
    fn create_then_fetch() {
        let (engine, db) = setup();
        let creator = PrincipalId::new();
        let id = ObjectId::new();
        let wrapped =
            with_transaction(&db, |tx| engine.create_access_object(tx, id, creator)).unwrap();

        let record = engine.fetch_access_object(&db.begin(), id).unwrap();
        assert_eq!(record.object_id, id);
        assert_eq!(record.version, 0);
        assert_eq!(record.wrapped_object_key, wrapped);
        assert!(record.contains(creator));
        assert!(engine.object_key(&record).is_ok());
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let (engine, db) = setup();
        assert_eq!(
            engine.fetch_access_object(&db.begin(), ObjectId::new()),
            Err(AccessError::NotFound)
        );
    }

    #[test]
    fn denial_carries_no_record() {
        let (engine, db) = setup();
        let id = created(&engine, &db, PrincipalId::new());
        let outsider = PrincipalId::new();
        assert_eq!(
            engine.authorize(&db.begin(), id, outsider),
            Err(AccessError::Denied)
        );
    }

    #[test]
    fn add_twice_equals_once_but_version_counts_calls() {
        let (engine, db) = setup();
        let creator = PrincipalId::new();
        let id = created(&engine, &db, creator);
        let other = PrincipalId::new();

        with_transaction(&db, |tx| {
            engine.add_permission(tx, id, other)?;
            engine.add_permission(tx, id, other)
        })
        .unwrap();
        let record = engine.fetch_access_object(&db.begin(), id).unwrap();
        assert_eq!(record.principals.len(), 2);
        assert_eq!(record.version, 2);

        with_transaction(&db, |tx| engine.remove_permission(tx, id, PrincipalId::new())).unwrap();
        let record = engine.fetch_access_object(&db.begin(), id).unwrap();
        assert_eq!(record.principals.len(), 2);
        assert_eq!(record.version, 3);
    }

    #[test]
    fn grants_are_transitive() {
        let (engine, db) = setup();
        let (a, b, c) = (PrincipalId::new(), PrincipalId::new(), PrincipalId::new());
        let id = created(&engine, &db, a);

        with_transaction(&db, |tx| {
            engine.authorize(tx, id, a)?;
            engine.add_permission(tx, id, b)
        })
        .unwrap();
        with_transaction(&db, |tx| {
            engine.authorize(tx, id, b)?;
            engine.add_permission(tx, id, c)
        })
        .unwrap();

        assert!(engine.authorize(&db.begin(), id, c).is_ok());
    }

    #[test]
    fn member_can_remove_itself() {
        let (engine, db) = setup();
        let a = PrincipalId::new();
        let id = created(&engine, &db, a);
        with_transaction(&db, |tx| engine.remove_permission(tx, id, a)).unwrap();
        assert_eq!(engine.authorize(&db.begin(), id, a), Err(AccessError::Denied));
    }

    #[test]
    fn mutation_of_missing_record_is_not_found() {
        let (engine, db) = setup();
        assert_eq!(
            engine.add_permission(&mut db.begin(), ObjectId::new(), PrincipalId::new()),
            Err(AccessError::NotFound)
        );
    }

    #[test]
    fn delete_is_idempotent() {
        let (engine, db) = setup();
        let id = created(&engine, &db, PrincipalId::new());
        with_transaction(&db, |tx| engine.delete_access_object(tx, id)).unwrap();
        with_transaction(&db, |tx| engine.delete_access_object(tx, id)).unwrap();
        assert_eq!(
            engine.fetch_access_object(&db.begin(), id),
            Err(AccessError::NotFound)
        );
    }

    #[test]
    fn tampered_row_fails_verification() {
        let (engine, db) = setup();
        let id = created(&engine, &db, PrincipalId::new());
        db.tamper_access_object(id, |row| row.sealed.ciphertext[20] ^= 0x01);
        assert_eq!(
            engine.fetch_access_object(&db.begin(), id),
            Err(AccessError::Crypto(CryptoError::InvalidCiphertext))
        );
    }

    #[test]
    fn rolled_back_version_column_is_rejected() {
        let (engine, db) = setup();
        let id = created(&engine, &db, PrincipalId::new());
        with_transaction(&db, |tx| engine.add_permission(tx, id, PrincipalId::new())).unwrap();
        db.tamper_access_object(id, |row| row.version = 0);
        assert_eq!(
            engine.fetch_access_object(&db.begin(), id),
            Err(AccessError::Crypto(CryptoError::InvalidCiphertext))
        );
    }

    #[test]
    fn record_sealed_for_other_object_is_rejected() {
        let (engine, db) = setup();
        let creator = PrincipalId::new();
        let (x, y) = (created(&engine, &db, creator), created(&engine, &db, creator));
        let other = db.begin().get_access_object(y).unwrap();
        db.tamper_access_object(x, |row| *row = other);
        assert_eq!(
            engine.fetch_access_object(&db.begin(), x),
            Err(AccessError::Crypto(CryptoError::InvalidCiphertext))
        );
    }

    #[test]
    fn concurrent_grants_do_not_clobber() {
        let (engine, db) = setup();
        let id = created(&engine, &db, PrincipalId::new());

        let mut first = db.begin();
        let mut second = db.begin();
        engine.add_permission(&mut first, id, PrincipalId::new()).unwrap();
        engine.add_permission(&mut second, id, PrincipalId::new()).unwrap();

        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(StorageError::Conflict(_))));
        let record = engine.fetch_access_object(&db.begin(), id).unwrap();
        assert_eq!(record.principals.len(), 2);
        assert_eq!(record.version, 1);
    }

    #[test]
    fn set_revision_is_sealed_into_the_record() {
        let (engine, db) = setup();
        let id = created(&engine, &db, PrincipalId::new());
        let revision = Uuid::new_v4();
        with_transaction(&db, |tx| engine.set_revision(tx, id, revision)).unwrap();
        let record = engine.fetch_access_object(&db.begin(), id).unwrap();
        assert_eq!(record.revision, revision);
        assert_eq!(record.version, 1);
    }

    #[test]
    fn delete_conflicts_with_concurrent_grant() {
        let (engine, db) = setup();
        let id = created(&engine, &db, PrincipalId::new());

        let mut grant = db.begin();
        let mut delete = db.begin();
        engine.add_permission(&mut grant, id, PrincipalId::new()).unwrap();
        engine.delete_access_object(&mut delete, id).unwrap();

        grant.commit().unwrap();
        assert!(matches!(delete.commit(), Err(StorageError::Conflict(_))));
        assert!(engine.fetch_access_object(&db.begin(), id).is_ok());
    }
}
