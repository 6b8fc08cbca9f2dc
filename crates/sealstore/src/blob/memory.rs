//! [`MemoryBlobStore`]: process-local blob storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use super::{BlobError, BlobStore};

/// Blobs held in a shared map. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> BlobError {
    BlobError::Internal("blob map lock poisoned".into())
}

impl BlobStore for MemoryBlobStore {
    fn store(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        self.inner
            .write()
            .map_err(poisoned)?
            .insert(key.to_owned(), data);
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Bytes, BlobError> {
        self.inner
            .read()
            .map_err(poisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_owned()))
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.inner.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{aad_key, payload_key};
    use crate::identity::ObjectId;
    use uuid::Uuid;

    #[test]
    fn store_retrieve_overwrite() {
        let store = MemoryBlobStore::new();
        store.store("k", Bytes::from_static(b"one")).unwrap();
        store.store("k", Bytes::from_static(b"two")).unwrap();
        assert_eq!(store.retrieve("k").unwrap(), Bytes::from_static(b"two"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = MemoryBlobStore::new();
        assert_eq!(
            store.retrieve("absent"),
            Err(BlobError::NotFound("absent".into()))
        );
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryBlobStore::new();
        store.store("k", Bytes::new()).unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn object_keys_are_distinct_per_stream_and_revision() {
        let id = ObjectId::new();
        let (r1, r2) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(payload_key(id, r1), format!("{id}/{r1}/payload"));
        assert_eq!(aad_key(id, r1), format!("{id}/{r1}/aad"));
        assert_ne!(payload_key(id, r1), aad_key(id, r1));
        assert_ne!(payload_key(id, r1), payload_key(id, r2));
    }
}
