//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::crypto::Cryptors;
use crate::identity::IdentityService;
use crate::objects::ObjectService;
use crate::storage::MemoryDatabase;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-wrapped or already `Arc`-backed) so
/// that Axum can clone the state for each request without copying expensive data.
#[derive(Clone)]
pub struct AppState {
    /// Transactional store for user, group and access records.
    pub db: MemoryDatabase,
    /// Users, groups, login and bearer tokens.
    pub identity: Arc<IdentityService>,
    /// Object store/retrieve/update/delete and permission management.
    pub objects: Arc<ObjectService<MemoryDatabase>>,
}

impl AppState {
    pub fn new(
        db: MemoryDatabase,
        cryptors: &Cryptors,
        blobs: Arc<dyn BlobStore>,
        token_ttl: chrono::Duration,
    ) -> Self {
        Self {
            identity: Arc::new(IdentityService::new(cryptors, token_ttl)),
            objects: Arc::new(ObjectService::new(db.clone(), cryptors, blobs)),
            db,
        }
    }

    /// State with fresh random root keys and empty in-memory stores.
    #[cfg(test)]
    pub fn ephemeral() -> Self {
        use crate::blob::MemoryBlobStore;
        use crate::crypto::RootKeys;

        Self::new(
            MemoryDatabase::new(),
            &Cryptors::new(RootKeys::generate()),
            Arc::new(MemoryBlobStore::new()),
            chrono::Duration::hours(1),
        )
    }
}
