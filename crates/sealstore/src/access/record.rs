//! The access-control record bound to every stored object.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{ObjectId, PrincipalId};

/// Who may touch an object, the object's wrapped data key, and which
/// revision of its blobs is current.
///
/// There is no owner: any member may add or remove any principal, itself
/// included. `version` starts at 0 and moves by exactly one per mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessObject {
    pub object_id: ObjectId,
    pub principals: BTreeSet<PrincipalId>,
    pub wrapped_object_key: Vec<u8>,
    pub revision: Uuid,
    pub version: u64,
}

impl AccessObject {
    pub fn new(object_id: ObjectId, creator: PrincipalId, wrapped_object_key: Vec<u8>) -> Self {
        Self {
            object_id,
            principals: BTreeSet::from([creator]),
            wrapped_object_key,
            revision: Uuid::new_v4(),
            version: 0,
        }
    }

    pub fn contains(&self, principal: PrincipalId) -> bool {
        self.principals.contains(&principal)
    }

    /// Insert `principal` (no-op if present) and bump the version.
    pub fn grant(&mut self, principal: PrincipalId) {
        self.principals.insert(principal);
        self.version += 1;
    }

    /// Remove `principal` (no-op if absent) and bump the version.
    pub fn revoke(&mut self, principal: PrincipalId) {
        self.principals.remove(&principal);
        self.version += 1;
    }

    /// Point the record at blob revision `revision` and bump the version.
    pub fn set_revision(&mut self, revision: Uuid) {
        self.revision = revision;
        self.version += 1;
    }
}
