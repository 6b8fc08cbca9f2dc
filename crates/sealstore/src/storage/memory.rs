//! [`MemoryDatabase`]: in-process implementation of the storage contract.
//!
//! Committed state is an immutable snapshot behind [`ArcSwap`], so opening a
//! transaction is a lock-free load. Each transaction keeps a private working
//! copy (cloned on first write) for read-your-writes plus a log of its writes.
//! Commit replays the log against the latest committed snapshot under a
//! single commit lock and publishes the result atomically.
//!
//! Replay semantics:
//! - user and group rows are last-writer-wins;
//! - access rows are compare-and-swap on `version` for both update and
//!   delete, so a transaction that read a version another transaction has
//!   since replaced fails with [`StorageError::Conflict`] instead of
//!   silently overwriting it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use super::{AccessObjectRow, Database, StorageError, Transaction};
use crate::crypto::Sealed;
use crate::identity::{ObjectId, PrincipalId};

#[derive(Debug, Clone)]
struct UserRow {
    sealed: Sealed,
    deleted_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<PrincipalId, UserRow>,
    groups: HashMap<PrincipalId, Sealed>,
    access: HashMap<ObjectId, AccessObjectRow>,
}

#[derive(Debug, Clone)]
enum Write {
    InsertUser(PrincipalId, Sealed),
    UpdateUser(PrincipalId, Sealed),
    RemoveUser(PrincipalId, DateTime<Utc>),
    InsertGroup(PrincipalId, Sealed),
    InsertAccess(ObjectId, AccessObjectRow),
    UpdateAccess {
        id: ObjectId,
        expected: u64,
        row: AccessObjectRow,
    },
    DeleteAccess {
        id: ObjectId,
        expected: u64,
    },
}

impl Write {
    /// Validate and apply against `t`. On error `t` is left untouched.
    fn apply(&self, t: &mut Tables) -> Result<(), StorageError> {
        match self {
            Write::InsertUser(id, sealed) => {
                if t.users.contains_key(id) {
                    return Err(StorageError::Conflict(format!("user {id} already exists")));
                }
                t.users.insert(
                    *id,
                    UserRow {
                        sealed: sealed.clone(),
                        deleted_at: None,
                    },
                );
            }
            Write::UpdateUser(id, sealed) => match t.users.get_mut(id) {
                Some(row) if row.live() => row.sealed = sealed.clone(),
                _ => return Err(StorageError::NotFound),
            },
            Write::RemoveUser(id, at) => match t.users.get_mut(id) {
                Some(row) if row.live() => row.deleted_at = Some(*at),
                _ => return Err(StorageError::NotFound),
            },
            Write::InsertGroup(id, sealed) => {
                if t.groups.contains_key(id) {
                    return Err(StorageError::Conflict(format!("group {id} already exists")));
                }
                t.groups.insert(*id, sealed.clone());
            }
            Write::InsertAccess(id, row) => {
                if t.access.contains_key(id) {
                    return Err(StorageError::Conflict(format!(
                        "access object {id} already exists"
                    )));
                }
                t.access.insert(*id, row.clone());
            }
            Write::UpdateAccess { id, expected, row } => match t.access.get_mut(id) {
                Some(current) if current.version == *expected => *current = row.clone(),
                Some(current) => {
                    return Err(StorageError::Conflict(format!(
                        "access object {id} is at version {}, expected {expected}",
                        current.version
                    )))
                }
                None => return Err(StorageError::NotFound),
            },
            Write::DeleteAccess { id, expected } => match t.access.get(id) {
                Some(current) if current.version == *expected => {
                    t.access.remove(id);
                }
                Some(current) => {
                    return Err(StorageError::Conflict(format!(
                        "access object {id} is at version {}, expected {expected}",
                        current.version
                    )))
                }
                // A concurrent delete already won.
                None => {}
            },
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Shared {
    committed: ArcSwap<Tables>,
    commit_lock: Mutex<()>,
}

/// In-memory transactional database.
///
/// Cheap to clone; clones share the same committed state.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (not soft-deleted) users.
    #[cfg(test)]
    pub fn live_users(&self) -> usize {
        self.shared
            .committed
            .load()
            .users
            .values()
            .filter(|row| row.live())
            .count()
    }

    #[cfg(test)]
    pub(crate) fn access_object_count(&self) -> usize {
        self.shared.committed.load().access.len()
    }

    /// Mutate a committed access row directly, bypassing every check.
    #[cfg(test)]
    pub(crate) fn tamper_access_object(
        &self,
        id: ObjectId,
        f: impl FnOnce(&mut AccessObjectRow),
    ) {
        let _guard = self.shared.commit_lock.lock().unwrap();
        let mut next = (*self.shared.committed.load_full()).clone();
        if let Some(row) = next.access.get_mut(&id) {
            f(row);
        }
        self.shared.committed.store(Arc::new(next));
    }
}

impl Database for MemoryDatabase {
    type Tx = MemoryTransaction;

    fn begin(&self) -> MemoryTransaction {
        MemoryTransaction {
            shared: Arc::clone(&self.shared),
            working: self.shared.committed.load_full(),
            log: Vec::new(),
        }
    }
}

/// A snapshot-isolated transaction against a [`MemoryDatabase`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    working: Arc<Tables>,
    log: Vec<Write>,
}

impl MemoryTransaction {
    fn write(&mut self, write: Write) -> Result<(), StorageError> {
        write.apply(Arc::make_mut(&mut self.working))?;
        self.log.push(write);
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn commit(self) -> Result<(), StorageError> {
        if self.log.is_empty() {
            return Ok(());
        }
        let _guard = self
            .shared
            .commit_lock
            .lock()
            .map_err(|_| StorageError::Internal("commit lock poisoned".into()))?;
        let mut next = (*self.shared.committed.load_full()).clone();
        for write in &self.log {
            write.apply(&mut next)?;
        }
        self.shared.committed.store(Arc::new(next));
        Ok(())
    }

    fn rollback(self) {}

    fn insert_user(&mut self, id: PrincipalId, data: Sealed) -> Result<(), StorageError> {
        self.write(Write::InsertUser(id, data))
    }

    fn update_user(&mut self, id: PrincipalId, data: Sealed) -> Result<(), StorageError> {
        self.write(Write::UpdateUser(id, data))
    }

    fn remove_user(&mut self, id: PrincipalId) -> Result<(), StorageError> {
        self.write(Write::RemoveUser(id, Utc::now()))
    }

    fn get_user_data(&self, id: PrincipalId) -> Result<Sealed, StorageError> {
        self.working
            .users
            .get(&id)
            .filter(|row| row.live())
            .map(|row| row.sealed.clone())
            .ok_or(StorageError::NotFound)
    }

    fn insert_group(&mut self, id: PrincipalId, data: Sealed) -> Result<(), StorageError> {
        self.write(Write::InsertGroup(id, data))
    }

    fn group_exists(&self, id: PrincipalId) -> Result<bool, StorageError> {
        Ok(self.working.groups.contains_key(&id))
    }

    fn get_group_data_batch(
        &self,
        ids: &[PrincipalId],
    ) -> Result<Vec<(PrincipalId, Sealed)>, StorageError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.groups.get(id).map(|g| (*id, g.clone())))
            .collect())
    }

    fn insert_access_object(
        &mut self,
        id: ObjectId,
        row: AccessObjectRow,
    ) -> Result<(), StorageError> {
        self.write(Write::InsertAccess(id, row))
    }

    fn get_access_object(&self, id: ObjectId) -> Result<AccessObjectRow, StorageError> {
        self.working
            .access
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn update_access_object(
        &mut self,
        id: ObjectId,
        expected_version: u64,
        row: AccessObjectRow,
    ) -> Result<(), StorageError> {
        self.write(Write::UpdateAccess {
            id,
            expected: expected_version,
            row,
        })
    }

    fn delete_access_object(
        &mut self,
        id: ObjectId,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        if !self.working.access.contains_key(&id) {
            return Err(StorageError::NotFound);
        }
        self.write(Write::DeleteAccess {
            id,
            expected: expected_version,
        })
    }
}
