use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use arc_swap::ArcSwap;
use imbl::OrdMap;

use crate::error::StoreError;
use crate::store::Store;

use super::transaction::MemoryTransaction;

pub(crate) type ColumnFamily = OrdMap<Vec<u8>, Vec<u8>>;

/// In-memory store built on persistent ordered maps.
///
/// Readers take cheap structural snapshots of a column family; a write
/// transaction holds `write_lock` from `begin` until it is committed or
/// dropped, so at most one writer is active at a time.
pub struct MemoryStore {
    cfs: RwLock<HashMap<String, Arc<ArcSwap<ColumnFamily>>>>,
    write_lock: Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            cfs: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Snapshot a single column family. Cheap due to imbl structural sharing.
    pub(crate) fn snapshot_cf(&self, name: &str) -> Result<Arc<ColumnFamily>, StoreError> {
        let cfs = self
            .cfs
            .read()
            .map_err(|e| StoreError::Storage(format!("catalog lock poisoned: {e}")))?;
        cfs.get(name)
            .map(|arc| arc.load_full())
            .ok_or_else(|| StoreError::CfNotFound(name.to_string()))
    }

    /// Publish the given column families. Families dropped while the
    /// transaction was open are skipped.
    pub(crate) fn commit(&self, dirty: HashMap<String, Arc<ColumnFamily>>) -> Result<(), StoreError> {
        let cfs = self
            .cfs
            .read()
            .map_err(|e| StoreError::Storage(format!("catalog lock poisoned: {e}")))?;
        for (name, data) in dirty {
            if let Some(arc) = cfs.get(&name) {
                arc.store(data);
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    type Txn<'a> = MemoryTransaction<'a>;

    fn begin(&self, read_only: bool) -> Result<Self::Txn<'_>, StoreError> {
        if read_only {
            return Ok(MemoryTransaction::new_read_only(self));
        }
        let guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Storage(format!("write lock poisoned: {e}")))?;
        Ok(MemoryTransaction::new_writable(self, guard))
    }

    fn create_cf(&self, name: &str) -> Result<(), StoreError> {
        let mut cfs = self
            .cfs
            .write()
            .map_err(|e| StoreError::Storage(format!("catalog lock poisoned: {e}")))?;
        cfs.entry(name.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(OrdMap::new())));
        Ok(())
    }

    fn drop_cf(&self, name: &str) -> Result<(), StoreError> {
        let mut cfs = self
            .cfs
            .write()
            .map_err(|e| StoreError::Storage(format!("catalog lock poisoned: {e}")))?;
        cfs.remove(name);
        Ok(())
    }

    fn cf_exists(&self, name: &str) -> bool {
        self.cfs
            .read()
            .map(|cfs| cfs.contains_key(name))
            .unwrap_or(false)
    }
}
