use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, MutexGuard};

use crate::error::StoreError;
use crate::store::{KvIter, Store, Transaction};

use super::store::{ColumnFamily, MemoryStore};

/// Lazily-loaded snapshot of column families.
struct Snapshot {
    data: HashMap<String, Arc<ColumnFamily>>,
}

impl Snapshot {
    fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Ensure a CF is loaded into the snapshot.
    fn ensure(&mut self, store: &MemoryStore, cf: &str) -> Result<(), StoreError> {
        if !self.data.contains_key(cf) {
            let data = store.snapshot_cf(cf)?;
            self.data.insert(cf.to_string(), data);
        }
        Ok(())
    }

    fn get_cf(&mut self, store: &MemoryStore, cf: &str) -> Result<&ColumnFamily, StoreError> {
        self.ensure(store, cf)?;
        self.data
            .get(cf)
            .map(|arc| arc.as_ref())
            .ok_or_else(|| StoreError::CfNotFound(cf.to_string()))
    }

    fn get_cf_mut(&mut self, store: &MemoryStore, cf: &str) -> Result<&mut ColumnFamily, StoreError> {
        self.ensure(store, cf)?;
        let arc = self
            .data
            .get_mut(cf)
            .ok_or_else(|| StoreError::CfNotFound(cf.to_string()))?;
        Ok(Arc::make_mut(arc))
    }
}

pub struct MemoryTransaction<'a> {
    snapshot: RefCell<Option<Snapshot>>,
    /// CFs that have been written to.
    dirty: RefCell<HashSet<String>>,
    store: &'a MemoryStore,
    read_only: bool,
    /// Write lock held for the duration of a write transaction.
    _write_guard: Option<MutexGuard<'a, ()>>,
}

impl<'a> MemoryTransaction<'a> {
    pub(crate) fn new_read_only(store: &'a MemoryStore) -> Self {
        Self {
            snapshot: RefCell::new(Some(Snapshot::new())),
            dirty: RefCell::new(HashSet::new()),
            store,
            read_only: true,
            _write_guard: None,
        }
    }

    pub(crate) fn new_writable(store: &'a MemoryStore, guard: MutexGuard<'a, ()>) -> Self {
        Self {
            snapshot: RefCell::new(Some(Snapshot::new())),
            dirty: RefCell::new(HashSet::new()),
            store,
            read_only: false,
            _write_guard: Some(guard),
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut snap = self.snapshot.borrow_mut();
        let snap = snap.as_mut().ok_or(StoreError::TransactionConsumed)?;
        let data = snap.get_cf(self.store, cf)?;
        Ok(data.get(key).cloned())
    }

    fn scan_prefix<'b>(&'b self, cf: &str, prefix: &[u8]) -> Result<KvIter<'b>, StoreError> {
        let mut snap = self.snapshot.borrow_mut();
        let snap = snap.as_mut().ok_or(StoreError::TransactionConsumed)?;
        let data = snap.get_cf(self.store, cf)?;
        let prefix_vec = prefix.to_vec();
        let entries: Vec<(Vec<u8>, Vec<u8>)> = data
            .range(prefix_vec.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix_vec))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Box::new(entries.into_iter()))
    }

    fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut snap = self.snapshot.borrow_mut();
        let snap = snap.as_mut().ok_or(StoreError::TransactionConsumed)?;
        let data = snap.get_cf_mut(self.store, cf)?;
        data.insert(key.to_vec(), value.to_vec());
        self.dirty.borrow_mut().insert(cf.to_string());
        Ok(())
    }

    fn delete(&self, cf: &str, key: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut snap = self.snapshot.borrow_mut();
        let snap = snap.as_mut().ok_or(StoreError::TransactionConsumed)?;
        let data = snap.get_cf_mut(self.store, cf)?;
        data.remove(key);
        self.dirty.borrow_mut().insert(cf.to_string());
        Ok(())
    }

    fn create_cf(&mut self, name: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.store.create_cf(name)?;
        let snap = self
            .snapshot
            .get_mut()
            .as_mut()
            .ok_or(StoreError::TransactionConsumed)?;
        snap.data
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ColumnFamily::new()));
        Ok(())
    }

    fn drop_cf(&mut self, name: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.store.drop_cf(name)?;
        let snap = self
            .snapshot
            .get_mut()
            .as_mut()
            .ok_or(StoreError::TransactionConsumed)?;
        snap.data.remove(name);
        self.dirty.get_mut().remove(name);
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let snapshot = self
            .snapshot
            .into_inner()
            .ok_or(StoreError::TransactionConsumed)?;

        if self.read_only {
            return Err(StoreError::ReadOnly);
        }

        let dirty_set = self.dirty.into_inner();
        let dirty: HashMap<String, Arc<ColumnFamily>> = snapshot
            .data
            .into_iter()
            .filter(|(name, _)| dirty_set.contains(name))
            .collect();

        if dirty.is_empty() {
            return Ok(());
        }

        self.store.commit(dirty)
    }

    fn rollback(self) -> Result<(), StoreError> {
        if self.snapshot.into_inner().is_none() {
            return Err(StoreError::TransactionConsumed);
        }
        Ok(())
    }
}
