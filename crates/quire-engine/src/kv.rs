use std::collections::HashMap;

use bson::{Bson, Document};
use quire_store::{Store, Transaction};

use crate::encoding::{decode_record, encode_record, index_values, value_key};
use crate::error::EngineError;
use crate::key::{Key, KeyPrefix};
use crate::traits::{CollectionConfig, CollectionHandle};

pub const SYS_CF: &str = "_sys_";

const ID_FIELD: &str = "_id";

// ── KvEngine ───────────────────────────────────────────────────

/// Document layer over a key-value [`Store`].
pub struct KvEngine<S> {
    store: S,
}

impl<S: Store> KvEngine<S> {
    pub fn new(store: S) -> Result<Self, EngineError> {
        store.create_cf(SYS_CF)?;
        Ok(Self { store })
    }

    /// Start a transaction. Write transactions are exclusive for the whole
    /// store, which makes every check-then-write inside them atomic.
    /// Dropping a transaction without committing discards its writes.
    pub fn begin(&self, read_only: bool) -> Result<KvTransaction<'_, S>, EngineError> {
        let txn = self.store.begin(read_only)?;
        Ok(KvTransaction { txn })
    }
}

// ── KvTransaction ──────────────────────────────────────────────

pub struct KvTransaction<'a, S: Store + 'a> {
    txn: S::Txn<'a>,
}

/// A unique entry a document contributes: field, value key, value.
struct UniqueEntry<'f> {
    field: &'f str,
    key: Vec<u8>,
    value: Bson,
}

fn same_entry(a: &UniqueEntry<'_>, b: &UniqueEntry<'_>) -> bool {
    a.field == b.field && a.key == b.key
}

fn id_key(doc: &Document) -> Result<Vec<u8>, EngineError> {
    doc.get(ID_FIELD)
        .map(value_key)
        .ok_or_else(|| EngineError::InvalidDocument("document has no _id".into()))
}

fn index_name(field: &str) -> String {
    if field == ID_FIELD {
        "_id_".to_string()
    } else {
        format!("{field}_1")
    }
}

fn duplicate(handle: &CollectionHandle, field: &str, value: &Bson) -> EngineError {
    EngineError::DuplicateKey {
        collection: handle.name().to_string(),
        index: index_name(field),
        key: format!("{{ {field}: {value} }}"),
    }
}

fn validate_collection_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() || name.contains('\0') || name.starts_with('$') || name == SYS_CF {
        return Err(EngineError::InvalidCollectionName(name.to_string()));
    }
    Ok(())
}

impl<'a, S: Store + 'a> KvTransaction<'a, S> {
    // ── Catalog ────────────────────────────────────────────────

    fn config(&self, name: &str) -> Result<Option<CollectionConfig>, EngineError> {
        match self.txn.get(SYS_CF, &Key::Collection(name).encode())? {
            Some(bytes) => Ok(Some(bson::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_config(&self, config: &CollectionConfig) -> Result<(), EngineError> {
        let bytes = bson::to_vec(config)?;
        self.txn
            .put(SYS_CF, &Key::Collection(&config.name).encode(), &bytes)?;
        Ok(())
    }

    /// Resolve a collection by name.
    pub fn collection(&self, name: &str) -> Result<Option<CollectionHandle>, EngineError> {
        Ok(self
            .config(name)?
            .map(|config| CollectionHandle::from_config(&config)))
    }

    /// Create a collection (and its unique constraints) unless it exists.
    /// Returns the handle of the existing or created collection.
    pub fn create_collection(
        &mut self,
        config: &CollectionConfig,
    ) -> Result<CollectionHandle, EngineError> {
        validate_collection_name(&config.name)?;
        if let Some(existing) = self.collection(&config.name)? {
            return Ok(existing);
        }
        self.txn.create_cf(&config.name)?;
        self.save_config(&CollectionConfig::new(config.name.clone()))?;
        for field in &config.unique {
            self.create_unique_index(&config.name, field)?;
        }
        self.collection(&config.name)?
            .ok_or_else(|| EngineError::CollectionNotFound(config.name.clone()))
    }

    /// Drop a collection with all of its documents. Returns whether it existed.
    pub fn drop_collection(&mut self, name: &str) -> Result<bool, EngineError> {
        if self.config(name)?.is_none() {
            return Ok(false);
        }
        self.txn.delete(SYS_CF, &Key::Collection(name).encode())?;
        self.txn.drop_cf(name)?;
        Ok(true)
    }

    pub fn list_collections(&self) -> Result<Vec<String>, EngineError> {
        let prefix = KeyPrefix::Collections.encode();
        let mut names = Vec::new();
        for (key, _) in self.txn.scan_prefix(SYS_CF, &prefix)? {
            let name = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| EngineError::Encoding(format!("collection key: {e}")))?;
            names.push(name.to_string());
        }
        Ok(names)
    }

    /// Declare a unique constraint on `field`, indexing existing documents.
    ///
    /// Returns `Ok(false)` if the constraint already exists (or `field` is
    /// `_id`). Fails with [`EngineError::DuplicateKey`] if two existing
    /// documents already share a value.
    pub fn create_unique_index(&mut self, collection: &str, field: &str) -> Result<bool, EngineError> {
        let mut config = self
            .config(collection)?
            .ok_or_else(|| EngineError::CollectionNotFound(collection.to_string()))?;
        if field == ID_FIELD || config.unique.iter().any(|f| f == field) {
            return Ok(false);
        }

        let handle = CollectionHandle::from_config(&config);
        let mut owners: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        for doc in self.scan(&handle)? {
            let owner = id_key(&doc)?;
            for value in index_values(&doc, field) {
                let key = value_key(&value);
                match owners.get(&key) {
                    Some(existing) if *existing != owner => {
                        return Err(duplicate(&handle, field, &value));
                    }
                    _ => {
                        owners.insert(key, owner.clone());
                    }
                }
            }
        }

        for (key, owner) in &owners {
            self.txn
                .put(handle.cf(), &Key::Unique(field, key).encode(), owner)?;
        }
        config.unique.push(field.to_string());
        self.save_config(&config)?;
        Ok(true)
    }

    /// Remove a unique constraint. Returns whether it existed.
    pub fn drop_index(&mut self, collection: &str, field: &str) -> Result<bool, EngineError> {
        let mut config = self
            .config(collection)?
            .ok_or_else(|| EngineError::CollectionNotFound(collection.to_string()))?;
        let Some(pos) = config.unique.iter().position(|f| f == field) else {
            return Ok(false);
        };
        let prefix = KeyPrefix::Unique(field).encode();
        let keys: Vec<Vec<u8>> = self
            .txn
            .scan_prefix(&config.name, &prefix)?
            .map(|(k, _)| k)
            .collect();
        for key in keys {
            self.txn.delete(&config.name, &key)?;
        }
        config.unique.remove(pos);
        self.save_config(&config)?;
        Ok(true)
    }

    // ── Documents ──────────────────────────────────────────────

    fn unique_entries<'h>(
        &self,
        handle: &'h CollectionHandle,
        doc: &Document,
    ) -> Vec<UniqueEntry<'h>> {
        let mut entries = Vec::new();
        for field in handle.unique() {
            for value in index_values(doc, field) {
                entries.push(UniqueEntry {
                    field: field.as_str(),
                    key: value_key(&value),
                    value,
                });
            }
        }
        entries
    }

    /// Fail if any entry is owned by a document other than `owner`.
    fn check_unique(
        &self,
        handle: &CollectionHandle,
        entries: &[&UniqueEntry<'_>],
        owner: &[u8],
    ) -> Result<(), EngineError> {
        for entry in entries {
            let key = Key::Unique(entry.field, &entry.key).encode();
            if let Some(existing) = self.txn.get(handle.cf(), &key)?
                && existing != owner
            {
                return Err(duplicate(handle, entry.field, &entry.value));
            }
        }
        Ok(())
    }

    pub fn get(&self, handle: &CollectionHandle, id: &Bson) -> Result<Option<Document>, EngineError> {
        let key = Key::Record(&value_key(id)).encode();
        match self.txn.get(handle.cf(), &key)? {
            Some(data) => Ok(Some(decode_record(&data)?)),
            None => Ok(None),
        }
    }

    /// Insert a new document. The document must carry `_id`.
    pub fn insert(&self, handle: &CollectionHandle, doc: &Document) -> Result<(), EngineError> {
        let owner = id_key(doc)?;
        let record_key = Key::Record(&owner).encode();
        if self.txn.get(handle.cf(), &record_key)?.is_some() {
            let id = doc.get(ID_FIELD).cloned().unwrap_or(Bson::Null);
            return Err(duplicate(handle, ID_FIELD, &id));
        }

        let entries = self.unique_entries(handle, doc);
        let refs: Vec<&UniqueEntry<'_>> = entries.iter().collect();
        self.check_unique(handle, &refs, &owner)?;

        self.txn
            .put(handle.cf(), &record_key, &encode_record(doc)?)?;
        for entry in &entries {
            self.txn.put(
                handle.cf(),
                &Key::Unique(entry.field, &entry.key).encode(),
                &owner,
            )?;
        }
        Ok(())
    }

    /// Overwrite the stored document that has the same `_id` as `doc`,
    /// maintaining unique entries.
    pub fn replace(&self, handle: &CollectionHandle, doc: &Document) -> Result<(), EngineError> {
        let owner = id_key(doc)?;
        let record_key = Key::Record(&owner).encode();
        let old = match self.txn.get(handle.cf(), &record_key)? {
            Some(data) => decode_record(&data)?,
            None => {
                return Err(EngineError::InvalidDocument(
                    "no stored document with this _id".into(),
                ));
            }
        };

        let old_entries = self.unique_entries(handle, &old);
        let new_entries = self.unique_entries(handle, doc);
        let added: Vec<&UniqueEntry<'_>> = new_entries
            .iter()
            .filter(|n| !old_entries.iter().any(|o| same_entry(o, n)))
            .collect();
        let removed: Vec<&UniqueEntry<'_>> = old_entries
            .iter()
            .filter(|o| !new_entries.iter().any(|n| same_entry(o, n)))
            .collect();

        self.check_unique(handle, &added, &owner)?;

        for entry in removed {
            self.txn
                .delete(handle.cf(), &Key::Unique(entry.field, &entry.key).encode())?;
        }
        for entry in added {
            self.txn.put(
                handle.cf(),
                &Key::Unique(entry.field, &entry.key).encode(),
                &owner,
            )?;
        }
        self.txn
            .put(handle.cf(), &record_key, &encode_record(doc)?)?;
        Ok(())
    }

    /// Delete the stored document with `doc`'s `_id`. Returns whether it existed.
    pub fn delete(&self, handle: &CollectionHandle, doc: &Document) -> Result<bool, EngineError> {
        let owner = id_key(doc)?;
        let record_key = Key::Record(&owner).encode();
        let stored = match self.txn.get(handle.cf(), &record_key)? {
            Some(data) => decode_record(&data)?,
            None => return Ok(false),
        };
        for entry in self.unique_entries(handle, &stored) {
            self.txn
                .delete(handle.cf(), &Key::Unique(entry.field, &entry.key).encode())?;
        }
        self.txn.delete(handle.cf(), &record_key)?;
        Ok(true)
    }

    /// All documents of a collection, in storage key order: integral `_id`s
    /// ascend numerically, other types group by type tag.
    pub fn scan(&self, handle: &CollectionHandle) -> Result<Vec<Document>, EngineError> {
        let prefix = KeyPrefix::Records.encode();
        self.txn
            .scan_prefix(handle.cf(), &prefix)?
            .map(|(_, data)| decode_record(&data))
            .collect()
    }

    pub fn count(&self, handle: &CollectionHandle) -> Result<usize, EngineError> {
        let prefix = KeyPrefix::Records.encode();
        Ok(self.txn.scan_prefix(handle.cf(), &prefix)?.count())
    }

    pub fn commit(self) -> Result<(), EngineError> {
        Ok(self.txn.commit()?)
    }
}
