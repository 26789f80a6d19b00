use crate::error::StoreError;

pub type KvIter<'a> = Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

pub trait Store {
    type Txn<'a>: Transaction
    where
        Self: 'a;

    /// Start a transaction. Write transactions are exclusive: a backend must
    /// serialize them so that read-check-write sequences inside one
    /// transaction cannot interleave with another writer.
    fn begin(&self, read_only: bool) -> Result<Self::Txn<'_>, StoreError>;
    fn create_cf(&self, name: &str) -> Result<(), StoreError>;
    fn drop_cf(&self, name: &str) -> Result<(), StoreError>;
    fn cf_exists(&self, name: &str) -> bool;
}

pub trait Transaction {
    // Reads
    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    /// All pairs whose key starts with `prefix`, in ascending key order.
    fn scan_prefix<'a>(&'a self, cf: &str, prefix: &[u8]) -> Result<KvIter<'a>, StoreError>;

    // Writes
    fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, cf: &str, key: &[u8]) -> Result<(), StoreError>;

    // Schema
    fn create_cf(&mut self, name: &str) -> Result<(), StoreError>;
    fn drop_cf(&mut self, name: &str) -> Result<(), StoreError>;

    // Lifecycle
    fn commit(self) -> Result<(), StoreError>;
    fn rollback(self) -> Result<(), StoreError>;
}
