use bson::Document;
use quire_query::Matcher;
use quire_store::Store;

use crate::bulk::BulkWrite;
use crate::database::Database;
use crate::error::{CommandError, DbError};
use crate::executor::ensure_collection;
use crate::result::WriteOutcome;
use crate::write_op::{BatchOptions, WriteOp};

/// A named collection of a [`Database`]. Resolving one never creates it;
/// the first write does.
pub struct Collection<'db, S: Store, M: Matcher> {
    db: &'db Database<S, M>,
    name: String,
}

impl<'db, S: Store, M: Matcher> Collection<'db, S, M> {
    pub(crate) fn new(db: &'db Database<S, M>, name: &str) -> Self {
        Self {
            db,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initialize_ordered_bulk_op(&self) -> BulkWrite<'db, S, M> {
        BulkWrite::new(self.db, &self.name, true)
    }

    pub fn initialize_unordered_bulk_op(&self) -> BulkWrite<'db, S, M> {
        BulkWrite::new(self.db, &self.name, false)
    }

    /// Apply a batch of writes to this collection.
    pub fn write(&self, ops: &[WriteOp], options: &BatchOptions) -> Result<WriteOutcome, CommandError> {
        self.db.write(&self.name, ops, options)
    }

    /// Declare an index on `field`. Only unique indexes constrain writes;
    /// a plain index is accepted and has no further effect.
    ///
    /// Returns whether a new unique constraint was created. Building a unique
    /// index over documents that already share a value fails with a
    /// duplicate-key error.
    pub fn create_index(&self, field: &str, unique: bool) -> Result<bool, DbError> {
        let mut txn = self.db.engine().begin(false)?;
        let handle = ensure_collection(&mut txn, &self.name)?;
        let created = unique && txn.create_unique_index(handle.name(), field)?;
        txn.commit()?;
        Ok(created)
    }

    /// Remove the unique index on `field`.
    pub fn drop_index(&self, field: &str) -> Result<(), DbError> {
        let mut txn = self.db.engine().begin(false)?;
        let dropped = match txn.collection(&self.name)? {
            Some(_) => txn.drop_index(&self.name, field)?,
            None => false,
        };
        if !dropped {
            return Err(DbError::IndexNotFound(format!("{field}_1")));
        }
        txn.commit()?;
        Ok(())
    }

    /// Unique fields of this collection, besides `_id`.
    pub fn unique_fields(&self) -> Result<Vec<String>, DbError> {
        let txn = self.db.engine().begin(true)?;
        Ok(txn
            .collection(&self.name)?
            .map(|handle| handle.unique().to_vec())
            .unwrap_or_default())
    }

    /// Drop the collection. Returns whether it existed.
    pub fn drop(&self) -> Result<bool, DbError> {
        let mut txn = self.db.engine().begin(false)?;
        let existed = txn.drop_collection(&self.name)?;
        txn.commit()?;
        Ok(existed)
    }

    /// Documents matching `filter`, in storage key order.
    pub fn find(&self, filter: &Document) -> Result<Vec<Document>, DbError> {
        let predicate = self.db.matcher().parse(filter)?;
        let txn = self.db.engine().begin(true)?;
        let Some(handle) = txn.collection(&self.name)? else {
            return Ok(Vec::new());
        };
        Ok(txn
            .scan(&handle)?
            .into_iter()
            .filter(|doc| self.db.matcher().matches(doc, &predicate))
            .collect())
    }

    pub fn find_one(&self, filter: &Document) -> Result<Option<Document>, DbError> {
        Ok(self.find(filter)?.into_iter().next())
    }

    pub fn count(&self, filter: &Document) -> Result<u64, DbError> {
        if filter.is_empty() {
            let txn = self.db.engine().begin(true)?;
            return match txn.collection(&self.name)? {
                Some(handle) => Ok(txn.count(&handle)? as u64),
                None => Ok(0),
            };
        }
        Ok(self.find(filter)?.len() as u64)
    }
}
