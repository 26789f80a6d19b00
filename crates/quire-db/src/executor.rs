use bson::oid::ObjectId;
use bson::{Bson, Document};
use quire_engine::{
    CollectionConfig, CollectionHandle, KvEngine, KvTransaction, validate_for_storage,
};
use quire_query::{Matcher, parse_update};
use quire_store::Store;
use tracing::debug;

use crate::error::DbError;
use crate::result::{BatchResult, OpOutcome, WriteError};
use crate::write_op::{BatchOptions, WriteOp};

const ID_FIELD: &str = "_id";

/// Applies a list of write operations to one collection.
///
/// Every operation runs in its own write transaction, so a failed operation
/// leaves no partial effects behind and its predecessors stay applied.
pub struct WriteBatchExecutor<'a, S, M> {
    engine: &'a KvEngine<S>,
    matcher: &'a M,
}

impl<'a, S: Store, M: Matcher> WriteBatchExecutor<'a, S, M> {
    pub fn new(engine: &'a KvEngine<S>, matcher: &'a M) -> Self {
        Self { engine, matcher }
    }

    /// Run `ops` in order. Ordered batches stop at the first failure;
    /// unordered batches attempt every operation.
    pub fn execute(&self, collection: &str, ops: &[WriteOp], options: &BatchOptions) -> BatchResult {
        debug!(
            collection,
            ops = ops.len(),
            ordered = options.ordered,
            "executing write batch"
        );

        let mut result = BatchResult::default();
        let mut halted = false;
        for (index, op) in ops.iter().enumerate() {
            if halted {
                break;
            }
            match self.apply(collection, op, options.bypass_validation) {
                Ok(outcome) => result.record(index, outcome),
                Err(error) => {
                    debug!(collection, index, code = error.code().code(), %error, "write failed");
                    result
                        .write_errors
                        .push(WriteError::new(index, &error, op.clone()));
                    halted = options.ordered;
                }
            }
        }

        debug!(
            collection,
            n = result.n(),
            errors = result.write_errors.len(),
            "write batch finished"
        );
        result
    }

    fn apply(&self, collection: &str, op: &WriteOp, bypass: bool) -> Result<OpOutcome, DbError> {
        match op {
            WriteOp::Insert { doc } => self.insert(collection, doc, bypass),
            WriteOp::Update { q, u, upsert, multi } => {
                self.update(collection, q, u, *upsert, *multi, bypass)
            }
            WriteOp::Delete { q, limit } => self.delete(collection, q, *limit),
        }
    }

    fn insert(&self, collection: &str, doc: &Document, bypass: bool) -> Result<OpOutcome, DbError> {
        let doc = with_id_first(doc.clone());
        if !bypass {
            validate_for_storage(&doc)?;
        }

        let mut txn = self.engine.begin(false)?;
        let handle = ensure_collection(&mut txn, collection)?;
        txn.insert(&handle, &doc)?;
        txn.commit()?;
        Ok(OpOutcome {
            inserted: 1,
            ..Default::default()
        })
    }

    fn update(
        &self,
        collection: &str,
        q: &Document,
        u: &Document,
        upsert: bool,
        multi: bool,
        bypass: bool,
    ) -> Result<OpOutcome, DbError> {
        let predicate = self.matcher.parse(q)?;
        let spec = parse_update(u)?;
        if multi && spec.is_replacement() {
            return Err(DbError::FailedToParse(
                "multi update only works with $ operators".into(),
            ));
        }

        let mut txn = self.engine.begin(false)?;
        let mut outcome = OpOutcome::default();

        if let Some(handle) = txn.collection(collection)? {
            let limit = if multi { None } else { Some(1) };
            for doc in self.matching(&txn, &handle, &predicate, limit)? {
                let (updated, changed) = spec.apply(&doc)?;
                outcome.matched += 1;
                if !changed {
                    continue;
                }
                if !bypass {
                    validate_for_storage(&updated)?;
                }
                txn.replace(&handle, &updated)?;
                outcome.modified += 1;
            }
        }

        if outcome.matched == 0 && upsert {
            let doc = with_id_first(spec.upsert_document(q)?);
            if !bypass {
                validate_for_storage(&doc)?;
            }
            let handle = ensure_collection(&mut txn, collection)?;
            txn.insert(&handle, &doc)?;
            outcome.upserted = doc.get(ID_FIELD).cloned();
        }

        txn.commit()?;
        Ok(outcome)
    }

    fn delete(&self, collection: &str, q: &Document, limit: u32) -> Result<OpOutcome, DbError> {
        let predicate = self.matcher.parse(q)?;

        let txn = self.engine.begin(false)?;
        let mut outcome = OpOutcome::default();
        if let Some(handle) = txn.collection(collection)? {
            let limit = (limit > 0).then_some(limit as usize);
            for doc in self.matching(&txn, &handle, &predicate, limit)? {
                if txn.delete(&handle, &doc)? {
                    outcome.removed += 1;
                }
            }
        }
        txn.commit()?;
        Ok(outcome)
    }

    /// Documents satisfying `predicate`, in storage key order, at most `limit`.
    fn matching(
        &self,
        txn: &KvTransaction<'_, S>,
        handle: &CollectionHandle,
        predicate: &M::Predicate,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, DbError> {
        let mut found = Vec::new();
        for doc in txn.scan(handle)? {
            if limit.is_some_and(|l| found.len() >= l) {
                break;
            }
            if self.matcher.matches(&doc, predicate) {
                found.push(doc);
            }
        }
        Ok(found)
    }
}

/// Resolve a collection, creating it on first write.
pub(crate) fn ensure_collection<S: Store>(
    txn: &mut KvTransaction<'_, S>,
    name: &str,
) -> Result<CollectionHandle, DbError> {
    if let Some(handle) = txn.collection(name)? {
        return Ok(handle);
    }
    debug!(collection = name, "creating collection");
    Ok(txn.create_collection(&CollectionConfig::new(name))?)
}

/// Place `_id` first, generating an `ObjectId` when the document has none.
fn with_id_first(doc: Document) -> Document {
    if doc.keys().next().is_some_and(|k| k == ID_FIELD) {
        return doc;
    }
    let id = doc
        .get(ID_FIELD)
        .cloned()
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
    let mut out = Document::new();
    out.insert(ID_FIELD, id);
    for (key, value) in doc {
        if key != ID_FIELD {
            out.insert(key, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn id_moves_to_front() {
        let doc = with_id_first(doc! { "a": 1, "_id": 5 });
        assert_eq!(doc.keys().next().unwrap(), "_id");
        assert_eq!(doc.get_i32("_id").unwrap(), 5);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn missing_id_is_generated() {
        let doc = with_id_first(doc! { "a": 1 });
        assert!(matches!(doc.get("_id"), Some(Bson::ObjectId(_))));
        assert_eq!(doc.keys().next().unwrap(), "_id");
    }

    #[test]
    fn leading_id_is_untouched() {
        let original = doc! { "_id": "x", "a": 1 };
        assert_eq!(with_id_first(original.clone()), original);
    }
}
