use bson::{Bson, Document, doc};
use serde::Serialize;

use crate::error::{DbError, ErrorCode};
use crate::write_op::WriteOp;

/// An identifier generated by an upsert, correlated by operation index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertedEntry {
    pub index: i32,
    #[serde(rename = "_id")]
    pub id: Bson,
}

/// One failed operation of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteError {
    /// Position of the operation in the submitted batch.
    pub index: usize,
    pub code: ErrorCode,
    pub errmsg: String,
    /// The operation that failed.
    pub op: WriteOp,
}

impl WriteError {
    pub fn new(index: usize, error: &DbError, op: WriteOp) -> Self {
        Self {
            index,
            code: error.code(),
            errmsg: error.to_string(),
            op,
        }
    }

    pub fn to_document(&self) -> Document {
        doc! {
            "index": self.index as i32,
            "code": self.code.code(),
            "errmsg": self.errmsg.clone(),
            "op": self.op.to_document(),
        }
    }
}

/// Outcome of a single successful operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct OpOutcome {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub upserted: Option<Bson>,
    pub removed: u64,
}

/// Counters, generated identifiers and write errors of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub n_inserted: u64,
    /// Documents matched by updates.
    pub n_updated: u64,
    /// Documents actually changed by updates.
    pub n_modified: u64,
    pub n_upserted: u64,
    pub n_removed: u64,
    pub upserted: Vec<UpsertedEntry>,
    pub write_errors: Vec<WriteError>,
}

impl BatchResult {
    /// Sum of the primary counters.
    pub fn n(&self) -> u64 {
        self.n_inserted + self.n_upserted + self.n_updated + self.n_removed
    }

    pub fn has_errors(&self) -> bool {
        !self.write_errors.is_empty()
    }

    pub(crate) fn record(&mut self, index: usize, outcome: OpOutcome) {
        self.n_inserted += outcome.inserted;
        self.n_updated += outcome.matched;
        self.n_modified += outcome.modified;
        self.n_removed += outcome.removed;
        if let Some(id) = outcome.upserted {
            self.n_upserted += 1;
            self.upserted.push(UpsertedEntry {
                index: index as i32,
                id,
            });
        }
    }

    /// Fold in the result of a sub-batch whose operation 0 sat at `offset`
    /// in this batch.
    pub(crate) fn merge(&mut self, other: BatchResult, offset: usize) {
        self.n_inserted += other.n_inserted;
        self.n_updated += other.n_updated;
        self.n_modified += other.n_modified;
        self.n_upserted += other.n_upserted;
        self.n_removed += other.n_removed;
        self.upserted
            .extend(other.upserted.into_iter().map(|mut entry| {
                entry.index += offset as i32;
                entry
            }));
        self.write_errors
            .extend(other.write_errors.into_iter().map(|mut error| {
                error.index += offset;
                error
            }));
    }

    /// Render as a command reply.
    pub fn to_document(&self) -> Document {
        let mut reply = doc! {
            "ok": 1.0,
            "n": self.n() as i64,
            "nInserted": self.n_inserted as i64,
            "nUpserted": self.n_upserted as i64,
            "nUpdated": self.n_updated as i64,
            "nModified": self.n_modified as i64,
            "nRemoved": self.n_removed as i64,
        };
        if !self.upserted.is_empty() {
            let upserted: Vec<Bson> = self
                .upserted
                .iter()
                .filter_map(|entry| bson::to_bson(entry).ok())
                .collect();
            reply.insert("upserted", upserted);
        }
        if !self.write_errors.is_empty() {
            let errors: Vec<Bson> = self
                .write_errors
                .iter()
                .map(|e| Bson::Document(e.to_document()))
                .collect();
            reply.insert("writeErrors", errors);
        }
        reply
    }
}

/// What the caller of a write learns.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Acknowledged(BatchResult),
    /// `w:0`: the batch ran but nothing about it is reported.
    Unacknowledged,
}

impl WriteOutcome {
    pub fn result(&self) -> Option<&BatchResult> {
        match self {
            WriteOutcome::Acknowledged(result) => Some(result),
            WriteOutcome::Unacknowledged => None,
        }
    }

    pub fn to_document(&self) -> Document {
        match self {
            WriteOutcome::Acknowledged(result) => result.to_document(),
            WriteOutcome::Unacknowledged => doc! { "ok": 1.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(index: usize) -> WriteError {
        WriteError::new(
            index,
            &DbError::BadValue("nope".into()),
            WriteOp::insert(doc! { "_id": 1 }),
        )
    }

    #[test]
    fn record_counts_upserts() {
        let mut result = BatchResult::default();
        result.record(0, OpOutcome { inserted: 1, ..Default::default() });
        result.record(
            1,
            OpOutcome { upserted: Some(Bson::Int32(5)), ..Default::default() },
        );
        result.record(2, OpOutcome { matched: 2, modified: 1, ..Default::default() });
        assert_eq!(result.n(), 4);
        assert_eq!(result.n_upserted, 1);
        assert_eq!(result.upserted, vec![UpsertedEntry { index: 1, id: Bson::Int32(5) }]);
    }

    #[test]
    fn merge_shifts_indices() {
        let mut sub = BatchResult::default();
        sub.record(0, OpOutcome { upserted: Some(Bson::Int32(1)), ..Default::default() });
        sub.write_errors.push(failed(1));

        let mut total = BatchResult::default();
        total.merge(sub, 3);
        assert_eq!(total.upserted[0].index, 3);
        assert_eq!(total.write_errors[0].index, 4);
    }

    #[test]
    fn reply_shape() {
        let mut result = BatchResult::default();
        result.record(0, OpOutcome { upserted: Some(Bson::Int32(9)), ..Default::default() });
        result.write_errors.push(failed(1));

        let reply = result.to_document();
        assert_eq!(reply.get_f64("ok").unwrap(), 1.0);
        assert_eq!(reply.get_i64("n").unwrap(), 1);
        let upserted = reply.get_array("upserted").unwrap();
        assert_eq!(upserted[0], Bson::Document(doc! { "index": 0, "_id": 9 }));
        let error = reply.get_array("writeErrors").unwrap()[0].as_document().unwrap();
        assert_eq!(error.get_i32("index").unwrap(), 1);
        assert_eq!(error.get_i32("code").unwrap(), 2);
        assert_eq!(error.get_str("errmsg").unwrap(), "nope");
        assert_eq!(error.get_document("op").unwrap(), &doc! { "_id": 1 });
    }

    #[test]
    fn clean_reply_omits_lists() {
        let reply = BatchResult::default().to_document();
        assert!(!reply.contains_key("upserted"));
        assert!(!reply.contains_key("writeErrors"));
    }

    #[test]
    fn unacknowledged_reply_is_only_ok() {
        assert_eq!(WriteOutcome::Unacknowledged.to_document(), doc! { "ok": 1.0 });
    }
}
