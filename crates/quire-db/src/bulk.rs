use bson::Document;
use quire_query::Matcher;
use quire_store::Store;

use crate::database::Database;
use crate::error::CommandError;
use crate::request::WriteCommand;
use crate::result::WriteOutcome;
use crate::write_op::{BatchOptions, ExecutionMode, WriteConcern, WriteOp};

/// Carve a mixed batch into write commands, each paired with the batch
/// position of its first operation.
///
/// [`ExecutionMode::WriteCommands`] groups runs of same-kind operations (at
/// most `max_batch_size` per command); [`ExecutionMode::Legacy`] sends one
/// operation per command.
pub(crate) fn plan_commands(
    collection: &str,
    ops: &[WriteOp],
    options: &BatchOptions,
    max_batch_size: usize,
) -> Vec<(usize, WriteCommand)> {
    let mut commands = Vec::new();
    let mut start = 0;
    while start < ops.len() {
        let kind = ops[start].kind();
        let mut end = start + 1;
        if options.mode == ExecutionMode::WriteCommands {
            while end < ops.len() && end - start < max_batch_size && ops[end].kind() == kind {
                end += 1;
            }
        }
        commands.push((
            start,
            WriteCommand {
                kind,
                collection: collection.to_string(),
                ops: ops[start..end].to_vec(),
                ordered: options.ordered,
                write_concern: None,
                bypass_validation: options.bypass_validation,
            },
        ));
        start = end;
    }
    commands
}

// ── Bulk builder ───────────────────────────────────────────────

/// Accumulates writes against one collection and executes them as a batch.
pub struct BulkWrite<'db, S: Store, M: Matcher> {
    db: &'db Database<S, M>,
    collection: String,
    ordered: bool,
    ops: Vec<WriteOp>,
}

impl<'db, S: Store, M: Matcher> BulkWrite<'db, S, M> {
    pub(crate) fn new(db: &'db Database<S, M>, collection: &str, ordered: bool) -> Self {
        Self {
            db,
            collection: collection.to_string(),
            ordered,
            ops: Vec::new(),
        }
    }

    pub fn insert(&mut self, doc: Document) -> &mut Self {
        self.ops.push(WriteOp::insert(doc));
        self
    }

    /// Start an update or removal of the documents matching `q`.
    pub fn find(&mut self, q: Document) -> BulkFind<'_> {
        BulkFind {
            ops: &mut self.ops,
            q,
            upsert: false,
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Execute the accumulated operations. `None` uses the database's
    /// default write concern.
    pub fn execute(
        self,
        write_concern: Option<WriteConcern>,
        mode: ExecutionMode,
    ) -> Result<WriteOutcome, CommandError> {
        let options = BatchOptions {
            ordered: self.ordered,
            write_concern: write_concern.unwrap_or_else(|| self.db.config().write_concern.clone()),
            bypass_validation: self.db.config().bypass_validation,
            mode,
        };
        self.db.write(&self.collection, &self.ops, &options)
    }
}

/// A pending selector within a [`BulkWrite`].
pub struct BulkFind<'b> {
    ops: &'b mut Vec<WriteOp>,
    q: Document,
    upsert: bool,
}

impl BulkFind<'_> {
    /// Insert when nothing matches.
    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    pub fn update_one(self, u: Document) {
        self.push_update(u, false);
    }

    pub fn update(self, u: Document) {
        self.push_update(u, true);
    }

    pub fn replace_one(self, replacement: Document) {
        self.push_update(replacement, false);
    }

    pub fn remove_one(self) {
        self.ops.push(WriteOp::delete(self.q, 1));
    }

    pub fn remove(self) {
        self.ops.push(WriteOp::delete(self.q, 0));
    }

    fn push_update(self, u: Document, multi: bool) {
        self.ops
            .push(WriteOp::update(self.q, u, self.upsert, multi));
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::write_op::OpKind;

    fn mixed() -> Vec<WriteOp> {
        vec![
            WriteOp::insert(doc! { "a": 1 }),
            WriteOp::insert(doc! { "a": 2 }),
            WriteOp::update(doc! { "a": 1 }, doc! { "$set": { "b": 1 } }, false, false),
            WriteOp::delete(doc! { "a": 2 }, 1),
            WriteOp::delete(doc! { "a": 3 }, 1),
            WriteOp::insert(doc! { "a": 4 }),
        ]
    }

    #[test]
    fn write_commands_group_runs() {
        let plan = plan_commands("c", &mixed(), &BatchOptions::default(), 1000);
        let shape: Vec<(usize, OpKind, usize)> = plan
            .iter()
            .map(|(offset, cmd)| (*offset, cmd.kind, cmd.ops.len()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (0, OpKind::Insert, 2),
                (2, OpKind::Update, 1),
                (3, OpKind::Delete, 2),
                (5, OpKind::Insert, 1),
            ]
        );
    }

    #[test]
    fn write_commands_respect_batch_size() {
        let ops: Vec<WriteOp> = (0..5).map(|i| WriteOp::insert(doc! { "_id": i })).collect();
        let plan = plan_commands("c", &ops, &BatchOptions::default(), 2);
        let offsets: Vec<usize> = plan.iter().map(|(offset, _)| *offset).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
    }

    #[test]
    fn legacy_sends_one_op_per_command() {
        let options = BatchOptions::unordered().with_mode(ExecutionMode::Legacy);
        let plan = plan_commands("c", &mixed(), &options, 1000);
        assert_eq!(plan.len(), 6);
        assert!(plan.iter().all(|(_, cmd)| cmd.ops.len() == 1 && !cmd.ordered));
    }
}
