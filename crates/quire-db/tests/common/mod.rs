#![allow(dead_code)]

use bson::{Bson, Document, doc};
use quire_db::{
    BatchOptions, BatchResult, Database, DatabaseConfig, ExecutionMode, WriteOp, WriteOutcome,
};
use quire_store::MemoryStore;

pub const COLLECTION: &str = "batch";

pub fn open_db() -> Database<MemoryStore> {
    Database::open(MemoryStore::new(), DatabaseConfig::default()).unwrap()
}

/// A database whose collection carries a unique constraint on `field`.
pub fn db_with_unique(field: &str) -> Database<MemoryStore> {
    let db = open_db();
    assert!(db.collection(COLLECTION).create_index(field, true).unwrap());
    db
}

pub fn insert(doc: Document) -> WriteOp {
    WriteOp::insert(doc)
}

pub fn update_one(q: Document, u: Document) -> WriteOp {
    WriteOp::update(q, u, false, false)
}

pub fn upsert(q: Document, u: Document) -> WriteOp {
    WriteOp::update(q, u, true, false)
}

pub fn remove_one(q: Document) -> WriteOp {
    WriteOp::delete(q, 1)
}

/// Run `ops` and return the acknowledged result.
pub fn run(db: &Database<MemoryStore>, ops: &[WriteOp], options: &BatchOptions) -> BatchResult {
    match db.collection(COLLECTION).write(ops, options).unwrap() {
        WriteOutcome::Acknowledged(result) => result,
        WriteOutcome::Unacknowledged => panic!("expected an acknowledged write"),
    }
}

/// Run `ops` in both execution modes against fresh databases prepared by
/// `setup` and check the results agree.
pub fn run_both_modes(
    setup: impl Fn() -> Database<MemoryStore>,
    ops: &[WriteOp],
    options: BatchOptions,
) -> BatchResult {
    let commands = run(&setup(), ops, &options.clone().with_mode(ExecutionMode::WriteCommands));
    let legacy = run(&setup(), ops, &options.with_mode(ExecutionMode::Legacy));
    assert_eq!(strip_ids(&commands), strip_ids(&legacy));
    commands
}

/// Generated ObjectIds differ between runs; blank them for comparison.
fn strip_ids(result: &BatchResult) -> BatchResult {
    let mut result = result.clone();
    for entry in &mut result.upserted {
        if matches!(entry.id, Bson::ObjectId(_)) {
            entry.id = Bson::Null;
        }
    }
    result
}

pub fn error_indexes(result: &BatchResult) -> Vec<usize> {
    result.write_errors.iter().map(|e| e.index).collect()
}

pub fn all_docs(db: &Database<MemoryStore>) -> Vec<Document> {
    db.collection(COLLECTION).find(&doc! {}).unwrap()
}

pub fn count(db: &Database<MemoryStore>, filter: Document) -> u64 {
    db.collection(COLLECTION).count(&filter).unwrap()
}
