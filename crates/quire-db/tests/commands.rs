mod common;
use common::*;

use bson::{Bson, Document, doc};
use quire_db::{Database, DatabaseConfig, WriteConcern};
use quire_store::MemoryStore;

fn ok(reply: &Document) -> f64 {
    reply.get_f64("ok").unwrap()
}

fn seed(db: &Database<MemoryStore>) {
    let reply = db.run_command(&doc! {
        "insert": COLLECTION,
        "documents": [{ "_id": 1, "a": 1 }, { "_id": 2, "a": 2 }, { "_id": 3, "a": 2 }],
    });
    assert_eq!(ok(&reply), 1.0);
    assert_eq!(reply.get_i64("n").unwrap(), 3);
}

// ── Delete command ──────────────────────────────────────────

#[test]
fn delete_without_deletes_list_fails_as_a_whole() {
    let db = open_db();
    seed(&db);
    let reply = db.run_command(&doc! { "delete": COLLECTION });
    assert_eq!(ok(&reply), 0.0);
    assert!(matches!(reply.get("code"), Some(Bson::Int32(_))));
    assert!(matches!(reply.get("errmsg"), Some(Bson::String(_))));
    assert!(!reply.contains_key("writeErrors"));
    assert_eq!(count(&db, doc! {}), 3);
}

#[test]
fn delete_with_update_operator_reports_per_op_errors() {
    let db = open_db();
    seed(&db);
    let reply = db.run_command(&doc! {
        "delete": COLLECTION,
        "deletes": [
            { "q": { "$set": { "a": 1 } }, "limit": 0 },
            { "q": { "$set": { "a": 1 } }, "limit": 0 },
        ],
        "ordered": false,
    });
    assert_eq!(ok(&reply), 1.0);
    assert_eq!(reply.get_i64("n").unwrap(), 0);
    let errors = reply.get_array("writeErrors").unwrap();
    assert_eq!(errors.len(), 2);
    for (i, error) in errors.iter().enumerate() {
        let error = error.as_document().unwrap();
        assert_eq!(error.get_i32("index").unwrap(), i as i32);
        assert_eq!(error.get_i32("code").unwrap(), 2);
        assert_eq!(error.get_str("errmsg").unwrap(), "unknown top level operator: $set");
        assert_eq!(
            error.get_document("op").unwrap(),
            &doc! { "q": { "$set": { "a": 1 } }, "limit": 0 }
        );
    }
    assert_eq!(count(&db, doc! {}), 3);
}

#[test]
fn delete_removes_and_counts() {
    let db = open_db();
    seed(&db);
    let reply = db.run_command(&doc! {
        "delete": COLLECTION,
        "deletes": [{ "q": { "a": 2 }, "limit": 1 }, { "q": { "a": 1 }, "limit": 0 }],
    });
    assert_eq!(reply.get_i64("nRemoved").unwrap(), 2);
    assert_eq!(reply.get_i64("n").unwrap(), 2);
    assert_eq!(count(&db, doc! {}), 1);
}

#[test]
fn delete_with_bad_limit_fails_as_a_whole() {
    let db = open_db();
    seed(&db);
    let reply = db.run_command(&doc! {
        "delete": COLLECTION,
        "deletes": [{ "q": {}, "limit": 1 }, { "q": {}, "limit": 5 }],
    });
    assert_eq!(ok(&reply), 0.0);
    assert_eq!(reply.get_i32("code").unwrap(), 9);
    assert_eq!(count(&db, doc! {}), 3);
}

// ── Write concern ───────────────────────────────────────────

#[test]
fn unacknowledged_reply_is_only_ok() {
    let db = open_db();
    seed(&db);
    let reply = db.run_command(&doc! {
        "delete": COLLECTION,
        "deletes": [{ "q": { "$set": { "a": 1 } }, "limit": 0 }],
        "writeConcern": { "w": 0 },
    });
    assert_eq!(reply, doc! { "ok": 1.0 });

    let reply = db.run_command(&doc! {
        "delete": COLLECTION,
        "deletes": [{ "q": { "a": 2 }, "limit": 0 }],
        "writeConcern": { "w": 0 },
    });
    assert_eq!(reply, doc! { "ok": 1.0 });
    assert_eq!(count(&db, doc! {}), 1);
}

#[test]
fn unacknowledged_ordered_batch_still_halts() {
    let db = open_db();
    let reply = db.run_command(&doc! {
        "insert": COLLECTION,
        "documents": [{ "_id": 1 }, { "_id": 1 }, { "_id": 2 }],
        "writeConcern": { "w": 0 },
    });
    assert_eq!(reply, doc! { "ok": 1.0 });
    assert_eq!(count(&db, doc! {}), 1);
}

#[test]
fn replication_timeout_is_write_concern_failed() {
    let db = open_db();
    let reply = db.run_command(&doc! {
        "insert": COLLECTION,
        "documents": [{ "_id": 1 }],
        "writeConcern": { "w": 3, "wtimeout": 10 },
    });
    assert_eq!(ok(&reply), 0.0);
    assert_eq!(reply.get_i32("code").unwrap(), 64);
    // Applied locally regardless.
    assert_eq!(count(&db, doc! {}), 1);
}

#[test]
fn database_default_write_concern_applies() {
    let config = DatabaseConfig {
        write_concern: WriteConcern::unacknowledged(),
        ..DatabaseConfig::default()
    };
    let db = Database::open(MemoryStore::new(), config).unwrap();
    let reply = db.run_command(&doc! { "insert": COLLECTION, "documents": [{ "_id": 1 }] });
    assert_eq!(reply, doc! { "ok": 1.0 });

    let reply = db.run_command(&doc! {
        "insert": COLLECTION,
        "documents": [{ "_id": 2 }],
        "writeConcern": { "w": 1 },
    });
    assert_eq!(reply.get_i64("nInserted").unwrap(), 1);
}

#[test]
fn bad_write_concern_is_rejected() {
    let db = open_db();
    let reply = db.run_command(&doc! {
        "insert": COLLECTION,
        "documents": [{ "_id": 1 }],
        "writeConcern": { "w": "everyone" },
    });
    assert_eq!(ok(&reply), 0.0);
    assert_eq!(reply.get_i32("code").unwrap(), 2);
}

// ── Batch shape ─────────────────────────────────────────────

#[test]
fn oversized_batch_is_rejected() {
    let config = DatabaseConfig {
        max_batch_size: 2,
        ..DatabaseConfig::default()
    };
    let db = Database::open(MemoryStore::new(), config).unwrap();
    let reply = db.run_command(&doc! {
        "insert": COLLECTION,
        "documents": [{ "_id": 1 }, { "_id": 2 }, { "_id": 3 }],
    });
    assert_eq!(reply.get_i32("code").unwrap(), 16);
    assert_eq!(count(&db, doc! {}), 0);
}

#[test]
fn unknown_command() {
    let reply = open_db().run_command(&doc! { "frobnicate": 1 });
    assert_eq!(ok(&reply), 0.0);
    assert_eq!(reply.get_i32("code").unwrap(), 59);
}

// ── Update command ──────────────────────────────────────────

#[test]
fn update_reply_lists_upserts() {
    let db = open_db();
    seed(&db);
    let reply = db.run_command(&doc! {
        "update": COLLECTION,
        "updates": [
            { "q": { "a": 2 }, "u": { "$set": { "b": 1 } }, "multi": true },
            { "q": { "_id": 10 }, "u": { "$set": { "b": 1 } }, "upsert": true },
        ],
    });
    assert_eq!(reply.get_i64("nUpdated").unwrap(), 2);
    assert_eq!(reply.get_i64("nModified").unwrap(), 2);
    assert_eq!(reply.get_i64("nUpserted").unwrap(), 1);
    assert_eq!(reply.get_i64("n").unwrap(), 3);
    let upserted = reply.get_array("upserted").unwrap();
    assert_eq!(upserted, &vec![Bson::Document(doc! { "index": 1, "_id": 10 })]);
}

#[test]
fn insert_generates_leading_object_id() {
    let db = open_db();
    db.run_command(&doc! { "insert": COLLECTION, "documents": [{ "a": 1, "b": 2 }] });
    let stored = &all_docs(&db)[0];
    assert_eq!(stored.keys().next().unwrap(), "_id");
    assert!(matches!(stored.get("_id"), Some(Bson::ObjectId(_))));
}

// ── Collection commands ─────────────────────────────────────

#[test]
fn create_indexes_enforces_uniqueness() {
    let db = open_db();
    let reply = db.run_command(&doc! {
        "createIndexes": COLLECTION,
        "indexes": [{ "key": { "a": 1 }, "name": "a_1", "unique": true }],
    });
    assert_eq!(ok(&reply), 1.0);
    assert!(reply.get_bool("createdCollectionAutomatically").unwrap());
    assert_eq!(reply.get_i32("numIndexesBefore").unwrap(), 1);
    assert_eq!(reply.get_i32("numIndexesAfter").unwrap(), 2);

    let reply = db.run_command(&doc! {
        "insert": COLLECTION,
        "documents": [{ "a": 1 }, { "a": 1 }],
    });
    let errors = reply.get_array("writeErrors").unwrap();
    assert_eq!(errors[0].as_document().unwrap().get_i32("code").unwrap(), 11000);
}

#[test]
fn unique_index_over_duplicates_fails() {
    let db = open_db();
    seed(&db);
    let reply = db.run_command(&doc! {
        "createIndexes": COLLECTION,
        "indexes": [{ "key": { "a": 1 }, "unique": true }],
    });
    assert_eq!(ok(&reply), 0.0);
    assert_eq!(reply.get_i32("code").unwrap(), 11000);
    assert!(db.collection(COLLECTION).unique_fields().unwrap().is_empty());
}

#[test]
fn drop_indexes_and_collection() {
    let db = db_with_unique("a");
    let reply = db.run_command(&doc! { "dropIndexes": COLLECTION, "index": "a_1" });
    assert_eq!(ok(&reply), 1.0);
    assert_eq!(reply.get_i32("nIndexesWas").unwrap(), 2);

    let reply = db.run_command(&doc! { "dropIndexes": COLLECTION, "index": "a_1" });
    assert_eq!(reply.get_i32("code").unwrap(), 27);

    assert_eq!(ok(&db.run_command(&doc! { "drop": COLLECTION })), 1.0);
    let reply = db.run_command(&doc! { "drop": COLLECTION });
    assert_eq!(reply.get_i32("code").unwrap(), 26);
}

#[test]
fn count_and_find() {
    let db = open_db();
    seed(&db);
    let reply = db.run_command(&doc! { "count": COLLECTION, "query": { "a": 2 } });
    assert_eq!(reply.get_i64("n").unwrap(), 2);
    let reply = db.run_command(&doc! { "count": COLLECTION });
    assert_eq!(reply.get_i64("n").unwrap(), 3);

    let reply = db.run_command(&doc! { "find": COLLECTION, "filter": { "a": { "$gt": 1 } } });
    let batch = reply
        .get_document("cursor")
        .unwrap()
        .get_array("firstBatch")
        .unwrap();
    assert_eq!(
        batch,
        &vec![
            Bson::Document(doc! { "_id": 2, "a": 2 }),
            Bson::Document(doc! { "_id": 3, "a": 2 }),
        ]
    );

    let reply = db.run_command(&doc! { "find": COLLECTION, "filter": { "$bogus": 1 } });
    assert_eq!(reply.get_i32("code").unwrap(), 2);
}
