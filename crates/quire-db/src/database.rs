use bson::{Bson, Document, doc};
use quire_engine::KvEngine;
use quire_query::{ExpressionMatcher, Matcher};
use quire_store::Store;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ack::{Replication, Standalone};
use crate::bulk::plan_commands;
use crate::collection::Collection;
use crate::error::{CommandError, DbError, ErrorCode};
use crate::executor::WriteBatchExecutor;
use crate::request::{WriteCommand, check_namespace};
use crate::result::{BatchResult, WriteOutcome};
use crate::write_op::{BatchOptions, WriteConcern, WriteOp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Write concern for writes that do not carry their own.
    pub write_concern: WriteConcern,
    /// Most operations a single write command may carry.
    pub max_batch_size: usize,
    /// Skip storage validation for every write.
    pub bypass_validation: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            write_concern: WriteConcern::acknowledged(),
            max_batch_size: 1000,
            bypass_validation: false,
        }
    }
}

/// An in-process document database over a key-value [`Store`].
pub struct Database<S: Store, M: Matcher = ExpressionMatcher> {
    engine: KvEngine<S>,
    matcher: M,
    replication: Box<dyn Replication>,
    config: DatabaseConfig,
}

impl<S: Store> Database<S> {
    /// Open a standalone database with the default matcher.
    pub fn open(store: S, config: DatabaseConfig) -> Result<Self, DbError> {
        Self::with_parts(store, config, ExpressionMatcher, Box::new(Standalone))
    }
}

impl<S: Store, M: Matcher> Database<S, M> {
    pub fn with_parts(
        store: S,
        config: DatabaseConfig,
        matcher: M,
        replication: Box<dyn Replication>,
    ) -> Result<Self, DbError> {
        Ok(Self {
            engine: KvEngine::new(store)?,
            matcher,
            replication,
            config,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn engine(&self) -> &KvEngine<S> {
        &self.engine
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    pub fn collection(&self, name: &str) -> Collection<'_, S, M> {
        Collection::new(self, name)
    }

    pub fn list_collections(&self) -> Result<Vec<String>, DbError> {
        let txn = self.engine.begin(true)?;
        Ok(txn.list_collections()?)
    }

    // ── Writes ─────────────────────────────────────────────────

    /// Apply a batch of writes of any kinds to one collection.
    ///
    /// The batch travels as write commands according to `options.mode`;
    /// the outcome is the same either way. Acknowledgment is awaited once,
    /// after the whole batch.
    pub fn write(
        &self,
        collection: &str,
        ops: &[WriteOp],
        options: &BatchOptions,
    ) -> Result<WriteOutcome, CommandError> {
        check_namespace(collection)?;
        if ops.is_empty() {
            return Err(CommandError::new(
                ErrorCode::InvalidLength,
                "cannot execute an empty batch",
            ));
        }

        let mut result = BatchResult::default();
        for (offset, command) in plan_commands(collection, ops, options, self.config.max_batch_size) {
            let sub = self.execute(&command, options);
            let failed = sub.has_errors();
            result.merge(sub, offset);
            if failed && options.ordered {
                break;
            }
        }
        self.acknowledge(result, &options.write_concern)
    }

    /// Execute a parsed write command and await its write concern.
    pub fn run_write_command(&self, command: &WriteCommand) -> Result<WriteOutcome, CommandError> {
        let options = command.options(&self.config.write_concern);
        let result = self.execute(command, &options);
        self.acknowledge(result, &options.write_concern)
    }

    fn execute(&self, command: &WriteCommand, options: &BatchOptions) -> BatchResult {
        let options = BatchOptions {
            ordered: command.ordered,
            bypass_validation: command.bypass_validation
                || options.bypass_validation
                || self.config.bypass_validation,
            ..options.clone()
        };
        WriteBatchExecutor::new(&self.engine, &self.matcher).execute(
            &command.collection,
            &command.ops,
            &options,
        )
    }

    fn acknowledge(
        &self,
        result: BatchResult,
        write_concern: &WriteConcern,
    ) -> Result<WriteOutcome, CommandError> {
        if write_concern.is_unacknowledged() {
            return Ok(WriteOutcome::Unacknowledged);
        }
        if let Err(error) = self.replication.await_acknowledgment(write_concern) {
            warn!(%error, "write concern not satisfied");
            return Err(error.into());
        }
        Ok(WriteOutcome::Acknowledged(result))
    }

    // ── Commands ───────────────────────────────────────────────

    /// Run a command document and render its reply. Failures of the
    /// command as a whole come back as `{ok: 0, code, errmsg}`.
    pub fn run_command(&self, cmd: &Document) -> Document {
        match self.dispatch(cmd) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(code = error.code.code(), errmsg = %error.errmsg, "command failed");
                error.to_document()
            }
        }
    }

    fn dispatch(&self, cmd: &Document) -> Result<Document, CommandError> {
        let Some(name) = cmd.keys().next() else {
            return Err(CommandError::failed_to_parse("empty command document"));
        };
        debug!(command = name.as_str(), "running command");

        match name.as_str() {
            "insert" | "update" | "delete" => {
                let command = WriteCommand::parse(cmd, self.config.max_batch_size)?;
                Ok(self.run_write_command(&command)?.to_document())
            }
            "createIndexes" => self.create_indexes(cmd),
            "dropIndexes" => self.drop_indexes(cmd),
            "drop" => {
                let collection = self.target(cmd)?;
                if !collection.drop()? {
                    return Err(CommandError::new(ErrorCode::NamespaceNotFound, "ns not found"));
                }
                Ok(doc! { "ok": 1.0, "ns": collection.name() })
            }
            "count" => {
                let collection = self.target(cmd)?;
                let query = optional_document(cmd, "query")?;
                let n = collection.count(&query)?;
                Ok(doc! { "ok": 1.0, "n": n as i64 })
            }
            "find" => {
                let collection = self.target(cmd)?;
                let filter = optional_document(cmd, "filter")?;
                let docs: Vec<Bson> = collection
                    .find(&filter)?
                    .into_iter()
                    .map(Bson::Document)
                    .collect();
                Ok(doc! {
                    "ok": 1.0,
                    "cursor": { "id": 0i64, "ns": collection.name(), "firstBatch": docs },
                })
            }
            other => Err(CommandError::new(
                ErrorCode::CommandNotFound,
                format!("no such command: '{other}'"),
            )),
        }
    }

    /// The collection named by the command's first field.
    fn target(&self, cmd: &Document) -> Result<Collection<'_, S, M>, CommandError> {
        match cmd.iter().next() {
            Some((_, Bson::String(name))) => {
                check_namespace(name)?;
                Ok(self.collection(name))
            }
            Some((command, _)) => Err(CommandError::failed_to_parse(format!(
                "{command} requires a collection name"
            ))),
            None => Err(CommandError::failed_to_parse("empty command document")),
        }
    }

    /// `{createIndexes: coll, indexes: [{key: {field: 1}, name?, unique?}]}`
    fn create_indexes(&self, cmd: &Document) -> Result<Document, CommandError> {
        let collection = self.target(cmd)?;
        let specs = match cmd.get("indexes") {
            Some(Bson::Array(specs)) if !specs.is_empty() => specs,
            _ => {
                return Err(CommandError::failed_to_parse(
                    "indexes must be a non-empty array",
                ));
            }
        };

        let existed = self.list_collections()?.iter().any(|c| c == collection.name());
        let before = collection.unique_fields()?.len() + 1;
        for spec in specs {
            let Some(spec) = spec.as_document() else {
                return Err(CommandError::failed_to_parse("index specs must be objects"));
            };
            let key = spec
                .get_document("key")
                .map_err(|_| CommandError::failed_to_parse("index spec needs a key object"))?;
            let mut fields = key.keys();
            let (Some(field), None) = (fields.next(), fields.next()) else {
                return Err(CommandError::new(
                    ErrorCode::BadValue,
                    "only single-field indexes are supported",
                ));
            };
            let unique = spec.get_bool("unique").unwrap_or(false);
            collection.create_index(field, unique)?;
        }
        let after = collection.unique_fields()?.len() + 1;

        Ok(doc! {
            "ok": 1.0,
            "createdCollectionAutomatically": !existed,
            "numIndexesBefore": before as i32,
            "numIndexesAfter": after as i32,
        })
    }

    /// `{dropIndexes: coll, index: "<field>_1" | "*"}`
    fn drop_indexes(&self, cmd: &Document) -> Result<Document, CommandError> {
        let collection = self.target(cmd)?;
        let index = cmd
            .get_str("index")
            .map_err(|_| CommandError::failed_to_parse("index must be a name or \"*\""))?;
        let fields = collection.unique_fields()?;
        if index == "*" {
            for field in &fields {
                collection.drop_index(field)?;
            }
        } else {
            let field = index.strip_suffix("_1").unwrap_or(index);
            collection.drop_index(field)?;
        }
        Ok(doc! { "ok": 1.0, "nIndexesWas": (fields.len() + 1) as i32 })
    }
}

fn optional_document(cmd: &Document, field: &str) -> Result<Document, CommandError> {
    match cmd.get(field) {
        None | Some(Bson::Null) => Ok(Document::new()),
        Some(Bson::Document(doc)) => Ok(doc.clone()),
        Some(_) => Err(CommandError::failed_to_parse(format!(
            "{field} must be an object"
        ))),
    }
}

