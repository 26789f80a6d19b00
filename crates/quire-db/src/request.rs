use bson::{Bson, Document};
use quire_engine::SYS_CF;

use crate::error::{CommandError, ErrorCode};
use crate::write_op::{BatchOptions, OpKind, WriteConcern, WriteOp, as_bool, as_count};

/// A parsed `insert`, `update` or `delete` command.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCommand {
    pub kind: OpKind,
    pub collection: String,
    pub ops: Vec<WriteOp>,
    pub ordered: bool,
    /// `None` defers to the database default.
    pub write_concern: Option<WriteConcern>,
    pub bypass_validation: bool,
}

impl WriteCommand {
    /// Parse a write command document, rejecting malformed batches as a
    /// whole before any operation is looked at by the executor.
    pub fn parse(cmd: &Document, max_batch_size: usize) -> Result<Self, CommandError> {
        let Some((name, target)) = cmd.iter().next() else {
            return Err(CommandError::failed_to_parse("empty command document"));
        };
        let kind = match name.as_str() {
            "insert" => OpKind::Insert,
            "update" => OpKind::Update,
            "delete" => OpKind::Delete,
            other => {
                return Err(CommandError::new(
                    ErrorCode::CommandNotFound,
                    format!("no such command: '{other}'"),
                ));
            }
        };
        let collection = match target {
            Bson::String(name) => name.clone(),
            other => {
                return Err(CommandError::failed_to_parse(format!(
                    "collection name has invalid type {:?}",
                    other.element_type()
                )));
            }
        };
        check_namespace(&collection)?;

        let list_field = kind.list_field();
        let mut items = None;
        let mut ordered = true;
        let mut write_concern = None;
        let mut bypass_validation = false;

        for (key, value) in cmd.iter().skip(1) {
            match key.as_str() {
                k if k == list_field => match value {
                    Bson::Array(list) => items = Some(list),
                    _ => {
                        return Err(CommandError::failed_to_parse(format!(
                            "{list_field} must be an array"
                        )));
                    }
                },
                "ordered" => ordered = bool_field(key, value)?,
                "bypassDocumentValidation" => bypass_validation = bool_field(key, value)?,
                "writeConcern" => match value {
                    Bson::Document(wc) => write_concern = Some(WriteConcern::from_document(wc)?),
                    _ => {
                        return Err(CommandError::failed_to_parse(
                            "writeConcern must be an object",
                        ));
                    }
                },
                other => {
                    return Err(CommandError::failed_to_parse(format!(
                        "unknown field name: {other}"
                    )));
                }
            }
        }

        let Some(items) = items else {
            return Err(CommandError::failed_to_parse(format!(
                "missing {list_field} field"
            )));
        };
        if items.is_empty() {
            return Err(CommandError::new(
                ErrorCode::InvalidLength,
                "no write ops were included in the batch",
            ));
        }
        if items.len() > max_batch_size {
            return Err(CommandError::new(
                ErrorCode::InvalidLength,
                format!("exceeded maximum write batch size of {max_batch_size}"),
            ));
        }

        let ops = items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_op(kind, i, item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kind,
            collection,
            ops,
            ordered,
            write_concern,
            bypass_validation,
        })
    }

    /// Options for executing this command, falling back to `default_wc`.
    pub fn options(&self, default_wc: &WriteConcern) -> BatchOptions {
        BatchOptions {
            ordered: self.ordered,
            write_concern: self
                .write_concern
                .clone()
                .unwrap_or_else(|| default_wc.clone()),
            bypass_validation: self.bypass_validation,
            ..BatchOptions::default()
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(self.kind.command(), self.collection.clone());
        let ops: Vec<Bson> = self
            .ops
            .iter()
            .map(|op| Bson::Document(op.to_document()))
            .collect();
        doc.insert(self.kind.list_field(), ops);
        doc.insert("ordered", self.ordered);
        if let Some(wc) = &self.write_concern {
            doc.insert("writeConcern", wc.to_document());
        }
        if self.bypass_validation {
            doc.insert("bypassDocumentValidation", true);
        }
        doc
    }
}

/// Reject collection names no write may target.
pub(crate) fn check_namespace(name: &str) -> Result<(), CommandError> {
    if name.is_empty() || name.contains('\0') || name.starts_with('$') || name == SYS_CF {
        return Err(CommandError::new(
            ErrorCode::InvalidNamespace,
            format!("Invalid namespace specified '{name}'"),
        ));
    }
    Ok(())
}

/// Booleans, or numbers standing in for them.
fn bool_field(key: &str, value: &Bson) -> Result<bool, CommandError> {
    as_bool(value)
        .ok_or_else(|| CommandError::failed_to_parse(format!("{key} must be a boolean")))
}

fn sub_document<'a>(
    field: &str,
    value: &'a Bson,
    location: &str,
) -> Result<&'a Document, CommandError> {
    match value {
        Bson::Document(doc) => Ok(doc),
        _ => Err(CommandError::failed_to_parse(format!(
            "{location}.{field} must be an object"
        ))),
    }
}

fn parse_op(kind: OpKind, index: usize, item: &Bson) -> Result<WriteOp, CommandError> {
    let location = format!("{}.{index}", kind.list_field());
    let Bson::Document(entry) = item else {
        return Err(CommandError::failed_to_parse(format!(
            "{location} must be an object"
        )));
    };

    match kind {
        OpKind::Insert => Ok(WriteOp::insert(entry.clone())),
        OpKind::Update => {
            let (mut q, mut u, mut upsert, mut multi) = (None, None, false, false);
            for (key, value) in entry {
                match key.as_str() {
                    "q" => q = Some(sub_document(key, value, &location)?.clone()),
                    "u" => u = Some(sub_document(key, value, &location)?.clone()),
                    "upsert" => upsert = bool_field(key, value)?,
                    "multi" => multi = bool_field(key, value)?,
                    other => {
                        return Err(CommandError::failed_to_parse(format!(
                            "unknown field name in {location}: {other}"
                        )));
                    }
                }
            }
            let q = q.ok_or_else(|| CommandError::failed_to_parse(format!("{location}.q is missing")))?;
            let u = u.ok_or_else(|| CommandError::failed_to_parse(format!("{location}.u is missing")))?;
            Ok(WriteOp::update(q, u, upsert, multi))
        }
        OpKind::Delete => {
            let (mut q, mut limit) = (None, None);
            for (key, value) in entry {
                match key.as_str() {
                    "q" => q = Some(sub_document(key, value, &location)?.clone()),
                    "limit" => match as_count(value) {
                        Some(n @ (0 | 1)) => limit = Some(n),
                        _ => {
                            return Err(CommandError::failed_to_parse(format!(
                                "The limit field in delete objects must be 0 or 1. Got {value}"
                            )));
                        }
                    },
                    other => {
                        return Err(CommandError::failed_to_parse(format!(
                            "unknown field name in {location}: {other}"
                        )));
                    }
                }
            }
            let q = q.ok_or_else(|| CommandError::failed_to_parse(format!("{location}.q is missing")))?;
            let limit = limit.ok_or_else(|| {
                CommandError::failed_to_parse(format!("{location}.limit is missing"))
            })?;
            Ok(WriteOp::delete(q, limit))
        }
    }
}
