mod ops;

use std::fmt;

use bson::{Bson, Document};

use crate::compare::values_equal;

const ID_FIELD: &str = "_id";

// ── Errors ─────────────────────────────────────────────────────

/// The update document itself is malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateParseError(pub String);

impl fmt::Display for UpdateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UpdateParseError {}

/// Applying a well-formed update to a particular document failed.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateError {
    /// A modifier met a value it cannot operate on.
    Apply(String),
    /// The update would change the document's `_id`.
    ImmutableId { id: Bson },
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::Apply(msg) => f.write_str(msg),
            UpdateError::ImmutableId { id } => write!(
                f,
                "After applying the update to the document {{_id: {id}, ...}}, \
                 the (immutable) field '_id' was found to have been altered"
            ),
        }
    }
}

impl std::error::Error for UpdateError {}

// ── Types ──────────────────────────────────────────────────────

/// A single field-level mutation operator.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    /// Set a field to a value. Creates the field if it doesn't exist.
    Set(Bson),
    /// Remove a field from the document.
    Unset,
    /// Increment a numeric field by the given amount (negative for decrement).
    Inc(Bson),
    /// Move a field to another path.
    Rename(String),
    /// Append a value to an array field. Creates the array if missing.
    Push(Bson),
    /// Remove the last element of an array field.
    Pop,
    /// Remove the first element of an array field.
    PopFirst,
}

/// A single field + operator pair within a Mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMutation {
    pub field: String,
    pub op: MutationOp,
}

/// A modifier update: a list of (field, operator) pairs applied in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub ops: Vec<FieldMutation>,
}

/// What an update does to each matched document.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSpec {
    /// Swap the whole document (except `_id`) for this one.
    Replacement(Document),
    /// Apply field-level modifiers.
    Modifiers(Mutation),
}

// ── Parsing ────────────────────────────────────────────────────

/// Parse an update document.
///
/// A document whose first key starts with `$` is a modifier document and
/// every key must then be a known modifier (`$set`, `$unset`, `$inc`,
/// `$rename`, `$push`, `$pop`) mapping field paths to operands. Anything
/// else is a replacement document; its field names are left for storage
/// validation to judge.
pub fn parse_update(update: &Document) -> Result<UpdateSpec, UpdateParseError> {
    let is_modifier = update.keys().next().is_some_and(|k| k.starts_with('$'));
    if !is_modifier {
        return Ok(UpdateSpec::Replacement(update.clone()));
    }

    let mut ops = Vec::new();
    for (modifier, operand) in update {
        let Bson::Document(fields) = operand else {
            if !modifier.starts_with('$') {
                return Err(UpdateParseError(format!("Unknown modifier: {modifier}")));
            }
            return Err(UpdateParseError(format!(
                "Modifiers operate on fields but we found a {:?} instead. For example: \
                 {{$mod: {{<field>: ...}}}} not {{{modifier}: {operand}}}",
                operand.element_type()
            )));
        };
        if fields.is_empty() {
            return Err(UpdateParseError(format!(
                "'{modifier}' is empty. You must specify a field like so: \
                 {{{modifier}: {{<field_name>: ...}}}}"
            )));
        }
        for (field, value) in fields {
            check_field_path(field)?;
            let op = parse_op(modifier, field, value)?;
            ops.push(FieldMutation {
                field: field.clone(),
                op,
            });
        }
    }

    check_conflicts(&ops)?;
    Ok(UpdateSpec::Modifiers(Mutation { ops }))
}

fn parse_op(modifier: &str, field: &str, value: &Bson) -> Result<MutationOp, UpdateParseError> {
    let op = match modifier {
        "$set" => MutationOp::Set(value.clone()),
        "$unset" => MutationOp::Unset,
        "$inc" => {
            if !is_number(value) {
                return Err(UpdateParseError(format!(
                    "Cannot increment with non-numeric argument: {{{field}: {value}}}"
                )));
            }
            MutationOp::Inc(value.clone())
        }
        "$rename" => {
            let Bson::String(target) = value else {
                return Err(UpdateParseError(format!(
                    "The 'to' field for $rename must be a string: {field}: {value}"
                )));
            };
            check_field_path(target)?;
            if target == field {
                return Err(UpdateParseError(format!(
                    "The source and target field for $rename must differ: {field}: {value}"
                )));
            }
            MutationOp::Rename(target.clone())
        }
        "$push" => MutationOp::Push(value.clone()),
        "$pop" => match as_f64(value) {
            Some(n) if n < 0.0 => MutationOp::PopFirst,
            Some(_) => MutationOp::Pop,
            None => {
                return Err(UpdateParseError(format!(
                    "Expected a number in: {field}: {value}"
                )));
            }
        },
        other => return Err(UpdateParseError(format!("Unknown modifier: {other}"))),
    };
    Ok(op)
}

fn check_field_path(path: &str) -> Result<(), UpdateParseError> {
    if path.is_empty() {
        return Err(UpdateParseError(
            "An empty update path is not valid.".into(),
        ));
    }
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(UpdateParseError(format!(
                "The update path '{path}' contains an empty field name, which is not allowed."
            )));
        }
        if segment.starts_with('$') {
            return Err(UpdateParseError(format!(
                "The dollar ($) prefixed field '{segment}' in '{path}' is not valid for storage."
            )));
        }
    }
    Ok(())
}

/// Two operators may not touch the same path or a path and its prefix.
fn check_conflicts(ops: &[FieldMutation]) -> Result<(), UpdateParseError> {
    let mut touched: Vec<&str> = Vec::new();
    for fm in ops {
        touched.push(&fm.field);
        if let MutationOp::Rename(target) = &fm.op {
            touched.push(target);
        }
    }
    for (i, a) in touched.iter().enumerate() {
        for b in &touched[i + 1..] {
            if overlaps(a, b) {
                return Err(UpdateParseError(format!(
                    "Cannot update '{a}' and '{b}' at the same time"
                )));
            }
        }
    }
    Ok(())
}

fn overlaps(a: &str, b: &str) -> bool {
    let nested = |outer: &str, inner: &str| {
        inner.len() > outer.len()
            && inner.starts_with(outer)
            && inner.as_bytes()[outer.len()] == b'.'
    };
    a == b || nested(a, b) || nested(b, a)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn is_number(value: &Bson) -> bool {
    as_f64(value).is_some()
}

// ── Application ────────────────────────────────────────────────

impl Mutation {
    /// Apply every operator to `doc` in place. Returns whether anything changed.
    pub fn apply(&self, doc: &mut Document) -> Result<bool, UpdateError> {
        let mut changed = false;

        for fm in &self.ops {
            match &fm.op {
                MutationOp::Set(value) => {
                    if let Some((parent, leaf)) = ops::resolve_parent_mut(doc, &fm.field, true)? {
                        changed |= ops::op_set(parent, leaf, value);
                    }
                }
                MutationOp::Unset => {
                    if let Some((parent, leaf)) = ops::resolve_parent_mut(doc, &fm.field, false)? {
                        changed |= ops::op_unset(parent, leaf);
                    }
                }
                MutationOp::Inc(amount) => {
                    if let Some((parent, leaf)) = ops::resolve_parent_mut(doc, &fm.field, true)? {
                        changed |= ops::op_inc(parent, leaf, amount)?;
                    }
                }
                MutationOp::Rename(target) => {
                    let moved = match ops::resolve_parent_mut(doc, &fm.field, false)? {
                        Some((parent, leaf)) => parent.remove(leaf),
                        None => None,
                    };
                    if let Some(value) = moved {
                        if let Some((parent, leaf)) = ops::resolve_parent_mut(doc, target, true)? {
                            parent.insert(leaf, value);
                        }
                        changed = true;
                    }
                }
                MutationOp::Push(value) => {
                    if let Some((parent, leaf)) = ops::resolve_parent_mut(doc, &fm.field, true)? {
                        changed |= ops::op_push(parent, leaf, value)?;
                    }
                }
                MutationOp::Pop | MutationOp::PopFirst => {
                    let first = fm.op == MutationOp::PopFirst;
                    if let Some((parent, leaf)) = ops::resolve_parent_mut(doc, &fm.field, false)? {
                        changed |= ops::op_pop(parent, leaf, first)?;
                    }
                }
            }
        }

        Ok(changed)
    }
}

fn check_id_unchanged(before: &Document, after: &Document) -> Result<(), UpdateError> {
    match (before.get(ID_FIELD), after.get(ID_FIELD)) {
        (Some(old), Some(new)) if values_equal(old, new) => Ok(()),
        (None, None) => Ok(()),
        (Some(old), _) => Err(UpdateError::ImmutableId { id: old.clone() }),
        (None, Some(_)) => Err(UpdateError::ImmutableId { id: Bson::Null }),
    }
}

impl UpdateSpec {
    pub fn is_replacement(&self) -> bool {
        matches!(self, UpdateSpec::Replacement(_))
    }

    /// Compute the updated form of a stored document.
    ///
    /// Returns the new document and whether it differs from `doc`. The
    /// document's `_id` is carried over and may not change.
    pub fn apply(&self, doc: &Document) -> Result<(Document, bool), UpdateError> {
        match self {
            UpdateSpec::Replacement(replacement) => {
                let mut out = Document::new();
                if let Some(id) = doc.get(ID_FIELD) {
                    if let Some(new_id) = replacement.get(ID_FIELD)
                        && !values_equal(id, new_id)
                    {
                        return Err(UpdateError::ImmutableId { id: id.clone() });
                    }
                    out.insert(ID_FIELD, id.clone());
                }
                for (key, value) in replacement {
                    if key != ID_FIELD {
                        out.insert(key.clone(), value.clone());
                    }
                }
                let changed = out != *doc;
                Ok((out, changed))
            }
            UpdateSpec::Modifiers(mutation) => {
                let mut out = doc.clone();
                let changed = mutation.apply(&mut out)?;
                check_id_unchanged(doc, &out)?;
                Ok((out, changed))
            }
        }
    }

    /// Build the document an upsert inserts when `filter` matched nothing.
    ///
    /// Equality conditions of the filter seed the document (dotted paths
    /// become nested documents). Modifiers are then applied to the seed; a
    /// replacement is used as-is, inheriting the filter's `_id` when it has
    /// none. The result may still lack an `_id`.
    pub fn upsert_document(&self, filter: &Document) -> Result<Document, UpdateError> {
        let mut seed = Document::new();
        seed_equalities(filter, &mut seed)?;

        match self {
            UpdateSpec::Modifiers(mutation) => {
                let mut doc = seed.clone();
                mutation.apply(&mut doc)?;
                if seed.contains_key(ID_FIELD) {
                    check_id_unchanged(&seed, &doc)?;
                }
                Ok(doc)
            }
            UpdateSpec::Replacement(replacement) => {
                let mut doc = Document::new();
                if !replacement.contains_key(ID_FIELD)
                    && let Some(id) = seed.get(ID_FIELD)
                {
                    doc.insert(ID_FIELD, id.clone());
                }
                for (key, value) in replacement {
                    doc.insert(key.clone(), value.clone());
                }
                Ok(doc)
            }
        }
    }
}

/// Collect top-level (and `$and`-nested) equality conditions into `seed`.
fn seed_equalities(filter: &Document, seed: &mut Document) -> Result<(), UpdateError> {
    for (key, value) in filter {
        if key == "$and" {
            if let Bson::Array(items) = value {
                for item in items {
                    if let Bson::Document(sub) = item {
                        seed_equalities(sub, seed)?;
                    }
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }

        let equal_to = match value {
            Bson::RegularExpression(_) => None,
            Bson::Document(operators) if operators.keys().next().is_some_and(|k| k.starts_with('$')) => {
                operators.get("$eq")
            }
            other => Some(other),
        };
        if let Some(v) = equal_to
            && let Some((parent, leaf)) = ops::resolve_parent_mut(seed, key, true)?
        {
            parent.insert(leaf, v.clone());
        }
    }
    Ok(())
}
