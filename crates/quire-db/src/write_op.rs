use std::fmt;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// The three kinds of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    /// Command name for this kind.
    pub fn command(self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }

    /// Name of the command field that carries the operation list.
    pub fn list_field(self) -> &'static str {
        match self {
            OpKind::Insert => "documents",
            OpKind::Update => "updates",
            OpKind::Delete => "deletes",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// A single write request. Its position in a batch is its index.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert {
        doc: Document,
    },
    Update {
        q: Document,
        u: Document,
        upsert: bool,
        multi: bool,
    },
    /// `limit` 0 removes every match, 1 at most one.
    Delete {
        q: Document,
        limit: u32,
    },
}

impl WriteOp {
    pub fn insert(doc: Document) -> Self {
        WriteOp::Insert { doc }
    }

    pub fn update(q: Document, u: Document, upsert: bool, multi: bool) -> Self {
        WriteOp::Update { q, u, upsert, multi }
    }

    pub fn delete(q: Document, limit: u32) -> Self {
        WriteOp::Delete { q, limit }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            WriteOp::Insert { .. } => OpKind::Insert,
            WriteOp::Update { .. } => OpKind::Update,
            WriteOp::Delete { .. } => OpKind::Delete,
        }
    }

    /// The operation as it appears in a write command's list.
    pub fn to_document(&self) -> Document {
        match self {
            WriteOp::Insert { doc } => doc.clone(),
            WriteOp::Update { q, u, upsert, multi } => doc! {
                "q": q.clone(),
                "u": u.clone(),
                "upsert": *upsert,
                "multi": *multi,
            },
            WriteOp::Delete { q, limit } => doc! {
                "q": q.clone(),
                "limit": *limit as i32,
            },
        }
    }
}

// ── Write concern ──────────────────────────────────────────────

/// The `w` component of a write concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum W {
    /// Number of nodes that must acknowledge; 0 means fire-and-forget.
    Nodes(u32),
    /// A named mode such as `"majority"` or a replica set tag.
    Mode(String),
}

/// The acknowledgment level a write requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Document", into = "Document")]
pub struct WriteConcern {
    pub w: W,
    /// Milliseconds to wait for acknowledgment; `None` waits indefinitely.
    pub wtimeout: Option<u64>,
    pub journal: Option<bool>,
    pub fsync: Option<bool>,
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self::acknowledged()
    }
}

impl WriteConcern {
    pub fn acknowledged() -> Self {
        Self::nodes(1)
    }

    pub fn unacknowledged() -> Self {
        Self::nodes(0)
    }

    pub fn majority() -> Self {
        Self {
            w: W::Mode("majority".into()),
            ..Self::acknowledged()
        }
    }

    pub fn nodes(n: u32) -> Self {
        Self {
            w: W::Nodes(n),
            wtimeout: None,
            journal: None,
            fsync: None,
        }
    }

    pub fn with_timeout(mut self, millis: u64) -> Self {
        self.wtimeout = Some(millis);
        self
    }

    /// `w:0` without journaling or fsync: the caller sees no outcome.
    pub fn is_unacknowledged(&self) -> bool {
        self.w == W::Nodes(0) && self.journal != Some(true) && self.fsync != Some(true)
    }

    /// Parse a `writeConcern` document: `{w, wtimeout, j, fsync}`.
    pub fn from_document(doc: &Document) -> Result<Self, CommandError> {
        let mut wc = WriteConcern::acknowledged();
        for (key, value) in doc {
            match key.as_str() {
                "w" => {
                    wc.w = match value {
                        Bson::String(mode) => W::Mode(mode.clone()),
                        other => match as_count(other) {
                            Some(n) => W::Nodes(n),
                            None => return Err(bad_wc("w has to be a number or a string")),
                        },
                    }
                }
                "wtimeout" => {
                    wc.wtimeout = match as_count(value) {
                        Some(0) => None,
                        Some(n) => Some(u64::from(n)),
                        None => return Err(bad_wc("wtimeout must be a non-negative number")),
                    }
                }
                "j" => {
                    wc.journal = Some(as_bool(value).ok_or_else(|| bad_wc("j must be a boolean"))?)
                }
                "fsync" => {
                    wc.fsync = Some(as_bool(value).ok_or_else(|| bad_wc("fsync must be a boolean"))?)
                }
                // Legacy getLastError carries these alongside the concern itself.
                "getLastError" | "wElectionId" => {}
                other => {
                    return Err(bad_wc(&format!("unrecognized write concern field: {other}")));
                }
            }
        }
        if wc.journal == Some(true) && wc.fsync == Some(true) {
            return Err(bad_wc("fsync and j options cannot be used together"));
        }
        Ok(wc)
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        match &self.w {
            W::Nodes(n) => match i32::try_from(*n) {
                Ok(n) => doc.insert("w", n),
                Err(_) => doc.insert("w", i64::from(*n)),
            },
            W::Mode(mode) => doc.insert("w", mode.clone()),
        };
        if let Some(ms) = self.wtimeout {
            doc.insert("wtimeout", ms as i64);
        }
        if let Some(j) = self.journal {
            doc.insert("j", j);
        }
        if let Some(fsync) = self.fsync {
            doc.insert("fsync", fsync);
        }
        doc
    }
}

impl TryFrom<Document> for WriteConcern {
    type Error = CommandError;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        WriteConcern::from_document(&doc)
    }
}

impl From<WriteConcern> for Document {
    fn from(wc: WriteConcern) -> Self {
        wc.to_document()
    }
}

fn bad_wc(msg: &str) -> CommandError {
    CommandError::new(crate::error::ErrorCode::BadValue, msg)
}

/// A non-negative integral number, in any numeric representation.
pub(crate) fn as_count(value: &Bson) -> Option<u32> {
    match value {
        Bson::Int32(n) => u32::try_from(*n).ok(),
        Bson::Int64(n) => u32::try_from(*n).ok(),
        Bson::Double(n) if n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64 => {
            Some(*n as u32)
        }
        _ => None,
    }
}

pub(crate) fn as_bool(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        Bson::Int32(n) => Some(*n != 0),
        Bson::Int64(n) => Some(*n != 0),
        Bson::Double(n) => Some(*n != 0.0),
        _ => None,
    }
}

// ── Batch options ──────────────────────────────────────────────

/// How a mixed batch reaches the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Consecutive operations of one kind travel as one write command.
    #[default]
    WriteCommands,
    /// Every operation travels as its own single-operation command.
    Legacy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Stop at the first failed operation.
    pub ordered: bool,
    pub write_concern: WriteConcern,
    /// Skip storage validation of written documents.
    pub bypass_validation: bool,
    pub mode: ExecutionMode,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            ordered: true,
            write_concern: WriteConcern::default(),
            bypass_validation: false,
            mode: ExecutionMode::default(),
        }
    }
}

impl BatchOptions {
    pub fn ordered() -> Self {
        Self::default()
    }

    pub fn unordered() -> Self {
        Self {
            ordered: false,
            ..Self::default()
        }
    }

    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = write_concern;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn bypass_validation(mut self, bypass: bool) -> Self {
        self.bypass_validation = bypass;
        self
    }
}
