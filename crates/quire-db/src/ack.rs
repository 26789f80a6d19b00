use std::fmt;

use crate::error::{CommandError, ErrorCode};
use crate::write_op::{W, WriteConcern};

/// Why a requested acknowledgment level was not reached.
#[derive(Debug, Clone, PartialEq)]
pub enum AckError {
    /// Waited `wtimeout` milliseconds without enough acknowledgments.
    Timeout { waited_ms: u64 },
    /// The write concern can never be satisfied by this deployment.
    Unsatisfiable(String),
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckError::Timeout { waited_ms } => {
                write!(f, "waiting for replication timed out after {waited_ms}ms")
            }
            AckError::Unsatisfiable(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for AckError {}

impl From<AckError> for CommandError {
    fn from(e: AckError) -> Self {
        let code = match e {
            AckError::Timeout { .. } => ErrorCode::WriteConcernFailed,
            AckError::Unsatisfiable(_) => ErrorCode::BadValue,
        };
        CommandError::new(code, e.to_string())
    }
}

/// Waits until a write is acknowledged at the requested level.
///
/// Called once per batch, after the batch has been applied locally, and
/// never for `w:0`.
pub trait Replication: Send + Sync {
    fn await_acknowledgment(&self, write_concern: &WriteConcern) -> Result<(), AckError>;
}

/// A single node with no replicas: `w:1` and `"majority"` are satisfied by
/// the local write itself, anything needing more nodes cannot be.
#[derive(Debug, Clone, Copy, Default)]
pub struct Standalone;

impl Replication for Standalone {
    fn await_acknowledgment(&self, write_concern: &WriteConcern) -> Result<(), AckError> {
        match &write_concern.w {
            W::Nodes(n) if *n <= 1 => Ok(()),
            W::Mode(mode) if mode == "majority" => Ok(()),
            W::Nodes(n) => match write_concern.wtimeout {
                Some(waited_ms) => Err(AckError::Timeout { waited_ms }),
                None => Err(AckError::Unsatisfiable(format!(
                    "cannot satisfy w:{n} without replication"
                ))),
            },
            W::Mode(tag) => Err(AckError::Unsatisfiable(format!(
                "unrecognized write concern mode: {tag}"
            ))),
        }
    }
}
