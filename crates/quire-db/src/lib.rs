mod ack;
mod bulk;
mod collection;
mod database;
mod error;
mod executor;
mod request;
mod result;
mod write_op;

pub use ack::{AckError, Replication, Standalone};
pub use bulk::{BulkFind, BulkWrite};
pub use collection::Collection;
pub use database::{Database, DatabaseConfig};
pub use error::{CommandError, DbError, ErrorCode};
pub use executor::WriteBatchExecutor;
pub use request::WriteCommand;
pub use result::{BatchResult, UpsertedEntry, WriteError, WriteOutcome};
pub use write_op::{BatchOptions, ExecutionMode, OpKind, W, WriteConcern, WriteOp};

