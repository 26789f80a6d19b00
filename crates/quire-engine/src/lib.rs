mod encoding;
mod error;
mod key;
mod kv;
mod traits;
mod validate;

pub use encoding::{index_values, value_key};
pub use error::EngineError;
pub use kv::{KvEngine, KvTransaction, SYS_CF};
pub use traits::{CollectionConfig, CollectionHandle};
pub use validate::{ValidationError, validate_for_storage};
