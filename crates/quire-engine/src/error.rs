use std::fmt;

use quire_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    Store(StoreError),
    Encoding(String),
    CollectionNotFound(String),
    InvalidCollectionName(String),
    /// A unique constraint rejected the write.
    DuplicateKey {
        collection: String,
        index: String,
        key: String,
    },
    InvalidDocument(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Encoding(msg) => write!(f, "encoding error: {msg}"),
            Self::CollectionNotFound(name) => write!(f, "collection not found: {name}"),
            Self::InvalidCollectionName(name) => write!(f, "invalid collection name: '{name}'"),
            Self::DuplicateKey {
                collection,
                index,
                key,
            } => write!(
                f,
                "E11000 duplicate key error collection: {collection} index: {index} dup key: {key}"
            ),
            Self::InvalidDocument(msg) => write!(f, "invalid document: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<bson::ser::Error> for EngineError {
    fn from(e: bson::ser::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<bson::de::Error> for EngineError {
    fn from(e: bson::de::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}
