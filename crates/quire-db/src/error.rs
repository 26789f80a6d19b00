use std::fmt;

use bson::{Document, doc};
use quire_engine::{EngineError, ValidationError};
use quire_query::{FilterParseError, UpdateError, UpdateParseError};
use quire_store::StoreError;

/// Numeric error codes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError = 1,
    BadValue = 2,
    FailedToParse = 9,
    InvalidLength = 16,
    NamespaceNotFound = 26,
    IndexNotFound = 27,
    DollarPrefixedFieldName = 52,
    InvalidIdField = 53,
    DottedFieldName = 57,
    CommandNotFound = 59,
    WriteConcernFailed = 64,
    ImmutableField = 66,
    InvalidNamespace = 73,
    DuplicateKey = 11000,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// ── DbError ────────────────────────────────────────────────────

/// Failure of a single write operation or helper call.
#[derive(Debug)]
pub enum DbError {
    Engine(EngineError),
    Validation(ValidationError),
    InvalidQuery(FilterParseError),
    InvalidUpdate(UpdateParseError),
    Update(UpdateError),
    BadValue(String),
    FailedToParse(String),
    IndexNotFound(String),
}

impl DbError {
    /// The code this failure is reported under.
    pub fn code(&self) -> ErrorCode {
        match self {
            DbError::Engine(e) => match e {
                EngineError::DuplicateKey { .. } => ErrorCode::DuplicateKey,
                EngineError::CollectionNotFound(_) => ErrorCode::NamespaceNotFound,
                EngineError::InvalidCollectionName(_) => ErrorCode::InvalidNamespace,
                EngineError::InvalidDocument(_) => ErrorCode::BadValue,
                EngineError::Store(_) | EngineError::Encoding(_) => ErrorCode::InternalError,
            },
            DbError::Validation(e) => match e {
                ValidationError::DollarPrefixedField(_) => ErrorCode::DollarPrefixedFieldName,
                ValidationError::DottedField(_) => ErrorCode::DottedFieldName,
                ValidationError::IdRegex | ValidationError::IdArray => ErrorCode::InvalidIdField,
            },
            DbError::InvalidQuery(_) | DbError::BadValue(_) => ErrorCode::BadValue,
            DbError::InvalidUpdate(_) | DbError::FailedToParse(_) => ErrorCode::FailedToParse,
            DbError::Update(e) => match e {
                UpdateError::ImmutableId { .. } => ErrorCode::ImmutableField,
                UpdateError::Apply(_) => ErrorCode::BadValue,
            },
            DbError::IndexNotFound(_) => ErrorCode::IndexNotFound,
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Engine(e) => write!(f, "{e}"),
            DbError::Validation(e) => write!(f, "{e}"),
            DbError::InvalidQuery(e) => write!(f, "{e}"),
            DbError::InvalidUpdate(e) => write!(f, "{e}"),
            DbError::Update(e) => write!(f, "{e}"),
            DbError::BadValue(msg) | DbError::FailedToParse(msg) => f.write_str(msg),
            DbError::IndexNotFound(name) => write!(f, "index not found with name [{name}]"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<EngineError> for DbError {
    fn from(e: EngineError) -> Self {
        DbError::Engine(e)
    }
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        DbError::Engine(EngineError::Store(e))
    }
}

impl From<ValidationError> for DbError {
    fn from(e: ValidationError) -> Self {
        DbError::Validation(e)
    }
}

impl From<FilterParseError> for DbError {
    fn from(e: FilterParseError) -> Self {
        DbError::InvalidQuery(e)
    }
}

impl From<UpdateParseError> for DbError {
    fn from(e: UpdateParseError) -> Self {
        DbError::InvalidUpdate(e)
    }
}

impl From<UpdateError> for DbError {
    fn from(e: UpdateError) -> Self {
        DbError::Update(e)
    }
}

// ── CommandError ───────────────────────────────────────────────

/// A command rejected or failed as a whole: `{ok: 0, code, errmsg}`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandError {
    pub code: ErrorCode,
    pub errmsg: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, errmsg: impl Into<String>) -> Self {
        Self {
            code,
            errmsg: errmsg.into(),
        }
    }

    pub fn failed_to_parse(errmsg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedToParse, errmsg)
    }

    pub fn to_document(&self) -> Document {
        doc! {
            "ok": 0.0,
            "errmsg": self.errmsg.clone(),
            "code": self.code.code(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.errmsg, self.code.code())
    }
}

impl std::error::Error for CommandError {}

impl From<DbError> for CommandError {
    fn from(e: DbError) -> Self {
        CommandError::new(e.code(), e.to_string())
    }
}
