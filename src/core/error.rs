use crate::core::dtype::Dtype;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Type conflict on '{name}': stored {stored}, requested {requested}")]
    TypeConflict {
        name: String,
        stored: Dtype,
        requested: String,
    },

    #[error("Index {index} out of bounds (length {len})")]
    OutOfBounds { index: u64, len: u64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Object is read-only: {0}")]
    ReadOnly(String),

    #[error("Invalid magic number in header")]
    InvalidMagic,

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Catalog checksum verification failed")]
    ChecksumMismatch,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn type_conflict(name: &str, stored: Dtype, requested: impl ToString) -> Self {
        StoreError::TypeConflict {
            name: name.to_string(),
            stored,
            requested: requested.to_string(),
        }
    }

    pub(crate) fn out_of_bounds(index: u64, len: u64) -> Self {
        StoreError::OutOfBounds { index, len }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
