// sentra-core/src/error.rs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for all store operations.
///
/// Per-request failures (bad queries, oversized documents) are reported to
/// the caller; they never tear down the process.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid collection name: '{0}'")]
    InvalidCollectionName(String),

    #[error("collection not found: '{0}'")]
    CollectionNotFound(String),

    #[error("document too large: {size} bytes (limit {limit})")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error("index error: {0}")]
    IndexError(String),

    #[error("data corruption: {0}")]
    Corruption(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
