//! Storage error type.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("value failed to deserialize: {0}")]
    Corrupt(String),
    #[error("storage I/O failure: {0}")]
    Io(String),
}
