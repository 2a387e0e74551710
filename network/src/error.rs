//! Network error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("socket bind failed: {0}")]
    Bind(std::io::Error),
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
