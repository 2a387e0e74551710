//! Crypto error type.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("account string is malformed")]
    InvalidAccountString,
    #[error("account checksum mismatch")]
    BadChecksum,
}
