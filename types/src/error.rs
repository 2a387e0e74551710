//! Shared error type for value parsing.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("ill-formed hex string")]
    InvalidHex,
    #[error("ill-formed decimal string")]
    InvalidDecimal,
    #[error("ill-formed account string")]
    InvalidAccount,
}
