//! Node error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Network(#[from] chr_network::NetworkError),
    #[error("node identity is corrupt in the meta bucket")]
    CorruptIdentity,
}
