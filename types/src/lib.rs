//! Fundamental types for the CHR protocol.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: amounts, hashes, keys, timestamps, network identity, and the
//! protocol timing parameters.

pub mod amount;
pub mod error;
pub mod hash;
pub mod keys;
pub mod network;
pub mod params;
pub mod time;

pub use amount::Amount;
pub use error::TypesError;
pub use hash::{BlockHash, Link, Root};
pub use keys::{Account, KeyPair, PrivateKey, PublicKey, Seed, Signature};
pub use network::{NetworkId, NODE_ID_VERSION, PROTOCOL_VERSION, PROTOCOL_VERSION_MIN};
pub use params::NetworkParams;
pub use time::Timestamp;
