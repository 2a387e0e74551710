//! Cryptographic primitives for the CHR protocol.
//!
//! - **Blake2b** with variable output for digests, checksums, and work
//! - **Ed25519** for block and vote signatures
//! - **AES-256-CTR** for key-at-rest encryption
//! - Account string codec (`chr_` prefix, base32, Blake2b-40 checksum)

pub mod address;
pub mod encryption;
pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{decode_account, encode_account};
pub use encryption::{decrypt_key, encrypt_key};
pub use error::CryptoError;
pub use hash::{account_checksum, blake2b_256, blake2b_256_multi};
pub use keys::{derive_keypair, generate_keypair, keypair_from_private, public_from_private};
pub use sign::{sign_message, verify_signature};
