//! Key generation and deterministic derivation.

use crate::hash::blake2b_256_multi;
use chr_types::{KeyPair, PrivateKey, PublicKey, Seed};
use ed25519_dalek::SigningKey;
use rand::RngCore;

/// Generate a key pair from the thread-local cryptographic RNG.
pub fn generate_keypair() -> KeyPair {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    keypair_from_private(PrivateKey(secret))
}

/// Derive the key pair at `index` from a wallet seed:
/// `private = blake2b_256(seed ‖ be_u32(index))`.
pub fn derive_keypair(seed: &Seed, index: u32) -> KeyPair {
    let secret = blake2b_256_multi(&[&seed.0, &index.to_be_bytes()]);
    keypair_from_private(PrivateKey(secret))
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Reconstruct a full key pair from a private key.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let public = public_from_private(&private);
    KeyPair { public, private }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let seed = Seed([3u8; 32]);
        let a = derive_keypair(&seed, 0);
        let b = derive_keypair(&Seed([3u8; 32]), 0);
        assert_eq!(a.public, b.public);
    }

    #[test]
    fn derivation_varies_with_index() {
        let seed = Seed([3u8; 32]);
        assert_ne!(derive_keypair(&seed, 0).public, derive_keypair(&seed, 1).public);
    }

    #[test]
    fn generated_keys_are_unique() {
        assert_ne!(generate_keypair().public, generate_keypair().public);
    }

    #[test]
    fn public_matches_private() {
        let kp = generate_keypair();
        assert_eq!(public_from_private(&kp.private), kp.public);
    }
}
