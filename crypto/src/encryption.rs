//! Key-at-rest encryption.
//!
//! Wallet records hold the raw private key transformed with AES-256-CTR
//! under the wallet key and an externally supplied 128-bit IV. CTR is its
//! own inverse, so one transform serves both directions.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

type Aes256Ctr = Ctr128BE<Aes256>;

fn transform(data: &[u8; 32], key: &[u8; 32], iv: &[u8; 16]) -> [u8; 32] {
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    let mut buffer = *data;
    cipher.apply_keystream(&mut buffer);
    buffer
}

/// Encrypt a raw private key for storage.
pub fn encrypt_key(cleartext: &[u8; 32], key: &[u8; 32], iv: &[u8; 16]) -> [u8; 32] {
    transform(cleartext, key, iv)
}

/// Recover a raw private key from a wallet record.
pub fn decrypt_key(ciphertext: &[u8; 32], key: &[u8; 32], iv: &[u8; 16]) -> [u8; 32] {
    transform(ciphertext, key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let cleartext = [0x42u8; 32];
        let key = [0x01u8; 32];
        let iv = [0x02u8; 16];
        let ciphertext = encrypt_key(&cleartext, &key, &iv);
        assert_ne!(ciphertext, cleartext);
        assert_eq!(decrypt_key(&ciphertext, &key, &iv), cleartext);
    }

    #[test]
    fn iv_changes_ciphertext() {
        let cleartext = [0x42u8; 32];
        let key = [0x01u8; 32];
        let a = encrypt_key(&cleartext, &key, &[0u8; 16]);
        let b = encrypt_key(&cleartext, &key, &[1u8; 16]);
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_garbles() {
        let cleartext = [0x42u8; 32];
        let iv = [0u8; 16];
        let ciphertext = encrypt_key(&cleartext, &[1u8; 32], &iv);
        assert_ne!(decrypt_key(&ciphertext, &[2u8; 32], &iv), cleartext);
    }
}
