//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM (96-bit iv).
//! Key size: 32 bytes.  IV: 12 bytes (random, fresh per message).  Tag: 16 bytes.
//!
//! The iv travels next to the ciphertext rather than being prepended, because
//! the transport carries them in separate fields (`encrypted_data`,
//! `encryption_iv`).
//!
//! The associated data is the conversation context string
//! (`"{channelType}:{channelId}:{senderId}->{recipientId}"`). It is not
//! encrypted but must match byte-for-byte on decrypt, which pins an envelope
//! to the conversation it was produced for.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;

/// 256-bit AES-GCM key derived from ECDH. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Output of a single encryption: ciphertext (with tag) and the iv used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
}

/// Encrypt UTF-8 `plaintext` under `key`, binding `aad`.
///
/// A fresh iv is drawn from the OS CSPRNG on every call; reusing an iv under
/// the same key would void GCM's authentication guarantee.
pub fn encrypt(plaintext: &str, key: &SymmetricKey, aad: &str) -> Result<Sealed, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::UnsupportedPlatform(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::InvalidKey("AES-256 key must be 32 bytes".into()))?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(Sealed { ciphertext, iv })
}

/// Decrypt and authenticate. Every mismatch collapses into
/// `AuthenticationFailed`; there is no partial decode.
pub fn decrypt(
    ciphertext: &[u8],
    iv: &[u8],
    key: &SymmetricKey,
    aad: &str,
) -> Result<String, CryptoError> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::AuthenticationFailed);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([b; KEY_LEN])
    }

    #[test]
    fn roundtrip() {
        let k = key(7);
        let sealed = encrypt("hello", &k, "messaging:chan1:A->B").unwrap();
        let pt = decrypt(&sealed.ciphertext, &sealed.iv, &k, "messaging:chan1:A->B").unwrap();
        assert_eq!(pt, "hello");
    }

    #[test]
    fn fresh_iv_per_message() {
        let k = key(1);
        let a = encrypt("same", &k, "").unwrap();
        let b = encrypt("same", &k, "").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn every_ciphertext_bit_is_authenticated() {
        let k = key(3);
        let sealed = encrypt("tamper me", &k, "ctx").unwrap();
        for byte in 0..sealed.ciphertext.len() {
            for bit in 0..8 {
                let mut ct = sealed.ciphertext.clone();
                ct[byte] ^= 1 << bit;
                assert!(matches!(
                    decrypt(&ct, &sealed.iv, &k, "ctx"),
                    Err(CryptoError::AuthenticationFailed)
                ));
            }
        }
    }

    #[test]
    fn every_iv_bit_is_authenticated() {
        let k = key(4);
        let sealed = encrypt("iv check", &k, "ctx").unwrap();
        for byte in 0..IV_LEN {
            for bit in 0..8 {
                let mut iv = sealed.iv;
                iv[byte] ^= 1 << bit;
                assert!(decrypt(&sealed.ciphertext, &iv, &k, "ctx").is_err());
            }
        }
    }

    #[test]
    fn aad_bit_flip_fails() {
        let k = key(5);
        let aad = "messaging:chan1:A->B";
        let sealed = encrypt("bound", &k, aad).unwrap();
        let mut bytes = aad.as_bytes().to_vec();
        bytes[0] ^= 0x01;
        let flipped = String::from_utf8(bytes).unwrap();
        assert!(matches!(
            decrypt(&sealed.ciphertext, &sealed.iv, &k, &flipped),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = encrypt("secret", &key(1), "").unwrap();
        assert!(decrypt(&sealed.ciphertext, &sealed.iv, &key(2), "").is_err());
    }

    #[test]
    fn short_iv_rejected() {
        let k = key(9);
        let sealed = encrypt("x", &k, "").unwrap();
        assert!(matches!(
            decrypt(&sealed.ciphertext, &sealed.iv[..8], &k, ""),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let k = key(11);
        let sealed = encrypt("", &k, "ctx").unwrap();
        assert_eq!(sealed.ciphertext.len(), 16);
        assert_eq!(decrypt(&sealed.ciphertext, &sealed.iv, &k, "ctx").unwrap(), "");
    }
}
