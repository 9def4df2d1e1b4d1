//! cm_crypto — Corpchat end-to-end encryption primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited RustCrypto crates.
//! - Private key material never leaves `KeyStore` and is zeroized on drop.
//! - Public APIs return opaque newtypes to prevent accidental misuse.
//!
//! # Module layout
//! - `keystore`   — per-owner ECDH P-256 key pairs, JWK export/import, fingerprints
//! - `agreement`  — per-peer shared-secret cache with key-rotation detection
//! - `aead`       — AES-256-GCM encrypt/decrypt with associated data
//! - `hash`       — Keccak-256 message hashes (the value notarized on-chain)
//! - `error`      — unified error type

pub mod aead;
pub mod agreement;
pub mod error;
pub mod hash;
pub mod keystore;

pub use aead::{Sealed, SymmetricKey, IV_LEN, KEY_LEN};
pub use agreement::{KeyAgreement, PeerKeyCache};
pub use error::CryptoError;
pub use hash::{message_hash, MessageHash};
pub use keystore::{fingerprint, import_public_key, KeyStore, LocalKeyPair, PublicKeyBlob};
