use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Required cryptographic primitives unavailable: {0}")]
    UnsupportedPlatform(String),

    #[error("No key material for {0}")]
    KeyNotFound(String),

    #[error("Authentication failed (ciphertext, iv, key or context mismatch)")]
    AuthenticationFailed,

    #[error("AES-GCM encryption failed")]
    EncryptionFailed,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Invalid message hash: {0}")]
    InvalidHash(String),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
