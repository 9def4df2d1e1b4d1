//! Keccak-256 message hashes.
//!
//! The value notarized on-chain for a message is `keccak256(utf8(text))`,
//! the same digest Ethereum tooling produces for `keccak256(toUtf8Bytes(..))`.
//! It is rendered as `0x` + 64 lowercase hex characters, the `bytes32`
//! representation used by contract events and calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::error::CryptoError;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// 32-byte content hash; the key of the verification cache.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageHash([u8; 32]);

impl MessageHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse `0x`-prefixed (or bare) 64-hex-character form. Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, CryptoError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(CryptoError::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits).map_err(|e| CryptoError::InvalidHash(e.to_string()))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

/// Hash of a message's text, as logged by the sender and checked by the recipient.
pub fn message_hash(content: &str) -> MessageHash {
    MessageHash(keccak256(content.as_bytes()))
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageHash({})", self.to_hex())
    }
}

impl FromStr for MessageHash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MessageHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MessageHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_known_vector() {
        // keccak256(""), the Ethereum empty-string hash.
        assert_eq!(
            message_hash("").to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn parse_accepts_prefixed_and_bare() {
        let h = message_hash("hello");
        let hex = h.to_hex();
        assert_eq!(hex.len(), 66);
        assert_eq!(MessageHash::parse(&hex).unwrap(), h);
        assert_eq!(MessageHash::parse(&hex[2..]).unwrap(), h);
        assert_eq!(MessageHash::parse(&hex.to_uppercase().replace("0X", "0x")).unwrap(), h);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(MessageHash::parse("0x1234").is_err());
        assert!(MessageHash::parse(&format!("0x{}", "zz".repeat(32))).is_err());
    }

    #[test]
    fn serde_uses_hex_string() {
        let h = message_hash("abc");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: MessageHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
