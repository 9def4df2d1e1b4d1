//! Encrypted envelope: what the chat transport stores and relays.
//!
//! The transport only sees:
//!   - encrypted_data     (base64 AES-GCM ciphertext + tag)
//!   - encryption_iv      (base64 12-byte iv)
//!   - sender_public_key  (sender's JWK so the recipient can derive the secret)
//!   - aad_context        (conversation binding string, integrity protected)
//!   - text               (the placeholder `"[Encrypted message]"`)
//!
//! An envelope is immutable once produced and maps to exactly one plaintext.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use cm_crypto::{CryptoError, PublicKeyBlob, Sealed, IV_LEN};

pub const ENCRYPTED_PLACEHOLDER: &str = "[Encrypted message]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "encrypted_data")]
    pub ciphertext: String,
    #[serde(rename = "encryption_iv")]
    pub iv: String,
    pub sender_public_key: PublicKeyBlob,
    #[serde(rename = "aad_context")]
    pub aad: String,
}

impl EncryptedEnvelope {
    pub fn from_sealed(sealed: &Sealed, sender_public_key: PublicKeyBlob, aad: String) -> Self {
        Self {
            ciphertext: STANDARD.encode(&sealed.ciphertext),
            iv: STANDARD.encode(sealed.iv),
            sender_public_key,
            aad,
        }
    }

    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(STANDARD.decode(&self.ciphertext)?)
    }

    pub fn iv_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(STANDARD.decode(&self.iv)?)
    }

    /// Cheap shape check before any crypto work.
    pub fn is_well_formed(&self) -> bool {
        matches!(self.iv_bytes(), Ok(iv) if iv.len() == IV_LEN)
            && self.ciphertext_bytes().is_ok()
            && !self.sender_public_key.as_str().is_empty()
    }
}

/// Result of preparing an outgoing message: either an envelope or the
/// plaintext fallback. Serialises to the flat field set the transport merges
/// into its message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Encrypted {
        text: String,
        encrypted: bool,
        #[serde(flatten)]
        envelope: EncryptedEnvelope,
    },
    Plaintext {
        text: String,
    },
}

impl OutgoingMessage {
    pub fn encrypted(envelope: EncryptedEnvelope) -> Self {
        Self::Encrypted {
            text: ENCRYPTED_PLACEHOLDER.to_string(),
            encrypted: true,
            envelope,
        }
    }

    pub fn plaintext(text: impl Into<String>) -> Self {
        Self::Plaintext { text: text.into() }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted { .. })
    }

    pub fn envelope(&self) -> Option<&EncryptedEnvelope> {
        match self {
            Self::Encrypted { envelope, .. } => Some(envelope),
            Self::Plaintext { .. } => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Encrypted { text, .. } | Self::Plaintext { text } => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptedEnvelope {
        let sealed = Sealed {
            ciphertext: vec![1, 2, 3, 4],
            iv: [9u8; IV_LEN],
        };
        EncryptedEnvelope::from_sealed(
            &sealed,
            PublicKeyBlob::new(r#"{"kty":"EC"}"#),
            "messaging:c:A->B".into(),
        )
    }

    #[test]
    fn transport_field_names() {
        let json = serde_json::to_value(OutgoingMessage::encrypted(sample())).unwrap();
        assert_eq!(json["text"], ENCRYPTED_PLACEHOLDER);
        assert_eq!(json["encrypted"], true);
        assert_eq!(json["encrypted_data"], "AQIDBA==");
        assert_eq!(json["aad_context"], "messaging:c:A->B");
        assert!(json.get("encryption_iv").is_some());
        assert!(json.get("sender_public_key").is_some());
    }

    #[test]
    fn plaintext_serialises_text_only() {
        let json = serde_json::to_value(OutgoingMessage::plaintext("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"text": "hi"}));
    }

    #[test]
    fn decodes_fields_back() {
        let env = sample();
        assert_eq!(env.ciphertext_bytes().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(env.iv_bytes().unwrap(), vec![9u8; IV_LEN]);
        assert!(env.is_well_formed());
    }

    #[test]
    fn malformed_iv_is_not_well_formed() {
        let mut env = sample();
        env.iv = STANDARD.encode([0u8; 8]);
        assert!(!env.is_well_formed());
        env.iv = "!!not base64!!".into();
        assert!(env.iv_bytes().is_err());
    }

    #[test]
    fn incoming_payload_parses_as_envelope() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: EncryptedEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
