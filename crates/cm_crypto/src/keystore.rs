//! Local identity key management
//!
//! Each logged-in *owner* has exactly one ECDH P-256 `LocalKeyPair`, generated
//! fresh per session and never written anywhere. The public half travels as a
//! JWK string (`PublicKeyBlob`), which is also the canonical input for
//! fingerprints.
//!
//! Key lifecycle
//! -------------
//!   login  → `generate_identity(owner)`   (replaces any previous pair)
//!   logout → `clear(owner)`               (secret scalar zeroized on drop)
//!
//! The private scalar is never serialised and no accessor hands out its
//! bytes; ECDH happens inside `agreement` against the in-memory key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use p256::{PublicKey, SecretKey};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroize;

use crate::error::CryptoError;

// ── Public key blob ──────────────────────────────────────────────────────────

/// Exported P-256 public key in JWK form, e.g.
/// `{"crv":"P-256","kty":"EC","x":"..","y":".."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKeyBlob(String);

impl PublicKeyBlob {
    pub fn new(jwk: impl Into<String>) -> Self {
        Self(jwk.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse and validate the point. Off-curve or malformed JWKs are rejected.
    /// Members other than `kty`, `crv`, `x` and `y` are ignored.
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        let malformed = || CryptoError::InvalidKey("malformed P-256 JWK".into());
        let jwk: EcPublicJwk = serde_json::from_str(&self.0).map_err(|_| malformed())?;
        let point_only = serde_json::to_string(&jwk).map_err(|_| malformed())?;
        PublicKey::from_jwk_str(&point_only).map_err(|_| malformed())
    }

    /// 16-hex-character fingerprint, see [`fingerprint`].
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

/// Point-bearing members of an EC public JWK. WebCrypto exports also carry
/// `ext` and `key_ops`.
#[derive(Serialize, Deserialize)]
struct EcPublicJwk {
    kty: String,
    crv: String,
    x: String,
    y: String,
}

impl fmt::Display for PublicKeyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a peer's exported key before use.
pub fn import_public_key(blob: &PublicKeyBlob) -> Result<PublicKey, CryptoError> {
    blob.to_public_key()
}

/// Short human-comparable fingerprint: first 8 bytes of SHA-256 over the
/// blob's UTF-8 bytes, lowercase hex.
pub fn fingerprint(blob: &PublicKeyBlob) -> String {
    let digest = Sha256::digest(blob.as_str().as_bytes());
    hex::encode(&digest[..8])
}

// ── Local key pair ───────────────────────────────────────────────────────────

/// ECDH P-256 key pair for one local owner. Not `Clone`, not `Serialize`.
pub struct LocalKeyPair {
    owner_id: String,
    public: PublicKey,
    secret: SecretKey,
}

impl LocalKeyPair {
    fn generate(owner_id: &str) -> Result<Self, CryptoError> {
        let mut bytes = [0u8; 32];
        // A uniformly random 32-byte string is a valid scalar with
        // overwhelming probability; loop covers zero / >= n.
        let secret = loop {
            OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| CryptoError::UnsupportedPlatform(e.to_string()))?;
            if let Ok(sk) = SecretKey::from_slice(&bytes) {
                break sk;
            }
        };
        bytes.zeroize();

        Ok(Self {
            owner_id: owner_id.to_string(),
            public: secret.public_key(),
            secret,
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn export_public_key(&self) -> PublicKeyBlob {
        PublicKeyBlob(self.public.to_jwk_string())
    }
}

impl fmt::Debug for LocalKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyPair")
            .field("owner_id", &self.owner_id)
            .field("fingerprint", &fingerprint(&self.export_public_key()))
            .finish_non_exhaustive()
    }
}

// ── Key store ────────────────────────────────────────────────────────────────

/// Owns every local key pair in the process. In-memory only.
#[derive(Debug, Default)]
pub struct KeyStore {
    pairs: RwLock<HashMap<String, Arc<LocalKeyPair>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh pair for `owner_id`. Always new material; a previous
    /// pair for the same owner is discarded.
    pub fn generate_identity(&self, owner_id: &str) -> Result<Arc<LocalKeyPair>, CryptoError> {
        let pair = Arc::new(LocalKeyPair::generate(owner_id)?);
        let replaced = self
            .pairs
            .write()
            .insert(owner_id.to_string(), pair.clone())
            .is_some();
        if replaced {
            debug!(owner_id, "replaced existing local key pair");
        }
        debug!(
            owner_id,
            fingerprint = %fingerprint(&pair.export_public_key()),
            "generated local identity"
        );
        Ok(pair)
    }

    pub fn get(&self, owner_id: &str) -> Option<Arc<LocalKeyPair>> {
        self.pairs.read().get(owner_id).cloned()
    }

    /// Release all private material for `owner_id`.
    pub fn clear(&self, owner_id: &str) {
        if self.pairs.write().remove(owner_id).is_some() {
            debug!(owner_id, "cleared local key pair");
        }
    }

    pub fn clear_all(&self) {
        self.pairs.write().clear();
    }

    pub fn len(&self) -> usize {
        self.pairs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
