//! Per-peer shared-secret derivation and caching.
//!
//! `PeerKeyCache` maps (owner, peer) → (fingerprints of both keys the
//! secret was derived from, secret). A secret is only ever valid for that
//! exact key pair; a mismatch on either side forces a fresh ECDH.
//!
//! Key-change policy
//! -----------------
//! Trust on first use, warn on change. A rotated peer key is still accepted
//! and used; the rotation is surfaced through `is_key_changed` (which MUST be
//! evaluated before the cache entry is overwritten) and a `warn!` log line.
//! Enforcement, if any, belongs to the caller.
//!
//! The ECDH output (the raw 32-byte x-coordinate) is used directly as the
//! AES-256-GCM key, which is what WebCrypto's `deriveKey(ECDH → AES-GCM-256)`
//! produces, so keys interoperate with browser peers.

use std::collections::HashMap;
use std::sync::Arc;

use p256::ecdh::diffie_hellman;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    aead::{SymmetricKey, KEY_LEN},
    error::CryptoError,
    keystore::{fingerprint, KeyStore, LocalKeyPair, PublicKeyBlob},
};

#[derive(Clone)]
struct PeerKeyRecord {
    fingerprint: String,
    owner_fingerprint: String,
    secret: SymmetricKey,
}

type CacheKey = (String, String);

/// Peer key cache. Keys are (owner id, peer id).
#[derive(Default)]
pub struct PeerKeyCache {
    records: RwLock<HashMap<CacheKey, PeerKeyRecord>>,
}

impl PeerKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached secret for `peer_id` if it was derived from
    /// `their_blob` and `ours`; otherwise derive, store and return a new one.
    ///
    /// Concurrent derivations for the same key version both succeed and the
    /// last write wins; the redundant work is harmless.
    pub fn get_shared_secret(
        &self,
        peer_id: &str,
        ours: &LocalKeyPair,
        their_blob: &PublicKeyBlob,
    ) -> Result<SymmetricKey, CryptoError> {
        let key = (ours.owner_id().to_string(), peer_id.to_string());
        let fp = fingerprint(their_blob);
        let owner_fp = fingerprint(&ours.export_public_key());

        if let Some(rec) = self.records.read().get(&key) {
            if rec.fingerprint == fp && rec.owner_fingerprint == owner_fp {
                return Ok(rec.secret.clone());
            }
        }

        let secret = derive(ours, their_blob)?;

        let previous = self.records.write().insert(
            key,
            PeerKeyRecord {
                fingerprint: fp.clone(),
                owner_fingerprint: owner_fp,
                secret: secret.clone(),
            },
        );
        match previous {
            Some(old) if old.fingerprint != fp => warn!(
                peer_id,
                previous = %old.fingerprint,
                current = %fp,
                "peer public key changed; accepting new key"
            ),
            Some(_) => {}
            None => debug!(peer_id, fingerprint = %fp, "derived shared secret"),
        }

        Ok(secret)
    }

    /// True iff a fingerprint is on record for this peer and differs from
    /// `new_blob`'s. Pure read.
    pub fn is_key_changed(&self, owner_id: &str, peer_id: &str, new_blob: &PublicKeyBlob) -> bool {
        match self.previous_fingerprint(owner_id, peer_id) {
            Some(known) => known != fingerprint(new_blob),
            None => false,
        }
    }

    /// Fingerprint of the last key trusted for this peer.
    pub fn previous_fingerprint(&self, owner_id: &str, peer_id: &str) -> Option<String> {
        self.records
            .read()
            .get(&(owner_id.to_string(), peer_id.to_string()))
            .map(|r| r.fingerprint.clone())
    }

    /// Cached secret without derivation; `KeyNotFound` before any agreement.
    pub fn cached_secret(&self, owner_id: &str, peer_id: &str) -> Result<SymmetricKey, CryptoError> {
        self.records
            .read()
            .get(&(owner_id.to_string(), peer_id.to_string()))
            .map(|r| r.secret.clone())
            .ok_or_else(|| CryptoError::KeyNotFound(format!("shared secret with {peer_id}")))
    }

    /// Drop every secret derived by `owner_id`.
    pub fn clear_owner(&self, owner_id: &str) {
        self.records.write().retain(|(owner, _), _| owner != owner_id);
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn derive(ours: &LocalKeyPair, their_blob: &PublicKeyBlob) -> Result<SymmetricKey, CryptoError> {
    let theirs = their_blob.to_public_key()?;
    let shared = diffie_hellman(ours.secret().to_nonzero_scalar(), theirs.as_affine());
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(shared.raw_secret_bytes().as_slice());
    Ok(SymmetricKey::from_bytes(bytes))
}

// ── Key agreement ────────────────────────────────────────────────────────────

/// KeyStore + PeerKeyCache: derive-on-demand for a logged-in owner.
#[derive(Clone, Default)]
pub struct KeyAgreement {
    keys: Arc<KeyStore>,
    peers: Arc<PeerKeyCache>,
}

impl KeyAgreement {
    pub fn new(keys: Arc<KeyStore>, peers: Arc<PeerKeyCache>) -> Self {
        Self { keys, peers }
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    pub fn peer_cache(&self) -> &PeerKeyCache {
        &self.peers
    }

    /// Shared secret between `owner_id`'s local key and `their_blob`.
    pub fn shared_secret(
        &self,
        owner_id: &str,
        peer_id: &str,
        their_blob: &PublicKeyBlob,
    ) -> Result<SymmetricKey, CryptoError> {
        let ours = self
            .keys
            .get(owner_id)
            .ok_or_else(|| CryptoError::KeyNotFound(format!("local key pair for {owner_id}")))?;
        self.peers.get_shared_secret(peer_id, &ours, their_blob)
    }

    pub fn is_key_changed(&self, owner_id: &str, peer_id: &str, new_blob: &PublicKeyBlob) -> bool {
        self.peers.is_key_changed(owner_id, peer_id, new_blob)
    }

    /// Logout: the owner's key pair and every secret derived from it.
    pub fn clear(&self, owner_id: &str) {
        self.keys.clear(owner_id);
        self.peers.clear_owner(owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_same_secret() {
        let store = KeyStore::new();
        let a = store.generate_identity("A").unwrap();
        let b = store.generate_identity("B").unwrap();
        let cache = PeerKeyCache::new();

        let ab = cache.get_shared_secret("B", &a, &b.export_public_key()).unwrap();
        let ba = cache.get_shared_secret("A", &b, &a.export_public_key()).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cached_secret_reused_for_same_key() {
        let store = KeyStore::new();
        let a = store.generate_identity("A").unwrap();
        let b = store.generate_identity("B").unwrap();
        let cache = PeerKeyCache::new();
        let blob = b.export_public_key();

        let first = cache.get_shared_secret("B", &a, &blob).unwrap();
        let second = cache.get_shared_secret("B", &a, &blob).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rotation_detected_once_then_settles() {
        let store = KeyStore::new();
        let a = store.generate_identity("A").unwrap();
        let k1 = store.generate_identity("B").unwrap().export_public_key();
        let cache = PeerKeyCache::new();

        // First contact: nothing on record, no change signal.
        assert!(!cache.is_key_changed("A", "B", &k1));
        let s1 = cache.get_shared_secret("B", &a, &k1).unwrap();
        assert!(!cache.is_key_changed("A", "B", &k1));

        let k2 = store.generate_identity("B").unwrap().export_public_key();
        assert!(cache.is_key_changed("A", "B", &k2));
        // Checking is pure; still reported until the new key is adopted.
        assert!(cache.is_key_changed("A", "B", &k2));

        let s2 = cache.get_shared_secret("B", &a, &k2).unwrap();
        assert_ne!(s1, s2);
        assert!(!cache.is_key_changed("A", "B", &k2));
        assert_eq!(cache.previous_fingerprint("A", "B"), Some(fingerprint(&k2)));
    }

    #[test]
    fn regenerated_owner_identity_rederives() {
        let agreement = KeyAgreement::default();
        agreement.key_store().generate_identity("A").unwrap();
        let b = KeyStore::new().generate_identity("B").unwrap();
        let b_blob = b.export_public_key();

        let old = agreement.shared_secret("A", "B", &b_blob).unwrap();
        // New local identity without an intervening clear.
        let a2 = agreement.key_store().generate_identity("A").unwrap();
        let new = agreement.shared_secret("A", "B", &b_blob).unwrap();

        assert_ne!(old, new);
        let peer_side = PeerKeyCache::new()
            .get_shared_secret("A", &b, &a2.export_public_key())
            .unwrap();
        assert_eq!(new, peer_side);
        // The peer's key did not change.
        assert!(!agreement.is_key_changed("A", "B", &b_blob));
    }

    #[test]
    fn cached_secret_before_agreement_is_key_not_found() {
        let cache = PeerKeyCache::new();
        assert!(matches!(
            cache.cached_secret("A", "B"),
            Err(CryptoError::KeyNotFound(_))
        ));
    }

    #[test]
    fn agreement_requires_local_identity() {
        let agreement = KeyAgreement::default();
        let other = KeyStore::new().generate_identity("B").unwrap();
        let err = agreement
            .shared_secret("A", "B", &other.export_public_key())
            .unwrap_err();
        assert!(matches!(err, CryptoError::KeyNotFound(_)));
    }

    #[test]
    fn clear_invalidates_owner_secrets_only() {
        let agreement = KeyAgreement::default();
        agreement.key_store().generate_identity("A").unwrap();
        agreement.key_store().generate_identity("C").unwrap();
        let b = KeyStore::new().generate_identity("B").unwrap().export_public_key();

        agreement.shared_secret("A", "B", &b).unwrap();
        agreement.shared_secret("C", "B", &b).unwrap();
        agreement.clear("A");

        assert!(agreement.peer_cache().cached_secret("A", "B").is_err());
        assert!(agreement.peer_cache().cached_secret("C", "B").is_ok());
        assert!(agreement.shared_secret("A", "B", &b).is_err());
    }

    #[test]
    fn invalid_peer_key_is_rejected() {
        let store = KeyStore::new();
        let a = store.generate_identity("A").unwrap();
        let cache = PeerKeyCache::new();
        let err = cache
            .get_shared_secret("B", &a, &PublicKeyBlob::new("{}"))
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
        assert!(cache.is_empty());
    }
}
