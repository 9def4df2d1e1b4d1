//! E2E session for the logged-in user.
//!
//! Lifecycle
//! ---------
//!   login(user)  → fresh P-256 identity, e2e enabled
//!   logout()     → key pair and every derived secret dropped
//!
//! Outgoing messages never fail: anything that prevents encryption (e2e off,
//! empty text, group channel, peer without a key, crypto error) yields the
//! plaintext payload. Incoming failures are always surfaced.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cm_chain::{Address, ChainClient};
use cm_crypto::{
    aead, fingerprint, message_hash, CryptoError, KeyAgreement, MessageHash, PublicKeyBlob,
    SymmetricKey,
};
use cm_proto::{ChannelContext, EncryptedEnvelope, OutgoingMessage, PeerContext};

use crate::{config::SessionSettings, error::SessionError};

/// The public half of the logged-in user's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub user_id: String,
    pub public_key: PublicKeyBlob,
    pub fingerprint: String,
}

/// A peer presented a different key than the one last trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChange {
    pub previous: String,
    pub current: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub text: String,
    pub key_change: Option<KeyChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotarizationReceipt {
    pub message_hash: MessageHash,
    pub recipient: Address,
    pub transaction_hash: String,
    pub block_number: u64,
    pub logged_at: DateTime<Utc>,
}

pub struct E2eSession {
    agreement: KeyAgreement,
    settings: SessionSettings,
    user: RwLock<Option<String>>,
}

impl E2eSession {
    pub fn new(agreement: KeyAgreement, settings: SessionSettings) -> Self {
        Self {
            agreement,
            settings,
            user: RwLock::new(None),
        }
    }

    pub fn agreement(&self) -> &KeyAgreement {
        &self.agreement
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Start a session for `user_id` with a newly generated identity.
    ///
    /// On error e2e stays disabled; the session still works in plaintext.
    pub fn login(&self, user_id: &str) -> Result<LocalIdentity, SessionError> {
        self.logout();
        let pair = match self.agreement.key_store().generate_identity(user_id) {
            Ok(p) => p,
            Err(err) => {
                warn!(user_id, error = %err, "e2e unavailable, continuing without encryption");
                return Err(err.into());
            }
        };
        *self.user.write() = Some(user_id.to_string());

        let public_key = pair.export_public_key();
        let fp = fingerprint(&public_key);
        info!(user_id, fingerprint = %fp, "e2e enabled");
        Ok(LocalIdentity {
            user_id: user_id.to_string(),
            public_key,
            fingerprint: fp,
        })
    }

    pub fn logout(&self) {
        if let Some(user_id) = self.user.write().take() {
            self.agreement.clear(&user_id);
            info!(user_id = %user_id, "e2e keys cleared");
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.user.read().clone()
    }

    pub fn is_enabled(&self) -> bool {
        match self.user.read().as_deref() {
            Some(id) => self.agreement.key_store().get(id).is_some(),
            None => false,
        }
    }

    pub fn identity(&self) -> Option<LocalIdentity> {
        let user_id = self.user_id()?;
        let pair = self.agreement.key_store().get(&user_id)?;
        let public_key = pair.export_public_key();
        Some(LocalIdentity {
            fingerprint: fingerprint(&public_key),
            user_id,
            public_key,
        })
    }

    fn require_user(&self) -> Result<String, SessionError> {
        self.user_id().ok_or(SessionError::NotLoggedIn)
    }

    // ── Keys ─────────────────────────────────────────────────────────────────

    pub fn shared_key_with(&self, peer_id: &str, peer_key: &PublicKeyBlob) -> Result<SymmetricKey, SessionError> {
        let user_id = self
            .user_id()
            .ok_or_else(|| CryptoError::KeyNotFound("no local identity (not logged in)".into()))?;
        Ok(self.agreement.shared_secret(&user_id, peer_id, peer_key)?)
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    /// Prepare `plaintext` for sending on `channel`.
    pub fn encrypt_message_for_channel(&self, plaintext: &str, channel: &ChannelContext) -> OutgoingMessage {
        if plaintext.is_empty() {
            return OutgoingMessage::plaintext(plaintext);
        }
        let Some(user_id) = self.user_id().filter(|_| self.is_enabled()) else {
            return OutgoingMessage::plaintext(plaintext);
        };
        if !channel.is_dm {
            return OutgoingMessage::plaintext(plaintext);
        }
        let Some(peer) = channel.dm_peer(&user_id) else {
            warn!(channel_id = %channel.channel_id, "other member not found in DM");
            return OutgoingMessage::plaintext(plaintext);
        };
        let Some(peer_key) = peer.public_key.as_ref() else {
            warn!(peer_id = %peer.user_id, "peer has no public key, sending unencrypted");
            return OutgoingMessage::plaintext(plaintext);
        };

        match self.seal(&user_id, &peer.user_id, peer_key, plaintext, channel) {
            Ok(envelope) => OutgoingMessage::encrypted(envelope),
            Err(err) => {
                warn!(peer_id = %peer.user_id, error = %err, "encryption failed, sending unencrypted");
                OutgoingMessage::plaintext(plaintext)
            }
        }
    }

    fn seal(
        &self,
        user_id: &str,
        peer_id: &str,
        peer_key: &PublicKeyBlob,
        plaintext: &str,
        channel: &ChannelContext,
    ) -> Result<EncryptedEnvelope, SessionError> {
        let ours = self
            .agreement
            .key_store()
            .get(user_id)
            .ok_or_else(|| CryptoError::KeyNotFound(format!("local key pair for {user_id}")))?;
        let key = self.agreement.shared_secret(user_id, peer_id, peer_key)?;
        let aad = self.aad_for(channel, user_id, peer_id);
        let sealed = aead::encrypt(plaintext, &key, &aad)?;
        debug!(peer_id, aad = %aad, "message sealed");
        Ok(EncryptedEnvelope::from_sealed(&sealed, ours.export_public_key(), aad))
    }

    fn aad_for(&self, channel: &ChannelContext, sender_id: &str, recipient_id: &str) -> String {
        let channel_type = if channel.channel_type.is_empty() {
            &self.settings.default_channel_type
        } else {
            &channel.channel_type
        };
        cm_proto::build_aad(channel_type, &channel.channel_id, sender_id, recipient_id)
    }

    /// Decrypt an envelope from `peer`, binding it to the AAD it carries.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope, peer: &PeerContext) -> Result<DecryptedMessage, SessionError> {
        self.open(envelope, &peer.peer_id, &envelope.aad)
    }

    /// Decrypt an envelope received on `channel`, rebuilding the expected AAD
    /// (sender on the left) instead of trusting the one carried alongside it.
    pub fn decrypt_in_channel(
        &self,
        envelope: &EncryptedEnvelope,
        peer: &PeerContext,
        channel: &ChannelContext,
    ) -> Result<DecryptedMessage, SessionError> {
        let user_id = self.require_user()?;
        let aad = self.aad_for(channel, &peer.peer_id, &user_id);
        self.open(envelope, &peer.peer_id, &aad)
    }

    fn open(&self, envelope: &EncryptedEnvelope, peer_id: &str, aad: &str) -> Result<DecryptedMessage, SessionError> {
        let user_id = self.require_user()?;

        // Compare against the trusted key before the cache adopts the new one.
        let current = fingerprint(&envelope.sender_public_key);
        let key_change = self
            .agreement
            .peer_cache()
            .previous_fingerprint(&user_id, peer_id)
            .filter(|previous| *previous != current)
            .map(|previous| KeyChange {
                previous,
                current: current.clone(),
            });
        if let Some(change) = &key_change {
            warn!(
                peer_id,
                previous = %change.previous,
                current = %change.current,
                "peer key changed; verify out of band"
            );
        }

        let key = self
            .agreement
            .shared_secret(&user_id, peer_id, &envelope.sender_public_key)?;
        let ciphertext = envelope
            .ciphertext_bytes()
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        let iv = envelope.iv_bytes().map_err(|_| CryptoError::AuthenticationFailed)?;
        let text = aead::decrypt(&ciphertext, &iv, &key, aad)?;

        Ok(DecryptedMessage { text, key_change })
    }

    // ── Notarization ─────────────────────────────────────────────────────────

    /// Log `keccak256(plaintext)` for `recipient_address` on the contract.
    pub async fn notarize(
        &self,
        chain: &dyn ChainClient,
        plaintext: &str,
        recipient_address: &str,
    ) -> Result<NotarizationReceipt, SessionError> {
        let recipient = Address::parse(recipient_address)?;
        let hash = message_hash(plaintext);
        let receipt = chain.log_message_hash(&recipient, &hash).await?;
        info!(
            %hash,
            %recipient,
            tx = %receipt.transaction_hash,
            block = receipt.block_number,
            "message hash notarized"
        );
        Ok(NotarizationReceipt {
            message_hash: hash,
            recipient,
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            logged_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_proto::ChannelMember;

    fn session() -> E2eSession {
        E2eSession::new(KeyAgreement::default(), SessionSettings::default())
    }

    #[test]
    fn login_enables_and_logout_disables() {
        let s = session();
        assert!(!s.is_enabled());
        let id = s.login("alice").unwrap();
        assert_eq!(id.fingerprint.len(), 16);
        assert!(s.is_enabled());
        assert_eq!(s.identity(), Some(id));
        s.logout();
        assert!(!s.is_enabled());
        assert!(s.identity().is_none());
    }

    #[test]
    fn relogin_rotates_identity() {
        let s = session();
        let first = s.login("alice").unwrap();
        let second = s.login("alice").unwrap();
        assert_ne!(first.public_key, second.public_key);
    }

    #[test]
    fn shared_key_requires_login() {
        let s = session();
        let peer = KeyAgreement::default()
            .key_store()
            .generate_identity("bob")
            .unwrap()
            .export_public_key();
        assert!(matches!(
            s.shared_key_with("bob", &peer),
            Err(SessionError::Crypto(CryptoError::KeyNotFound(_)))
        ));
    }

    #[test]
    fn empty_channel_type_uses_default() {
        let s = session();
        let mut ch = ChannelContext::direct(
            "c1",
            vec![ChannelMember {
                user_id: "a".into(),
                public_key: None,
                wallet_address: None,
            }],
        );
        ch.channel_type.clear();
        assert_eq!(s.aad_for(&ch, "a", "b"), "messaging:c1:a->b");
    }

    #[test]
    fn decrypt_without_login_is_rejected() {
        let s = session();
        let env = EncryptedEnvelope {
            ciphertext: String::new(),
            iv: String::new(),
            sender_public_key: PublicKeyBlob::new("{}"),
            aad: String::new(),
        };
        assert!(matches!(
            s.decrypt(&env, &PeerContext::new("bob")),
            Err(SessionError::NotLoggedIn)
        ));
    }
}
