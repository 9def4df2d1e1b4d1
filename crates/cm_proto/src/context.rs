//! Conversation context supplied by the chat layer.
//!
//! Only direct (two-member) channels are encrypted. The AAD string binds
//! channel type, channel id, sender and recipient:
//!
//!   `"{channelType}:{channelId}:{senderId}->{recipientId}"`
//!
//! Direction matters: `A->B` and `B->A` are different contexts, so a
//! recipient rebuilds the AAD with the sender on the left.

use serde::{Deserialize, Serialize};

use cm_crypto::PublicKeyBlob;

pub const DEFAULT_CHANNEL_TYPE: &str = "messaging";

pub fn build_aad(channel_type: &str, channel_id: &str, sender_id: &str, recipient_id: &str) -> String {
    format!("{channel_type}:{channel_id}:{sender_id}->{recipient_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMember {
    pub user_id: String,
    /// Peer's exported public key, if they have initialised E2E.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKeyBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelContext {
    #[serde(default = "default_channel_type")]
    pub channel_type: String,
    pub channel_id: String,
    #[serde(default)]
    pub is_dm: bool,
    #[serde(default)]
    pub members: Vec<ChannelMember>,
}

fn default_channel_type() -> String {
    DEFAULT_CHANNEL_TYPE.to_string()
}

impl ChannelContext {
    pub fn direct(channel_id: impl Into<String>, members: Vec<ChannelMember>) -> Self {
        Self {
            channel_type: default_channel_type(),
            channel_id: channel_id.into(),
            is_dm: true,
            members,
        }
    }

    /// The other participant of a DM, from `self_id`'s point of view.
    pub fn dm_peer(&self, self_id: &str) -> Option<&ChannelMember> {
        if !self.is_dm {
            return None;
        }
        self.members.iter().find(|m| m.user_id != self_id)
    }

    pub fn aad(&self, sender_id: &str, recipient_id: &str) -> String {
        build_aad(&self.channel_type, &self.channel_id, sender_id, recipient_id)
    }
}

/// Who sent an incoming envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerContext {
    pub peer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl PeerContext {
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            wallet_address: None,
        }
    }
}
