//! cm_proto — Transport-facing types for Corpchat direct messages
//!
//! The chat transport is an external collaborator; these are the only shapes
//! this core hands to it or accepts from it.
//!
//! # Modules
//! - `envelope` — Encrypted envelope fields attached to a chat message
//! - `context`  — Channel / peer context and the AAD string that binds them

pub mod context;
pub mod envelope;

pub use context::{build_aad, ChannelContext, ChannelMember, PeerContext, DEFAULT_CHANNEL_TYPE};
pub use envelope::{EncryptedEnvelope, OutgoingMessage, ENCRYPTED_PLACEHOLDER};
