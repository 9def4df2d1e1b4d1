//! cm_session — Per-user E2E session
//!
//! Ties key lifecycle to login/logout and exposes the operations the chat
//! layer calls: encrypt for a channel, decrypt an incoming envelope, and
//! notarize a message hash on-chain.
//!
//! # Modules
//! - `session` — `E2eSession` and its result types
//! - `config`  — `SessionSettings`
//! - `error`   — unified error type

pub mod config;
pub mod error;
pub mod session;

pub use config::SessionSettings;
pub use error::SessionError;
pub use session::{DecryptedMessage, E2eSession, KeyChange, LocalIdentity, NotarizationReceipt};
