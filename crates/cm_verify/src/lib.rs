//! cm_verify — On-chain hash verification
//!
//! A recipient asks "was this message's hash notarized?" and gets an answer
//! either immediately (cache), when a matching `MessageSent` event arrives,
//! or as a timeout. Cache and pending watches live in one state machine so an
//! incoming event is cached and dispatched atomically.
//!
//! # Modules
//! - `hub`      — `VerificationHub`: verification cache + watcher registry
//! - `listener` — task feeding the contract's event stream into the hub
//! - `sweep`    — periodic cache expiry loop
//! - `history`  — one-shot check against `getReceivedMessages()`
//! - `config`   — `VerifySettings`
//! - `error`    — unified error type

pub mod config;
pub mod error;
pub mod history;
pub mod hub;
pub mod listener;
pub mod sweep;

pub use config::VerifySettings;
pub use error::VerifyError;
pub use history::verify_message_hash;
pub use hub::{VerificationHub, VerificationOutcome, VerificationRecord, WatchHandle, WatchId};
pub use listener::{spawn_event_listener, ListenerHandle};
pub use sweep::{spawn_sweep_loop, SweepLoopHandle};
