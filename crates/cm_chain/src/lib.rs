//! cm_chain — Boundary to the notarization contract
//!
//! The contract itself (whitelist, ERC-20 balance, message storage) is an
//! external collaborator. This crate only describes the primitives the core
//! consumes from it and ships one implementation over Ethereum JSON-RPC.
//!
//! # Modules
//! - `client`  — `ChainClient` trait and the event / record types
//! - `abi`     — minimal ABI encoding/decoding for the calls and events used
//! - `rpc`     — `JsonRpcChain`: provider selection, `eth_call`, log polling, writes
//! - `address` — validated, lower-cased account addresses
//! - `config`  — `ChainSettings`
//! - `error`   — unified error type

pub mod abi;
pub mod address;
pub mod client;
pub mod config;
pub mod error;
pub mod rpc;

pub use address::Address;
pub use client::{ChainClient, ChainMessage, MessageSentEvent, TxReceipt};
pub use config::ChainSettings;
pub use error::ChainError;
pub use rpc::JsonRpcChain;
