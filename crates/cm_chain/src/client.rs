//! The on-chain primitives the core consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use cm_crypto::MessageHash;

use crate::{address::Address, error::ChainError};

/// `MessageSent(sender, recipient, timestamp, messageHash)` as observed in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSentEvent {
    pub sender: Address,
    pub recipient: Address,
    /// Unix seconds, as stamped by the contract.
    pub timestamp: u64,
    pub message_hash: MessageHash,
    pub block_number: u64,
}

/// One entry of `getReceivedMessages()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMessage {
    pub sender: Address,
    pub recipient: Address,
    pub content: String,
    pub timestamp: u64,
    pub hash: MessageHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn is_in_white_list(&self, address: &Address) -> Result<bool, ChainError>;

    /// Token balance in base units.
    async fn balance_of(&self, address: &Address) -> Result<u128, ChainError>;

    /// Messages addressed to the configured local account.
    async fn get_received_messages(&self) -> Result<Vec<ChainMessage>, ChainError>;

    /// Live `MessageSent` stream. The stream ends when the sender side stops;
    /// dropping the receiver stops the producer.
    async fn subscribe_message_sent(&self) -> Result<mpsc::Receiver<MessageSentEvent>, ChainError>;

    /// Notarize `{recipient, hash}`; resolves once mined.
    async fn log_message_hash(
        &self,
        recipient: &Address,
        hash: &MessageHash,
    ) -> Result<TxReceipt, ChainError>;
}
