#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use cm_chain::{Address, ChainClient, ChainError, ChainMessage, MessageSentEvent, TxReceipt};
use cm_crypto::{message_hash, MessageHash};

pub const ALICE: &str = "0x00000000000000000000000000000000000000aa";
pub const BOB: &str = "0x00000000000000000000000000000000000000bb";

pub fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

pub fn event(text: &str) -> MessageSentEvent {
    MessageSentEvent {
        sender: addr(ALICE),
        recipient: addr(BOB),
        timestamp: 1_700_000_000,
        message_hash: message_hash(text),
        block_number: 1,
    }
}

/// In-memory contract: a fixed inbox and a hand-fed event stream.
#[derive(Default)]
pub struct MockChain {
    pub inbox: Vec<ChainMessage>,
    pub fail_reads: bool,
    pub events: Mutex<Option<mpsc::Receiver<MessageSentEvent>>>,
    pub logged: Mutex<Vec<(Address, MessageHash)>>,
}

impl MockChain {
    pub fn with_stream() -> (Self, mpsc::Sender<MessageSentEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let chain = Self {
            events: Mutex::new(Some(rx)),
            ..Self::default()
        };
        (chain, tx)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn is_in_white_list(&self, _address: &Address) -> Result<bool, ChainError> {
        Ok(true)
    }

    async fn balance_of(&self, _address: &Address) -> Result<u128, ChainError> {
        Ok(0)
    }

    async fn get_received_messages(&self) -> Result<Vec<ChainMessage>, ChainError> {
        if self.fail_reads {
            return Err(ChainError::NoProvider);
        }
        Ok(self.inbox.clone())
    }

    async fn subscribe_message_sent(&self) -> Result<mpsc::Receiver<MessageSentEvent>, ChainError> {
        self.events.lock().take().ok_or(ChainError::NoProvider)
    }

    async fn log_message_hash(&self, recipient: &Address, hash: &MessageHash) -> Result<TxReceipt, ChainError> {
        self.logged.lock().push((*recipient, *hash));
        Ok(TxReceipt {
            transaction_hash: format!("0x{:064x}", 1),
            block_number: 1,
        })
    }
}
