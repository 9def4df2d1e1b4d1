use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use cm_chain::{Address, ChainClient, ChainError, ChainMessage, MessageSentEvent, TxReceipt};
use cm_crypto::{message_hash, KeyAgreement, MessageHash};
use cm_session::{E2eSession, SessionError, SessionSettings};

#[derive(Default)]
struct RecordingChain {
    logged: Mutex<Vec<(Address, MessageHash)>>,
}

#[async_trait]
impl ChainClient for RecordingChain {
    async fn is_in_white_list(&self, _address: &Address) -> Result<bool, ChainError> {
        Ok(true)
    }

    async fn balance_of(&self, _address: &Address) -> Result<u128, ChainError> {
        Ok(0)
    }

    async fn get_received_messages(&self) -> Result<Vec<ChainMessage>, ChainError> {
        Ok(Vec::new())
    }

    async fn subscribe_message_sent(&self) -> Result<mpsc::Receiver<MessageSentEvent>, ChainError> {
        Err(ChainError::NoProvider)
    }

    async fn log_message_hash(&self, recipient: &Address, hash: &MessageHash) -> Result<TxReceipt, ChainError> {
        self.logged.lock().push((*recipient, *hash));
        Ok(TxReceipt {
            transaction_hash: "0xabc".into(),
            block_number: 42,
        })
    }
}

const BOB: &str = "0x00000000000000000000000000000000000000Bb";

#[tokio::test]
async fn notarize_logs_keccak_of_plaintext() {
    let session = E2eSession::new(KeyAgreement::default(), SessionSettings::default());
    let chain = RecordingChain::default();

    let receipt = session.notarize(&chain, "hello", BOB).await.unwrap();
    assert_eq!(receipt.message_hash, message_hash("hello"));
    assert_eq!(receipt.block_number, 42);
    assert_eq!(receipt.recipient.to_string(), BOB.to_lowercase());

    let logged = chain.logged.lock();
    assert_eq!(logged.as_slice(), &[(Address::parse(BOB).unwrap(), message_hash("hello"))]);
}

#[tokio::test]
async fn notarize_rejects_bad_recipient() {
    let session = E2eSession::new(KeyAgreement::default(), SessionSettings::default());
    let chain = RecordingChain::default();
    let err = session.notarize(&chain, "hello", "0x1234").await.unwrap_err();
    assert!(matches!(err, SessionError::Chain(ChainError::InvalidAddress(_))));
    assert!(chain.logged.lock().is_empty());
}
