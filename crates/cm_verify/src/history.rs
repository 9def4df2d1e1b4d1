//! One-shot verification against the contract's stored messages.

use tracing::{debug, warn};

use cm_chain::{Address, ChainClient, ChainMessage};
use cm_crypto::{message_hash, MessageHash};

pub const DEFAULT_DRIFT_SECS: u64 = 300;

/// True iff `getReceivedMessages()` holds a record from `sender_address`
/// with the hash of `content`, stamped within the default drift of
/// `sent_at_ms` (unix milliseconds). Chain failures yield `false`.
pub async fn verify_message_hash(
    chain: &dyn ChainClient,
    content: &str,
    sender_address: &str,
    sent_at_ms: u64,
) -> bool {
    verify_message_hash_with_drift(chain, content, sender_address, sent_at_ms, DEFAULT_DRIFT_SECS).await
}

pub async fn verify_message_hash_with_drift(
    chain: &dyn ChainClient,
    content: &str,
    sender_address: &str,
    sent_at_ms: u64,
    drift_secs: u64,
) -> bool {
    let sender = match Address::parse(sender_address) {
        Ok(a) => a,
        Err(err) => {
            warn!(error = %err, "history check with invalid sender address");
            return false;
        }
    };
    let hash = message_hash(content);

    let messages = match chain.get_received_messages().await {
        Ok(m) => m,
        Err(err) => {
            warn!(error = %err, "failed to fetch received messages");
            return false;
        }
    };

    let found = find_match(&messages, &sender, &hash, sent_at_ms / 1000, drift_secs).is_some();
    debug!(%hash, %sender, candidates = messages.len(), found, "history verification");
    found
}

fn find_match<'a>(
    messages: &'a [ChainMessage],
    sender: &Address,
    hash: &MessageHash,
    sent_at_secs: u64,
    drift_secs: u64,
) -> Option<&'a ChainMessage> {
    messages.iter().find(|m| {
        m.sender == *sender && m.hash == *hash && m.timestamp.abs_diff(sent_at_secs) < drift_secs
    })
}
