//! Minimal Solidity ABI codec for the notarization contract.
//!
//! Only what the core touches:
//!   isInWhiteList(address) → bool
//!   balanceOf(address) → uint256
//!   getReceivedMessages() → (address,address,string,uint256,bytes32)[]
//!   logMessageHash(address,bytes32)
//!   event MessageSent(address indexed sender, address indexed recipient,
//!                     uint256 timestamp, bytes32 messageHash)
//!
//! Every word is 32 bytes, big-endian. Offsets inside dynamic data are
//! relative to the start of the enclosing tuple / array body.

use cm_crypto::{hash::keccak256, MessageHash};

use crate::{
    address::Address,
    client::{ChainMessage, MessageSentEvent},
    error::ChainError,
};

pub const WORD: usize = 32;

pub const IS_IN_WHITE_LIST: &str = "isInWhiteList(address)";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const GET_RECEIVED_MESSAGES: &str = "getReceivedMessages()";
pub const LOG_MESSAGE_HASH: &str = "logMessageHash(address,bytes32)";
pub const MESSAGE_SENT_EVENT: &str = "MessageSent(address,address,uint256,bytes32)";

// ── Encoding ─────────────────────────────────────────────────────────────────

/// First four bytes of keccak256 of the canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let h = keccak256(signature.as_bytes());
    [h[0], h[1], h[2], h[3]]
}

/// topic0 of an event.
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

pub fn address_word(address: &Address) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[12..].copy_from_slice(address.as_bytes());
    w
}

pub fn encode_call(signature: &str, args: &[[u8; WORD]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + args.len() * WORD);
    out.extend_from_slice(&selector(signature));
    for a in args {
        out.extend_from_slice(a);
    }
    out
}

pub fn encode_is_in_white_list(address: &Address) -> Vec<u8> {
    encode_call(IS_IN_WHITE_LIST, &[address_word(address)])
}

pub fn encode_balance_of(address: &Address) -> Vec<u8> {
    encode_call(BALANCE_OF, &[address_word(address)])
}

pub fn encode_get_received_messages() -> Vec<u8> {
    encode_call(GET_RECEIVED_MESSAGES, &[])
}

pub fn encode_log_message_hash(recipient: &Address, hash: &MessageHash) -> Vec<u8> {
    encode_call(LOG_MESSAGE_HASH, &[address_word(recipient), *hash.as_bytes()])
}

// ── Decoding ─────────────────────────────────────────────────────────────────

fn add(a: usize, b: usize) -> Result<usize, ChainError> {
    a.checked_add(b)
        .ok_or_else(|| ChainError::Abi("offset overflow".into()))
}

/// `base + n` words, checked.
fn word_at(base: usize, n: usize) -> Result<usize, ChainError> {
    let delta = n
        .checked_mul(WORD)
        .ok_or_else(|| ChainError::Abi("offset overflow".into()))?;
    add(base, delta)
}

fn word(data: &[u8], offset: usize) -> Result<&[u8], ChainError> {
    let end = add(offset, WORD)?;
    data.get(offset..end)
        .ok_or_else(|| ChainError::Abi(format!("word at {offset} out of bounds ({} bytes)", data.len())))
}

/// A uint256 word that must fit in u128.
pub fn decode_u128(w: &[u8]) -> Result<u128, ChainError> {
    if w.len() != WORD || w[..16].iter().any(|b| *b != 0) {
        return Err(ChainError::Abi("uint256 does not fit in u128".into()));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&w[16..]);
    Ok(u128::from_be_bytes(buf))
}

fn decode_u64(w: &[u8]) -> Result<u64, ChainError> {
    u64::try_from(decode_u128(w)?).map_err(|_| ChainError::Abi("uint256 does not fit in u64".into()))
}

fn decode_offset(w: &[u8]) -> Result<usize, ChainError> {
    usize::try_from(decode_u64(w)?).map_err(|_| ChainError::Abi("offset overflow".into()))
}

pub fn decode_bool(data: &[u8]) -> Result<bool, ChainError> {
    match decode_u128(word(data, 0)?)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ChainError::Abi(format!("invalid bool value {other}"))),
    }
}

pub fn decode_address(w: &[u8]) -> Result<Address, ChainError> {
    if w.len() != WORD || w[..12].iter().any(|b| *b != 0) {
        return Err(ChainError::Abi("address word has dirty high bytes".into()));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&w[12..]);
    Ok(Address::from_bytes(out))
}

fn decode_bytes32(w: &[u8]) -> Result<MessageHash, ChainError> {
    let mut out = [0u8; 32];
    out.copy_from_slice(w);
    Ok(MessageHash::from_bytes(out))
}

fn decode_string(data: &[u8], at: usize) -> Result<String, ChainError> {
    let len = decode_offset(word(data, at)?)?;
    let start = add(at, WORD)?;
    let bytes = data
        .get(start..add(start, len)?)
        .ok_or_else(|| ChainError::Abi("string body out of bounds".into()))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ChainError::Abi("string is not UTF-8".into()))
}

/// Return data of `getReceivedMessages()`.
pub fn decode_received_messages(data: &[u8]) -> Result<Vec<ChainMessage>, ChainError> {
    let array_at = decode_offset(word(data, 0)?)?;
    let count = decode_offset(word(data, array_at)?)?;
    let body = add(array_at, WORD)?;

    let mut out = Vec::with_capacity(count.min(1024));
    for i in 0..count {
        let tuple_at = add(body, decode_offset(word(data, word_at(body, i)?)?)?)?;
        let sender = decode_address(word(data, tuple_at)?)?;
        let recipient = decode_address(word(data, word_at(tuple_at, 1)?)?)?;
        let content_at = add(tuple_at, decode_offset(word(data, word_at(tuple_at, 2)?)?)?)?;
        let timestamp = decode_u64(word(data, word_at(tuple_at, 3)?)?)?;
        let hash = decode_bytes32(word(data, word_at(tuple_at, 4)?)?)?;
        out.push(ChainMessage {
            sender,
            recipient,
            content: decode_string(data, content_at)?,
            timestamp,
            hash,
        });
    }
    Ok(out)
}

/// A `MessageSent` log: topics = [sig, sender, recipient], data = [timestamp, hash].
pub fn decode_message_sent(
    topics: &[[u8; WORD]],
    data: &[u8],
    block_number: u64,
) -> Result<MessageSentEvent, ChainError> {
    if topics.len() != 3 || topics[0] != event_topic(MESSAGE_SENT_EVENT) {
        return Err(ChainError::Abi("not a MessageSent log".into()));
    }
    Ok(MessageSentEvent {
        sender: decode_address(&topics[1])?,
        recipient: decode_address(&topics[2])?,
        timestamp: decode_u64(word(data, 0)?)?,
        message_hash: decode_bytes32(word(data, WORD)?)?,
        block_number,
    })
}
