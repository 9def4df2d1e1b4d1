//! Ethereum JSON-RPC implementation of [`ChainClient`].
//!
//! Provider selection: walk `ChainSettings::rpc_urls` in order and keep the
//! first endpoint where `eth_getCode(contract)` is non-empty. Public RPCs are
//! frequently rate limited, so an unreachable endpoint is logged and skipped.
//!
//! Event stream: `eth_getLogs` polling from the current head, one block range
//! per tick. Logs are forwarded in block order; a failed poll is retried on
//! the next tick over the same range.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use cm_crypto::MessageHash;

use crate::{
    abi,
    address::Address,
    client::{ChainClient, ChainMessage, MessageSentEvent, TxReceipt},
    config::ChainSettings,
    error::ChainError,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const RECEIPT_POLL: Duration = Duration::from_secs(1);

// ── Hex helpers ──────────────────────────────────────────────────────────────

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(s: &str) -> Result<Vec<u8>, ChainError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| ChainError::Malformed(format!("hex: {e}")))
}

/// Parse a JSON-RPC quantity (`"0x1a"`).
pub fn parse_quantity(s: &str) -> Result<u64, ChainError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Malformed(format!("quantity without 0x: {s}")))?;
    if digits.is_empty() {
        return Err(ChainError::Malformed("empty quantity".into()));
    }
    u64::from_str_radix(digits, 16).map_err(|e| ChainError::Malformed(format!("quantity {s}: {e}")))
}

pub fn quantity(n: u64) -> String {
    format!("0x{n:x}")
}

fn topic(s: &str) -> Result<[u8; 32], ChainError> {
    from_hex(s)?
        .try_into()
        .map_err(|_| ChainError::Malformed("topic is not 32 bytes".into()))
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl RpcLog {
    pub fn decode_message_sent(&self) -> Result<MessageSentEvent, ChainError> {
        let topics = self
            .topics
            .iter()
            .map(|t| topic(t))
            .collect::<Result<Vec<_>, _>>()?;
        let block = self
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .unwrap_or_default();
        abi::decode_message_sent(&topics, &from_hex(&self.data)?, block)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    block_number: Option<String>,
    status: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct JsonRpcChain {
    client: reqwest::Client,
    url: String,
    contract: Address,
    from: Option<Address>,
    poll_interval: Duration,
    receipt_timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcChain {
    /// Bind to a specific endpoint without probing it.
    pub fn new(url: &str, settings: &ChainSettings) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .user_agent("corpchat-core/0.1")
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            contract: Address::parse(&settings.contract_address)?,
            from: settings
                .from_address
                .as_deref()
                .map(Address::parse)
                .transpose()?,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            receipt_timeout: Duration::from_secs(settings.receipt_timeout_secs),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Try every configured endpoint in order; the first one that hosts the
    /// contract is returned.
    pub async fn connect(settings: &ChainSettings) -> Result<Self, ChainError> {
        for url in &settings.rpc_urls {
            let chain = Self::new(url, settings)?;
            match chain.get_code().await {
                Ok(code) if !code.is_empty() => {
                    info!(rpc = %url, contract = %chain.contract, "connected to contract");
                    return Ok(chain);
                }
                Ok(_) => debug!(rpc = %url, "contract not deployed on this network"),
                Err(err) => warn!(rpc = %url, error = %err, "rpc unavailable"),
            }
        }
        Err(ChainError::NoProvider)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let res = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?;
        let body: RpcResponse<T> = res.json().await?;
        if let Some(err) = body.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(body.result)
    }

    async fn request_required<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        self.request(method, params)
            .await?
            .ok_or_else(|| ChainError::Malformed(format!("{method}: missing result")))
    }

    async fn get_code(&self) -> Result<Vec<u8>, ChainError> {
        let code: String = self
            .request_required("eth_getCode", json!([self.contract.to_string(), "latest"]))
            .await?;
        from_hex(&code)
    }

    async fn eth_call(&self, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let mut call = json!({
            "to": self.contract.to_string(),
            "data": to_hex(&data),
        });
        if let Some(from) = &self.from {
            call["from"] = json!(from.to_string());
        }
        let out: String = self.request_required("eth_call", json!([call, "latest"])).await?;
        from_hex(&out)
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let n: String = self.request_required("eth_blockNumber", json!([])).await?;
        parse_quantity(&n)
    }

    pub async fn message_sent_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RpcLog>, ChainError> {
        self.request_required(
            "eth_getLogs",
            json!([{
                "address": self.contract.to_string(),
                "fromBlock": quantity(from_block),
                "toBlock": quantity(to_block),
                "topics": [to_hex(&abi::event_topic(abi::MESSAGE_SENT_EVENT))],
            }]),
        )
        .await
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, ChainError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;
        loop {
            let receipt: Option<RpcReceipt> = self
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(r) = receipt {
                if r.status.as_deref() == Some("0x0") {
                    return Err(ChainError::Reverted(tx_hash.to_string()));
                }
                if let Some(block) = r.block_number.as_deref() {
                    return Ok(TxReceipt {
                        transaction_hash: tx_hash.to_string(),
                        block_number: parse_quantity(block)?,
                    });
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::ReceiptTimeout(tx_hash.to_string()));
            }
            tokio::time::sleep(RECEIPT_POLL).await;
        }
    }
}

async fn poll_logs(chain: JsonRpcChain, mut next_block: u64, tx: mpsc::Sender<MessageSentEvent>) {
    let mut ticker = tokio::time::interval(chain.poll_interval);
    loop {
        ticker.tick().await;
        if tx.is_closed() {
            debug!("MessageSent receiver dropped, stopping log poller");
            return;
        }
        let head = match chain.block_number().await {
            Ok(h) => h,
            Err(err) => {
                warn!(error = %err, "eth_blockNumber failed");
                continue;
            }
        };
        if head < next_block {
            continue;
        }
        let logs = match chain.message_sent_logs(next_block, head).await {
            Ok(l) => l,
            Err(err) => {
                warn!(error = %err, from = next_block, to = head, "eth_getLogs failed");
                continue;
            }
        };
        for log in logs.iter().filter(|l| !l.removed) {
            match log.decode_message_sent() {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Err(err) => warn!(error = %err, "undecodable MessageSent log"),
            }
        }
        next_block = head + 1;
    }
}

#[async_trait]
impl ChainClient for JsonRpcChain {
    async fn is_in_white_list(&self, address: &Address) -> Result<bool, ChainError> {
        abi::decode_bool(&self.eth_call(abi::encode_is_in_white_list(address)).await?)
    }

    async fn balance_of(&self, address: &Address) -> Result<u128, ChainError> {
        let out = self.eth_call(abi::encode_balance_of(address)).await?;
        let word = out
            .get(..abi::WORD)
            .ok_or_else(|| ChainError::Abi("short balanceOf result".into()))?;
        abi::decode_u128(word)
    }

    async fn get_received_messages(&self) -> Result<Vec<ChainMessage>, ChainError> {
        abi::decode_received_messages(&self.eth_call(abi::encode_get_received_messages()).await?)
    }

    async fn subscribe_message_sent(&self) -> Result<mpsc::Receiver<MessageSentEvent>, ChainError> {
        let head = self.block_number().await?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        info!(rpc = %self.url, from_block = head + 1, "polling MessageSent logs");
        tokio::spawn(poll_logs(self.clone(), head + 1, tx));
        Ok(rx)
    }

    async fn log_message_hash(&self, recipient: &Address, hash: &MessageHash) -> Result<TxReceipt, ChainError> {
        let from = self.from.ok_or(ChainError::NoSender)?;
        let tx_hash: String = self
            .request_required(
                "eth_sendTransaction",
                json!([{
                    "from": from.to_string(),
                    "to": self.contract.to_string(),
                    "data": to_hex(&abi::encode_log_message_hash(recipient, hash)),
                }]),
            )
            .await?;
        info!(tx = %tx_hash, %recipient, %hash, "submitted logMessageHash");
        self.wait_for_receipt(&tx_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("26").is_err());
        assert!(parse_quantity("0x").is_err());
        assert_eq!(quantity(255), "0xff");
    }

    #[test]
    fn hex_roundtrip() {
        assert_eq!(from_hex(&to_hex(&[0xde, 0xad])).unwrap(), vec![0xde, 0xad]);
        assert_eq!(from_hex("0x").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn settings_reject_bad_contract_address() {
        let settings = ChainSettings {
            contract_address: "nope".into(),
            ..ChainSettings::default()
        };
        assert!(matches!(
            JsonRpcChain::new("http://127.0.0.1:8545", &settings),
            Err(ChainError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn connect_with_no_reachable_provider_fails() {
        let settings = ChainSettings {
            rpc_urls: vec![],
            ..ChainSettings::default()
        };
        assert!(matches!(
            JsonRpcChain::connect(&settings).await,
            Err(ChainError::NoProvider)
        ));
    }
}
