use serde::{Deserialize, Serialize};

/// Connection settings for the notarization contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    /// Tried in order; the first endpoint that hosts the contract wins.
    pub rpc_urls: Vec<String>,
    pub contract_address: String,
    /// Local account used as `from` for `getReceivedMessages` and writes.
    /// Writes require the node to manage this account.
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    4_000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_urls: vec![
                "https://polygon-rpc.com".into(),
                "https://rpc-mainnet.matic.network".into(),
                "https://rpc-mainnet.maticvigil.com".into(),
                "https://eth.llamarpc.com".into(),
                "https://sepolia.gateway.tenderly.co".into(),
                "https://bsc-dataseed1.binance.org".into(),
                "https://data-seed-prebsc-1-s1.binance.org:8545".into(),
                "https://arb1.arbitrum.io/rpc".into(),
                "https://mainnet.optimism.io".into(),
            ],
            contract_address: "0xA4dEC8E76dc65D90343C4d91DD8C4d187E46Cd85".into(),
            from_address: None,
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
        }
    }
}
