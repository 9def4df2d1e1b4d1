use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("No reachable RPC provider hosts the contract")]
    NoProvider,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("ABI decode error: {0}")]
    Abi(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("No sender account configured for contract writes")]
    NoSender,

    #[error("Transaction {0} not mined before timeout")]
    ReceiptTimeout(String),

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("Malformed RPC response: {0}")]
    Malformed(String),
}
