use thiserror::Error;

use cm_chain::ChainError;
use cm_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No user is logged in")]
    NotLoggedIn,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}
