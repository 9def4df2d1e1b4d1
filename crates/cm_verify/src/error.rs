use thiserror::Error;

use cm_chain::ChainError;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("MessageSent subscription unavailable: {0}")]
    SubscriptionUnavailable(#[source] ChainError),
}
