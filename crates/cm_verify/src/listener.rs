//! Feeds the contract's `MessageSent` stream into a [`VerificationHub`].
//!
//! Events are handled one at a time in arrival order. A subscription failure
//! is logged and ends the task; watches then resolve by timeout only.

use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use cm_chain::ChainClient;

use crate::{error::VerifyError, hub::VerificationHub};

pub struct ListenerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ListenerHandle {
    /// Ask the listener to stop after the event in flight, if any.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to exit.
    pub async fn join(self) {
        if let Err(err) = self.join.await {
            warn!(error = %err, "event listener task failed");
        }
    }
}

pub fn spawn_event_listener(chain: Arc<dyn ChainClient>, hub: Arc<VerificationHub>) -> ListenerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut events = match chain.subscribe_message_sent().await {
            Ok(rx) => rx,
            Err(err) => {
                let err = VerifyError::SubscriptionUnavailable(err);
                warn!(error = %err, "event listener not started; verification falls back to timeouts");
                return;
            }
        };
        info!("event listener started");

        loop {
            tokio::select! {
                ev = events.recv() => match ev {
                    Some(event) => {
                        hub.record_event(&event);
                    }
                    None => {
                        info!("MessageSent stream closed, event listener exiting");
                        return;
                    }
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("event listener shutting down");
                        return;
                    }
                }
            }
        }
    });

    ListenerHandle { shutdown_tx, join }
}
