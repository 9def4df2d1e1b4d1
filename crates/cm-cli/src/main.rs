use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cm_chain::{Address, ChainClient, JsonRpcChain};
use cm_crypto::{fingerprint, import_public_key, message_hash, KeyAgreement, PublicKeyBlob};
use cm_proto::{ChannelContext, ChannelMember, PeerContext};
use cm_session::E2eSession;
use cm_verify::{
    history::verify_message_hash_with_drift, spawn_event_listener, spawn_sweep_loop, VerificationHub,
    VerificationOutcome,
};

mod config;

use crate::config::CliSettings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Corpchat secure messaging core", long_about = None)]
struct Cli {
    /// JSON settings file (sections: chain, verify, session)
    #[arg(long, global = true, env = "CORPCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Use this RPC endpoint instead of the configured list
    #[arg(long, global = true, env = "CORPCHAT_RPC_URL")]
    rpc_url: Option<String>,

    /// Node-managed account used for contract writes
    #[arg(long, global = true, env = "CORPCHAT_FROM_ADDRESS")]
    from: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a session identity and print its public key
    Keygen {
        #[arg(long)]
        user: String,
    },
    /// Fingerprint of an exported public key (JWK)
    Fingerprint { jwk: String },
    /// Keccak-256 hash of a message, as notarized on-chain
    Hash { text: String },
    /// Encrypt a message between two throwaway identities and decrypt it back
    Selftest {
        #[arg(long, default_value = "hello")]
        text: String,
        #[arg(long, default_value = "chan1")]
        channel: String,
    },
    /// Check whether an address is whitelisted by the contract
    Whitelist { address: String },
    /// Token balance of an address
    Balance { address: String },
    /// Log a message hash on-chain for a recipient
    Notarize {
        #[arg(long)]
        text: String,
        #[arg(long)]
        recipient: String,
    },
    /// Wait for a MessageSent event carrying the hash of `text`
    Watch {
        text: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Check a received message against the contract's stored history
    Verify {
        #[arg(long)]
        text: String,
        #[arg(long)]
        sender: String,
        /// Send time, unix milliseconds
        #[arg(long)]
        sent_at_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = CliSettings::load(cli.config.as_deref())?;
    settings.apply_overrides(cli.rpc_url, cli.from);

    match cli.command {
        Commands::Keygen { user } => keygen_command(&settings, &user),
        Commands::Fingerprint { jwk } => fingerprint_command(&jwk),
        Commands::Hash { text } => {
            println!("{}", message_hash(&text));
            Ok(())
        }
        Commands::Selftest { text, channel } => selftest_command(&settings, &text, &channel),
        Commands::Whitelist { address } => {
            let chain = JsonRpcChain::connect(&settings.chain).await?;
            let listed = chain.is_in_white_list(&Address::parse(&address)?).await?;
            println!("{listed}");
            Ok(())
        }
        Commands::Balance { address } => {
            let chain = JsonRpcChain::connect(&settings.chain).await?;
            println!("{}", chain.balance_of(&Address::parse(&address)?).await?);
            Ok(())
        }
        Commands::Notarize { text, recipient } => notarize_command(&settings, &text, &recipient).await,
        Commands::Watch { text, timeout_ms } => watch_command(&settings, &text, timeout_ms).await,
        Commands::Verify {
            text,
            sender,
            sent_at_ms,
        } => {
            let chain = JsonRpcChain::connect(&settings.chain).await?;
            let ok = verify_command(&chain, &settings, &text, &sender, sent_at_ms).await;
            println!("{}", if ok { "verified" } else { "not verified" });
            Ok(())
        }
    }
}

fn session(settings: &CliSettings) -> E2eSession {
    E2eSession::new(KeyAgreement::default(), settings.session.clone())
}

fn keygen_command(settings: &CliSettings, user: &str) -> Result<()> {
    let identity = session(settings).login(user)?;
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

fn fingerprint_command(jwk: &str) -> Result<()> {
    let blob = PublicKeyBlob::new(jwk);
    import_public_key(&blob)?;
    println!("{}", fingerprint(&blob));
    Ok(())
}

fn selftest_command(settings: &CliSettings, text: &str, channel_id: &str) -> Result<()> {
    let alice = session(settings);
    let bob = session(settings);
    let a = alice.login("alice")?;
    let b = bob.login("bob")?;

    let channel = ChannelContext::direct(
        channel_id,
        vec![
            ChannelMember {
                user_id: a.user_id.clone(),
                public_key: Some(a.public_key.clone()),
                wallet_address: None,
            },
            ChannelMember {
                user_id: b.user_id.clone(),
                public_key: Some(b.public_key.clone()),
                wallet_address: None,
            },
        ],
    );

    let outgoing = alice.encrypt_message_for_channel(text, &channel);
    println!("{}", serde_json::to_string_pretty(&outgoing)?);
    let envelope = outgoing
        .envelope()
        .ok_or_else(|| anyhow!("message was not encrypted"))?;

    let decrypted = bob.decrypt_in_channel(envelope, &PeerContext::new(&a.user_id), &channel)?;
    if decrypted.text != text {
        bail!("round trip mismatch: {:?}", decrypted.text);
    }
    info!(alice = %a.fingerprint, bob = %b.fingerprint, "round trip ok");
    println!("decrypted: {}", decrypted.text);
    Ok(())
}

async fn verify_command(
    chain: &dyn ChainClient,
    settings: &CliSettings,
    text: &str,
    sender: &str,
    sent_at_ms: u64,
) -> bool {
    verify_message_hash_with_drift(chain, text, sender, sent_at_ms, settings.verify.history_drift_secs).await
}

async fn notarize_command(settings: &CliSettings, text: &str, recipient: &str) -> Result<()> {
    let chain = JsonRpcChain::connect(&settings.chain).await?;
    let receipt = session(settings).notarize(&chain, text, recipient).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn watch_command(settings: &CliSettings, text: &str, timeout_ms: Option<u64>) -> Result<()> {
    let chain: Arc<dyn ChainClient> = Arc::new(JsonRpcChain::connect(&settings.chain).await?);
    let hub = Arc::new(VerificationHub::new(&settings.verify));
    let listener = spawn_event_listener(chain, hub.clone());
    let (sweep, sweep_ctl) = spawn_sweep_loop(
        hub.clone(),
        settings.verify.sweep_interval(),
        settings.verify.cache_max_age(),
    );

    let hash = message_hash(text);
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| hub.default_timeout());
    let message_id = Uuid::new_v4().to_string();
    info!(%hash, %message_id, timeout_ms = timeout.as_millis() as u64, "waiting for notarization");

    let outcome = hub.wait_for_hash(&message_id, hash, timeout).await;

    listener.stop();
    let _ = sweep_ctl.shutdown_tx.send(true);
    listener.join().await;
    let _ = sweep.await;

    match outcome {
        VerificationOutcome::Verified(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        VerificationOutcome::TimedOut => bail!("no MessageSent event for {hash} within {timeout:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cm_chain::{ChainError, ChainMessage, MessageSentEvent, TxReceipt};
    use cm_crypto::MessageHash;
    use tokio::sync::mpsc;

    const SENDER: &str = "0x00000000000000000000000000000000000000aa";

    struct Inbox(Vec<ChainMessage>);

    #[async_trait]
    impl ChainClient for Inbox {
        async fn is_in_white_list(&self, _address: &Address) -> Result<bool, ChainError> {
            Ok(false)
        }

        async fn balance_of(&self, _address: &Address) -> Result<u128, ChainError> {
            Ok(0)
        }

        async fn get_received_messages(&self) -> Result<Vec<ChainMessage>, ChainError> {
            Ok(self.0.clone())
        }

        async fn subscribe_message_sent(&self) -> Result<mpsc::Receiver<MessageSentEvent>, ChainError> {
            Err(ChainError::NoProvider)
        }

        async fn log_message_hash(&self, _recipient: &Address, _hash: &MessageHash) -> Result<TxReceipt, ChainError> {
            Err(ChainError::NoSender)
        }
    }

    #[tokio::test]
    async fn verify_uses_configured_drift() {
        let chain = Inbox(vec![ChainMessage {
            sender: Address::parse(SENDER).unwrap(),
            recipient: Address::parse("0x00000000000000000000000000000000000000bb").unwrap(),
            content: "hello".into(),
            timestamp: 1_700_000_000,
            hash: message_hash("hello"),
        }]);
        // Sent 500 s after the on-chain stamp: outside the default window.
        let sent_at_ms = 1_700_000_500_000;

        let mut settings = CliSettings::default();
        assert!(!verify_command(&chain, &settings, "hello", SENDER, sent_at_ms).await);

        settings.verify.history_drift_secs = 600;
        assert!(verify_command(&chain, &settings, "hello", SENDER, sent_at_ms).await);
    }
}
