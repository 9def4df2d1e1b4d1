use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use cm_chain::ChainSettings;
use cm_session::SessionSettings;
use cm_verify::VerifySettings;

/// Everything the CLI can be configured with. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliSettings {
    pub chain: ChainSettings,
    pub verify: VerifySettings,
    pub session: SessionSettings,
}

impl CliSettings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn apply_overrides(&mut self, rpc_url: Option<String>, from: Option<String>) {
        if let Some(url) = rpc_url {
            self.chain.rpc_urls = vec![url];
        }
        if from.is_some() {
            self.chain.from_address = from;
        }
    }
}
