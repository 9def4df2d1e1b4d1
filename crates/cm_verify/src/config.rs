use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySettings {
    /// How long a watch waits for its `MessageSent` event.
    pub watch_timeout_ms: u64,
    /// Cached verifications older than this are evicted by the sweep.
    pub cache_max_age_secs: u64,
    pub sweep_interval_secs: u64,
    /// Accepted gap between a message's send time and the on-chain timestamp.
    pub history_drift_secs: u64,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            watch_timeout_ms: 60_000,
            cache_max_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 10 * 60,
            history_drift_secs: 300,
        }
    }
}

impl VerifySettings {
    pub fn watch_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_timeout_ms)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
