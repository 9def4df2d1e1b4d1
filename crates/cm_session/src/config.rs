use serde::{Deserialize, Serialize};

use cm_proto::DEFAULT_CHANNEL_TYPE;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Used in the AAD when a channel context carries an empty type.
    pub default_channel_type: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_channel_type: DEFAULT_CHANNEL_TYPE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        let s: SessionSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.default_channel_type, "messaging");
    }
}
