//! Settings for the ureq transport.

use serde::Deserialize;

pub const DEFAULT_USER_AGENT: &str = concat!("reqcycle/", env!("CARGO_PKG_VERSION"));

/// Response bodies larger than this fail the exchange.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Sent unless the request sets its own `User-Agent`.
    pub user_agent: String,
    pub max_response_bytes: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl HostConfig {
    /// Defaults overridden by `REQCYCLE_USER_AGENT` and
    /// `REQCYCLE_MAX_RESPONSE_BYTES`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(user_agent) = std::env::var("REQCYCLE_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(limit) = std::env::var("REQCYCLE_MAX_RESPONSE_BYTES")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            config.max_response_bytes = limit;
        }
        config
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
