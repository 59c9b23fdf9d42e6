//! Serializable controller settings.

use std::time::Duration;

use serde::Deserialize;

use crate::error::RequestError;
use crate::headers::HeaderSet;
use crate::http::ResponseType;

/// Settings applied to a controller with `RequestController::apply_config`.
///
/// Every field is optional in the JSON form:
///
/// ```
/// let config = reqcycle_core::ControllerConfig::from_json(
///     r#"{"timeout_ms": 5000, "headers": [["Accept", "application/json"]]}"#,
/// ).unwrap();
/// assert_eq!(config.timeout().as_millis(), 5000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 0 disables the timeout.
    pub timeout_ms: u64,
    pub with_credentials: bool,
    pub response_type: ResponseType,
    pub progress_events: bool,
    pub headers: Vec<(String, String)>,
}

impl ControllerConfig {
    pub fn from_json(raw: &str) -> Result<Self, RequestError> {
        serde_json::from_str(raw).map_err(|e| RequestError::Config(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn header_set(&self) -> HeaderSet {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}
