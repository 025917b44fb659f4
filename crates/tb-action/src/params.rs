// params.rs — Construction-time parameters of an action adapter.
//
// These are the defaults an adapter falls back to when its `action_name`
// and `timeout` input ports are unbound (or empty / zero). They are
// usually loaded from the `[action]` table of a TOML file:
//
//   action_name = "sleep_service"
//   server_timeout_ms = 2000

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Defaults for one action adapter type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionNodeParams {
    /// Name of the action endpoint to resolve.
    #[serde(default)]
    pub action_name: String,

    /// Bound on endpoint resolution, goal acceptance, and cancellation
    /// acknowledgement.
    #[serde(
        default = "default_server_timeout",
        rename = "server_timeout_ms",
        with = "duration_ms"
    )]
    pub server_timeout: Duration,
}

fn default_server_timeout() -> Duration {
    Duration::from_millis(1000)
}

impl ActionNodeParams {
    pub fn new(action_name: impl Into<String>, server_timeout: Duration) -> Self {
        Self {
            action_name: action_name.into(),
            server_timeout,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

impl Default for ActionNodeParams {
    fn default() -> Self {
        Self {
            action_name: String::new(),
            server_timeout: default_server_timeout(),
        }
    }
}

impl fmt::Display for ActionNodeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action={}, server_timeout={}ms",
            self.action_name,
            self.server_timeout.as_millis()
        )
    }
}

/// Serde adapter: `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
