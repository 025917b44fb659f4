// run_file.rs — The TOML file `tb run` executes.
//
//   tick_interval_ms = 100
//
//   [sleep_action]
//   action_name = "sleep_service"
//   server_timeout_ms = 1000
//
//   [[steps]]
//   msec = 1000
//   timeout_ms = 500     # halt the node if it has not finished by then

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tb_action::ActionNodeParams;

/// Server name used when the run file does not name one.
pub const DEFAULT_SERVER: &str = "sleep_service";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_sleep_action")]
    pub sleep_action: ActionNodeParams,

    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One invocation of the sleep action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Node instance name; `sleep_<n>` when omitted.
    #[serde(default)]
    pub name: Option<String>,

    /// How long the server should sleep.
    pub msec: u64,

    /// Halt the node after this long.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Step {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn node_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("sleep_{}", index + 1))
    }
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_sleep_action() -> ActionNodeParams {
    ActionNodeParams::new(DEFAULT_SERVER, Duration::from_millis(1000))
}

impl RunFile {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut run: RunFile = toml::from_str(content).context("invalid run file")?;
        if run.sleep_action.action_name.is_empty() {
            run.sleep_action.action_name = DEFAULT_SERVER.to_string();
        }
        if run.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be greater than zero");
        }
        Ok(run)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read run file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
