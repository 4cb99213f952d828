//! TOML configuration file.
//!
//! ```toml
//! state_root = "stages"
//! regions = ["us-east1", "europe-west1"]
//!
//! [nodes]
//! attempts = 30
//! delay = "10s"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{HarnessError, HarnessResult};
use crate::retry::RetryPolicy;

/// Every field is optional; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub state_root: Option<PathBuf>,
    pub examples_dir: Option<PathBuf>,
    pub sample_app_dir: Option<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub project: Option<String>,
    pub region: Option<String>,
    pub regions: Option<Vec<String>>,
    pub nodes: Option<PollFileConfig>,
    pub builds: Option<PollFileConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollFileConfig {
    pub attempts: Option<u32>,
    /// humantime notation, e.g. `"20s"`.
    pub delay: Option<String>,
}

impl PollFileConfig {
    /// Overlay onto `policy`.
    pub fn apply_to(&self, section: &str, policy: RetryPolicy) -> HarnessResult<RetryPolicy> {
        let mut policy = policy;
        if let Some(attempts) = self.attempts {
            if attempts == 0 {
                return Err(HarnessError::Config(format!(
                    "{section}.attempts must be at least 1"
                )));
            }
            policy.max_attempts = attempts;
        }
        if let Some(delay) = &self.delay {
            policy.delay = parse_delay(section, delay)?;
        }
        Ok(policy)
    }
}

fn parse_delay(section: &str, raw: &str) -> HarnessResult<Duration> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| HarnessError::Config(format!("{section}.delay '{raw}': {e}")))
}

impl FileConfig {
    pub fn parse(contents: &str) -> HarnessResult<Self> {
        toml::from_str(contents).map_err(|e| HarnessError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> HarnessResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&contents)
            .map_err(|e| HarnessError::Config(format!("{}: {e}", path.display())))
    }
}
