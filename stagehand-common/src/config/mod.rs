//! Harness configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the TOML file
//! (`stagehand.toml` in the working directory or an explicit path), then
//! `STAGEHAND_*` environment variables. Command-line flags are applied by
//! the binary on top of the result.

pub mod env;
pub mod file;

pub use env::{EnvError, EnvParser};
use env::expand_tilde;
pub use file::{FileConfig, PollFileConfig};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{HarnessError, HarnessResult};
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "stagehand.toml";

/// Env vars consulted, in order, for the cloud project id.
pub const PROJECT_ENV_VARS: &[&str] =
    &["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT", "CLOUDSDK_CORE_PROJECT"];

pub const SAMPLE_APP_DIR_ENV: &str = "SAMPLE_APP_DIR";

/// Standard kubectl search path; only its first entry is copied.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Regions a run picks from when none is pinned.
pub const DEFAULT_REGIONS: &[&str] = &[
    "us-central1",
    "us-east1",
    "us-west1",
    "europe-west1",
    "europe-west4",
    "asia-east1",
];

/// 30 attempts, 10s apart.
pub const DEFAULT_NODE_POLICY: RetryPolicy = RetryPolicy::new(30, Duration::from_secs(10));
/// 30 attempts, 20s apart.
pub const DEFAULT_BUILD_POLICY: RetryPolicy = RetryPolicy::new(30, Duration::from_secs(20));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Parent of every run directory.
    pub state_root: PathBuf,
    /// Infrastructure templates copied into a scratch dir per run.
    pub examples_dir: PathBuf,
    /// Checkout of the sample app pushed to trigger builds.
    pub sample_app_dir: Option<PathBuf>,
    /// Kube config copied for each run. Falls back to the first `KUBECONFIG`
    /// entry, then `~/.kube/config`.
    pub kubeconfig: Option<PathBuf>,
    pub project: Option<String>,
    /// Pinned region; a random entry of `regions` otherwise.
    pub region: Option<String>,
    pub regions: Vec<String>,
    pub nodes: RetryPolicy,
    pub builds: RetryPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            state_root: PathBuf::from("stages"),
            examples_dir: PathBuf::from("../examples"),
            sample_app_dir: None,
            kubeconfig: None,
            project: None,
            region: None,
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            nodes: DEFAULT_NODE_POLICY,
            builds: DEFAULT_BUILD_POLICY,
        }
    }
}

impl HarnessConfig {
    /// Defaults, then the config file, then the environment.
    ///
    /// An explicit `file` must exist; the default file is optional.
    pub fn load(file: Option<&Path>, env: &mut EnvParser) -> HarnessResult<Self> {
        let mut config = Self::default();
        match file {
            Some(path) => config.apply_file(FileConfig::load(path)?)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    config.apply_file(FileConfig::load(default)?)?;
                }
            }
        }
        config.apply_env(env)?;
        config.validate()?;
        tracing::debug!(
            state_root = %config.state_root.display(),
            project = ?config.project,
            region = ?config.region,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig) -> HarnessResult<()> {
        if let Some(v) = file.state_root {
            self.state_root = v;
        }
        if let Some(v) = file.examples_dir {
            self.examples_dir = v;
        }
        if file.sample_app_dir.is_some() {
            self.sample_app_dir = file.sample_app_dir;
        }
        if file.kubeconfig.is_some() {
            self.kubeconfig = file.kubeconfig;
        }
        if file.project.is_some() {
            self.project = file.project;
        }
        if file.region.is_some() {
            self.region = file.region;
        }
        if let Some(v) = file.regions {
            self.regions = v;
        }
        if let Some(nodes) = &file.nodes {
            self.nodes = nodes.apply_to("nodes", self.nodes)?;
        }
        if let Some(builds) = &file.builds {
            self.builds = builds.apply_to("builds", self.builds)?;
        }
        Ok(())
    }

    /// Overlay environment variables; every malformed one is reported.
    pub fn apply_env(&mut self, env: &mut EnvParser) -> HarnessResult<()> {
        if let Some(v) = env.get_optional_path("STATE_ROOT") {
            self.state_root = v;
        }
        if let Some(v) = env.get_optional_path("EXAMPLES_DIR") {
            self.examples_dir = v;
        }
        if let Some(v) = env.get_raw(SAMPLE_APP_DIR_ENV) {
            self.sample_app_dir = Some(expand_tilde(&v));
        }
        if let Some(v) = env.get_optional_path("KUBECONFIG") {
            self.kubeconfig = Some(v);
        }
        if self.kubeconfig.is_none() {
            self.kubeconfig = env
                .get_raw(KUBECONFIG_ENV)
                .and_then(|v| std::env::split_paths(&v).next())
                .filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = env.get_first_raw(PROJECT_ENV_VARS) {
            self.project = Some(v);
        }
        if let Some(v) = env.get_optional_string("REGION") {
            self.region = Some(v);
        }
        if let Some(v) = env.get_optional_list("REGIONS") {
            self.regions = v;
        }
        if let Some(n) = env.get_optional_u32_range("NODE_POLL_ATTEMPTS", 1, 10_000) {
            self.nodes.max_attempts = n;
        }
        if let Some(d) = env.get_optional_duration("NODE_POLL_DELAY") {
            self.nodes.delay = d;
        }
        if let Some(n) = env.get_optional_u32_range("BUILD_POLL_ATTEMPTS", 1, 10_000) {
            self.builds.max_attempts = n;
        }
        if let Some(d) = env.get_optional_duration("BUILD_POLL_DELAY") {
            self.builds.delay = d;
        }

        let errors = env.take_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            ))
        }
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.region.is_none() && self.regions.is_empty() {
            return Err(HarnessError::Config(
                "no region pinned and the region list is empty".into(),
            ));
        }
        Ok(())
    }

    pub fn require_project(&self) -> HarnessResult<&str> {
        self.project.as_deref().ok_or_else(|| {
            HarnessError::Config(format!(
                "no project set; export one of {}",
                PROJECT_ENV_VARS.join(", ")
            ))
        })
    }

    /// Kube config to copy: the configured one, else `~/.kube/config`.
    pub fn kubeconfig_source(&self) -> Option<PathBuf> {
        self.kubeconfig
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".kube").join("config")))
    }

    pub fn require_sample_app_dir(&self) -> HarnessResult<&Path> {
        self.sample_app_dir.as_deref().ok_or_else(|| {
            HarnessError::Config(format!("{SAMPLE_APP_DIR_ENV} is not set"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> EnvParser {
        EnvParser::from_vars(vars.iter().copied())
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.state_root, PathBuf::from("stages"));
        assert_eq!(config.nodes, RetryPolicy::new(30, Duration::from_secs(10)));
        assert_eq!(config.builds, RetryPolicy::new(30, Duration::from_secs(20)));
        assert!(config.require_project().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stagehand.toml");
        std::fs::write(
            &path,
            "project = \"from-file\"\nregion = \"asia-east1\"\n[nodes]\nattempts = 3\n",
        )
        .unwrap();

        let mut parser = env(&[
            ("GCLOUD_PROJECT", "from-env"),
            ("STAGEHAND_NODE_POLL_DELAY", "1s"),
            ("SAMPLE_APP_DIR", "/srv/app"),
        ]);
        let config = HarnessConfig::load(Some(&path), &mut parser).unwrap();
        assert_eq!(config.project.as_deref(), Some("from-env"));
        assert_eq!(config.region.as_deref(), Some("asia-east1"));
        assert_eq!(config.nodes, RetryPolicy::new(3, Duration::from_secs(1)));
        assert_eq!(config.require_sample_app_dir().unwrap(), Path::new("/srv/app"));
    }

    #[test]
    fn test_configured_kubeconfig_wins() {
        let mut config = HarnessConfig::default();
        config
            .apply_env(&mut env(&[("STAGEHAND_KUBECONFIG", "/etc/kube/config")]))
            .unwrap();
        assert_eq!(
            config.kubeconfig_source(),
            Some(PathBuf::from("/etc/kube/config"))
        );
    }

    #[test]
    fn test_kubeconfig_env_fills_only_unset_path() {
        let mut config = HarnessConfig::default();
        config
            .apply_env(&mut env(&[("KUBECONFIG", "/a/config:/b/config")]))
            .unwrap();
        assert_eq!(config.kubeconfig, Some(PathBuf::from("/a/config")));

        let mut config = HarnessConfig::default();
        config
            .apply_env(&mut env(&[
                ("KUBECONFIG", "/a/config"),
                ("STAGEHAND_KUBECONFIG", "/etc/kube/config"),
            ]))
            .unwrap();
        assert_eq!(config.kubeconfig, Some(PathBuf::from("/etc/kube/config")));

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stagehand.toml");
        std::fs::write(&path, "kubeconfig = \"/from/file\"\n").unwrap();
        let config =
            HarnessConfig::load(Some(&path), &mut env(&[("KUBECONFIG", "/a/config")])).unwrap();
        assert_eq!(config.kubeconfig_source(), Some(PathBuf::from("/from/file")));
    }

    #[test]
    fn test_kubeconfig_source_ignores_unparsed_process_env() {
        let mut config = HarnessConfig::default();
        config.apply_env(&mut env(&[])).unwrap();
        assert_eq!(config.kubeconfig, None);
        assert_eq!(
            config.kubeconfig_source(),
            dirs::home_dir().map(|h| h.join(".kube").join("config"))
        );
    }

    #[test]
    fn test_env_errors_are_collected() {
        let mut config = HarnessConfig::default();
        let mut parser = env(&[
            ("STAGEHAND_NODE_POLL_ATTEMPTS", "0"),
            ("STAGEHAND_BUILD_POLL_DELAY", "later"),
        ]);
        let err = config.apply_env(&mut parser).unwrap_err().to_string();
        assert!(err.contains("STAGEHAND_NODE_POLL_ATTEMPTS"));
        assert!(err.contains("STAGEHAND_BUILD_POLL_DELAY"));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let mut parser = env(&[]);
        assert!(HarnessConfig::load(Some(Path::new("/nonexistent.toml")), &mut parser).is_err());
    }

    #[test]
    fn test_empty_region_list_rejected() {
        let mut parser = env(&[("STAGEHAND_REGIONS", "")]);
        let mut config = HarnessConfig::default();
        config.apply_env(&mut parser).unwrap();
        assert!(config.validate().is_err());
    }
}
