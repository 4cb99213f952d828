//! Discovery of `stagehand.toml` in the working directory.
//!
//! These tests change the process working directory, so they run serially.

mod common;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serial_test::serial;
use stagehand_common::config::DEFAULT_CONFIG_FILE;
use stagehand_common::{EnvParser, HarnessConfig};
use tempfile::TempDir;

struct InDir {
    previous: PathBuf,
}

impl InDir {
    fn enter(dir: &TempDir) -> Self {
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        Self { previous }
    }
}

impl Drop for InDir {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.previous);
    }
}

fn no_env() -> EnvParser {
    EnvParser::from_vars(Vec::<(String, String)>::new())
}

#[test]
#[serial]
fn test_default_file_in_working_dir_is_picked_up() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(DEFAULT_CONFIG_FILE),
        "project = \"from-file\"\n\n[builds]\ndelay = \"5s\"\n",
    )
    .unwrap();
    let _cwd = InDir::enter(&dir);

    let config = HarnessConfig::load(None, &mut no_env()).unwrap();
    assert_eq!(config.project.as_deref(), Some("from-file"));
    assert_eq!(config.builds.delay, Duration::from_secs(5));
    assert_eq!(config.builds.max_attempts, 30);
}

#[test]
#[serial]
fn test_missing_default_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let _cwd = InDir::enter(&dir);

    let config = HarnessConfig::load(None, &mut no_env()).unwrap();
    assert_eq!(config, HarnessConfig::default());
}

#[test]
#[serial]
fn test_environment_overrides_default_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "region = \"europe-west1\"\n").unwrap();
    let _cwd = InDir::enter(&dir);

    let mut env = EnvParser::from_vars([("STAGEHAND_REGION", "asia-east1")]);
    let config = HarnessConfig::load(None, &mut env).unwrap();
    assert_eq!(config.region.as_deref(), Some("asia-east1"));
}
