//! Run-scoped state store.
//!
//! Values written by one stage are read by later stages, possibly in a
//! later process invocation of the same run. Each entry is one JSON file
//! under `<run dir>/state/`, written atomically so a crash after
//! [`StateStore::save`] returns never leaves a torn entry behind.

use crate::errors::{HarnessError, HarnessResult};
use crate::options::{InfraOptions, KubectlOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const STATE_DIR: &str = "state";
const ENTRY_EXT: &str = "json";

/// Key under which scenarios store their infrastructure option bag.
pub const INFRA_OPTIONS_KEY: &str = "InfraOptions";
/// Key under which scenarios store their cluster access options.
pub const KUBECTL_OPTIONS_KEY: &str = "KubectlOptions";

/// Identifies one logical run; all of its state lives under `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    scenario: String,
    dir: PathBuf,
}

impl RunContext {
    /// Run context for `scenario`, filed under `state_root/<scenario>`.
    pub fn new(state_root: impl AsRef<Path>, scenario: impl Into<String>) -> Self {
        let scenario = scenario.into();
        let dir = state_root.as_ref().join(&scenario);
        Self { scenario, dir }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Working directory of the run.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Durable key/value storage for one [`RunContext`].
#[derive(Debug, Clone)]
pub struct StateStore {
    run: RunContext,
}

impl StateStore {
    pub fn new(run: RunContext) -> Self {
        Self { run }
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    fn state_dir(&self) -> PathBuf {
        self.run.dir.join(STATE_DIR)
    }

    fn entry_path(&self, key: &str) -> HarnessResult<PathBuf> {
        validate_key(key)?;
        Ok(self.state_dir().join(format!("{key}.{ENTRY_EXT}")))
    }

    /// Serialize `value` under `key`, replacing any previous value.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> HarnessResult<()> {
        let path = self.entry_path(key)?;
        let content = serde_json::to_vec_pretty(value)?;
        fs::create_dir_all(self.state_dir())?;
        atomic_write(&path, &content)?;
        debug!(run = %self.run.dir.display(), key, bytes = content.len(), "Saved state entry");
        Ok(())
    }

    /// Load and deserialize the value stored under `key`.
    ///
    /// A missing entry is always [`HarnessError::StateNotFound`].
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> HarnessResult<T> {
        let path = self.entry_path(key)?;
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarnessError::StateNotFound {
                    run: self.run.dir.clone(),
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_slice(&content)?;
        debug!(run = %self.run.dir.display(), key, "Loaded state entry");
        Ok(value)
    }

    pub fn save_string(&self, key: &str, value: &str) -> HarnessResult<()> {
        self.save(key, value)
    }

    pub fn load_string(&self, key: &str) -> HarnessResult<String> {
        self.load(key)
    }

    pub fn save_infra_options(&self, options: &InfraOptions) -> HarnessResult<()> {
        self.save(INFRA_OPTIONS_KEY, options)
    }

    pub fn load_infra_options(&self) -> HarnessResult<InfraOptions> {
        self.load(INFRA_OPTIONS_KEY)
    }

    pub fn save_kubectl_options(&self, options: &KubectlOptions) -> HarnessResult<()> {
        self.save(KUBECTL_OPTIONS_KEY, options)
    }

    pub fn load_kubectl_options(&self) -> HarnessResult<KubectlOptions> {
        self.load(KUBECTL_OPTIONS_KEY)
    }

    /// Whether an entry exists for `key`.
    pub fn contains(&self, key: &str) -> HarnessResult<bool> {
        Ok(self.entry_path(key)?.is_file())
    }

    /// Keys with a stored entry, sorted.
    pub fn keys(&self) -> HarnessResult<Vec<String>> {
        let dir = self.state_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && validate_key(stem).is_ok()
            {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Remove one entry. Removing a missing entry is not an error.
    pub fn remove(&self, key: &str) -> HarnessResult<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the whole run directory, state and report included.
    pub fn clear(&self) -> HarnessResult<()> {
        match fs::remove_dir_all(&self.run.dir) {
            Ok(()) => {
                debug!(run = %self.run.dir.display(), "Cleared run directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> HarnessResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(HarnessError::InvalidStateKey(key.to_string()))
    }
}

/// Writes content to a file atomically using a temporary file.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> HarnessResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    sync_dir(parent)
}

/// Flush directory metadata so a completed rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> HarnessResult<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

// Directories cannot be opened as files here; the rename is as durable as
// the platform makes it.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> HarnessResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> StateStore {
        StateStore::new(RunContext::new(tmp.path(), "TestScenario"))
    }

    #[test]
    fn test_run_context_dir_derives_from_scenario() {
        let ctx = RunContext::new("stages", "TestCloudBuildGitHubGke");
        assert_eq!(ctx.dir(), Path::new("stages/TestCloudBuildGitHubGke"));
        assert_eq!(ctx.scenario(), "TestCloudBuildGitHubGke");
    }

    #[test]
    fn test_string_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.save_string("uniqueID", "a1B2c3").unwrap();
        assert_eq!(store.load_string("uniqueID").unwrap(), "a1B2c3");
    }

    #[test]
    fn test_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.save_string("region", "us-east1").unwrap();
        store.save_string("region", "asia-east1").unwrap();
        assert_eq!(store.load_string("region").unwrap(), "asia-east1");
    }

    #[test]
    fn test_missing_key_is_state_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).load_string("buildID").unwrap_err();
        match err {
            HarnessError::StateNotFound { key, run } => {
                assert_eq!(key, "buildID");
                assert!(run.ends_with("TestScenario"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_visible_from_second_store_instance() {
        let tmp = TempDir::new().unwrap();
        store(&tmp).save_string("project", "demo-project").unwrap();
        // a fresh store over the same run context stands in for a new process
        let reopened = StateStore::new(RunContext::new(tmp.path(), "TestScenario"));
        assert_eq!(reopened.load_string("project").unwrap(), "demo-project");
    }

    #[test]
    fn test_runs_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let a = StateStore::new(RunContext::new(tmp.path(), "A"));
        let b = StateStore::new(RunContext::new(tmp.path(), "B"));
        a.save_string("uniqueID", "aaa").unwrap();
        assert!(matches!(
            b.load_string("uniqueID"),
            Err(HarnessError::StateNotFound { .. })
        ));
    }

    #[test]
    fn test_option_bags_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let infra = InfraOptions::new("/tmp/examples/cloud-build-github-gke")
            .with_var("cluster_name", "gke-cluster-abc123")
            .with_var(
                "client_tls_subject",
                serde_json::json!({"common_name": "helm", "org": "Gruntwork"}),
            );
        let kubectl = KubectlOptions::new("/tmp/kubeconfig-123");

        store.save_infra_options(&infra).unwrap();
        store.save_kubectl_options(&kubectl).unwrap();

        assert_eq!(store.load_infra_options().unwrap(), infra);
        assert_eq!(store.load_kubectl_options().unwrap(), kubectl);
    }

    #[test]
    fn test_structured_value_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Endpoint {
            host: String,
            port: u16,
        }
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let value = Endpoint {
            host: "10.0.0.1".into(),
            port: 443,
        };
        store.save("endpoint", &value).unwrap();
        assert_eq!(store.load::<Endpoint>("endpoint").unwrap(), value);
    }

    #[test]
    fn test_type_mismatch_is_serialization_error() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.save_string("count", "three").unwrap();
        assert!(matches!(
            store.load::<u32>("count"),
            Err(HarnessError::Serialization(_))
        ));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        for key in ["", "../escape", "a/b", ".hidden", "with space"] {
            assert!(
                matches!(store.save_string(key, "x"), Err(HarnessError::InvalidStateKey(_))),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_keys_contains_remove_clear() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        assert!(store.keys().unwrap().is_empty());

        store.save_string("region", "us-east1").unwrap();
        store.save_string("project", "p").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["project", "region"]);
        assert!(store.contains("region").unwrap());

        store.remove("region").unwrap();
        store.remove("region").unwrap();
        assert!(!store.contains("region").unwrap());

        store.clear().unwrap();
        assert!(!store.run().dir().exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        for i in 0..5 {
            store.save_string("counter", &i.to_string()).unwrap();
        }
        let leftovers: Vec<_> = fs::read_dir(store.state_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_atomic_write_syncs_into_existing_dir_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("entry.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        sync_dir(tmp.path()).unwrap();

        let missing = tmp.path().join("absent").join("entry.json");
        assert!(atomic_write(&missing, b"{}").is_err());
        assert!(!tmp.path().join("absent").exists());
    }
}
