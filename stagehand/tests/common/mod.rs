#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use stagehand_common::HarnessConfig;
use tempfile::TempDir;

pub const PROJECT: &str = "stagehand-test";
pub const REGION: &str = "us-east1";

#[ctor::ctor]
fn init() {
    stagehand_common::testing::init_test_logging();
}

/// Example templates beside shared modules, a sample app checkout and a kube config in a temp dir,
/// with a configuration pointing at them.
pub struct Workspace {
    pub root: TempDir,
    pub config: HarnessConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let examples = root.path().join("examples");
        for module in ["cloud-build-github-gke", "cloud-build-csr-gke"] {
            let dir = examples.join(module);
            fs::create_dir_all(&dir).expect("Failed to create module dir");
            fs::write(dir.join("main.tf"), "# example module\n").expect("Failed to write main.tf");
        }

        let modules = root.path().join("modules/gke-cluster");
        fs::create_dir_all(&modules).expect("Failed to create modules dir");
        fs::write(modules.join("main.tf"), "# shared module\n").expect("Failed to write module");

        let sample_app = root.path().join("sample-app-docker");
        fs::create_dir_all(&sample_app).expect("Failed to create sample app dir");

        let kubeconfig = root.path().join("kubeconfig");
        fs::write(&kubeconfig, "apiVersion: v1\nkind: Config\n")
            .expect("Failed to write kube config");

        let config = HarnessConfig {
            state_root: root.path().join("stages"),
            examples_dir: examples,
            sample_app_dir: Some(sample_app),
            kubeconfig: Some(kubeconfig),
            project: Some(PROJECT.to_string()),
            region: Some(REGION.to_string()),
            ..HarnessConfig::default()
        };
        Self { root, config }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn sample_app(&self) -> PathBuf {
        self.root.path().join("sample-app-docker")
    }
}

pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected to find '{needle}' in output, got: {haystack}"
    );
}
