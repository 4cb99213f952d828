#![allow(dead_code)]

use stagehand_common::{RunContext, StateStore};
use tempfile::TempDir;

#[ctor::ctor]
fn init() {
    stagehand_common::testing::init_test_logging();
}

/// A throwaway state root; stores for any scenario live underneath it.
pub struct TestRoot {
    pub dir: TempDir,
}

impl TestRoot {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn store(&self, scenario: &str) -> StateStore {
        StateStore::new(RunContext::new(self.dir.path(), scenario))
    }
}
