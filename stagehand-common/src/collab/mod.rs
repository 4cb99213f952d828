//! External collaborators.
//!
//! Scenarios reach infrastructure, clusters, build services and arbitrary
//! commands only through these traits. Command-line implementations live in
//! the submodules; deterministic fakes live in [`crate::testing`].

pub mod command;
pub mod gcloud;
pub mod kubectl;
pub mod terraform;

pub use command::{CommandRunner, ProcessCommandRunner, ShellCommand};
pub use gcloud::GcloudBuilds;
pub use kubectl::KubectlCli;
pub use terraform::TerraformCli;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::HarnessResult;
use crate::options::{InfraOptions, InfraOutputs};

/// Provision, tear down and query a declarative infrastructure stack.
pub trait Infrastructure {
    fn apply(&self, options: &InfraOptions) -> HarnessResult<InfraOutputs>;
    fn destroy(&self, options: &InfraOptions) -> HarnessResult<()>;
    fn output(&self, options: &InfraOptions, key: &str) -> HarnessResult<String>;
}

/// A cluster node as reported by the cluster API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub ready: bool,
}

impl Node {
    pub fn new(name: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

/// Read access to cluster membership.
pub trait ClusterQuery {
    fn list_nodes(&self) -> HarnessResult<Vec<Node>>;
}

/// Status of a build, collapsed to what the harness distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Queued,
    Working,
    Success,
    /// Any other terminal or unknown status, with the raw name.
    Other(String),
}

impl BuildStatus {
    /// Map a raw status name (`QUEUED`, `WORKING`, `SUCCESS`, ...).
    pub fn from_api(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Self::Queued,
            "WORKING" => Self::Working,
            "SUCCESS" => Self::Success,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Working => write!(f, "WORKING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// One build run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub status: BuildStatus,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Read access to a build service, plus image cleanup.
pub trait BuildQuery {
    /// Builds started by `trigger_id`, most recent first.
    fn list_builds_for_trigger(&self, trigger_id: &str) -> HarnessResult<Vec<Build>>;
    fn get_build(&self, id: &str) -> HarnessResult<Build>;
    /// Delete a pushed container image.
    fn delete_image(&self, image: &str) -> HarnessResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_from_api() {
        assert_eq!(BuildStatus::from_api("QUEUED"), BuildStatus::Queued);
        assert_eq!(BuildStatus::from_api("working"), BuildStatus::Working);
        assert_eq!(BuildStatus::from_api(" SUCCESS "), BuildStatus::Success);
        assert_eq!(
            BuildStatus::from_api("CANCELLED"),
            BuildStatus::Other("CANCELLED".into())
        );
        assert_eq!(BuildStatus::from_api("TIMEOUT").to_string(), "TIMEOUT");
    }
}
