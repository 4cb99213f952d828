//! The set of collaborators a scenario runs against.

use stagehand_common::collab::{
    BuildQuery, ClusterQuery, CommandRunner, GcloudBuilds, Infrastructure, KubectlCli,
    ProcessCommandRunner, TerraformCli,
};
use stagehand_common::retry::{RecordingSleeper, Sleeper, ThreadSleeper};
use stagehand_common::testing::{
    RecordingCommandRunner, RecordingInfrastructure, ScriptedBuildSource, ScriptedNodeSource,
};
use stagehand_common::KubectlOptions;

/// Hands out collaborators to stage bodies.
///
/// Cluster and build access depend on values only known mid-run (the kube
/// config path, the project), so those are built on demand.
pub trait Toolbox {
    fn infrastructure(&self) -> &dyn Infrastructure;
    fn cluster(&self, options: &KubectlOptions) -> Box<dyn ClusterQuery + '_>;
    fn builds(&self, project: &str) -> Box<dyn BuildQuery + '_>;
    fn commands(&self) -> &dyn CommandRunner;
    fn sleeper(&self) -> &dyn Sleeper;
}

/// terraform, kubectl, gcloud and friends on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct CliToolbox {
    runner: ProcessCommandRunner,
    terraform: TerraformCli,
    sleeper: ThreadSleeper,
}

impl CliToolbox {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Toolbox for CliToolbox {
    fn infrastructure(&self) -> &dyn Infrastructure {
        &self.terraform
    }

    fn cluster(&self, options: &KubectlOptions) -> Box<dyn ClusterQuery + '_> {
        Box::new(KubectlCli::with_runner(self.runner.clone(), options.clone()))
    }

    fn builds(&self, project: &str) -> Box<dyn BuildQuery + '_> {
        Box::new(GcloudBuilds::with_runner(self.runner.clone(), project))
    }

    fn commands(&self) -> &dyn CommandRunner {
        &self.runner
    }

    fn sleeper(&self) -> &dyn Sleeper {
        &self.sleeper
    }
}

/// In-memory collaborators; clones of the fields observe the same calls.
#[derive(Debug, Clone)]
pub struct FakeToolbox {
    pub infra: RecordingInfrastructure,
    pub nodes: ScriptedNodeSource,
    pub builds: ScriptedBuildSource,
    pub commands: RecordingCommandRunner,
    pub sleeper: RecordingSleeper,
}

impl FakeToolbox {
    /// A healthy cloud: three ready nodes, one successful build and a
    /// `trigger_id` output.
    pub fn healthy() -> Self {
        Self {
            infra: RecordingInfrastructure::new().with_output("trigger_id", "trigger-1"),
            nodes: ScriptedNodeSource::ready_counts([3]),
            builds: ScriptedBuildSource::for_build(
                "build-1",
                [stagehand_common::collab::BuildStatus::Success],
            ),
            commands: RecordingCommandRunner::new(),
            sleeper: RecordingSleeper::new(),
        }
    }
}

impl Toolbox for FakeToolbox {
    fn infrastructure(&self) -> &dyn Infrastructure {
        &self.infra
    }

    fn cluster(&self, _options: &KubectlOptions) -> Box<dyn ClusterQuery + '_> {
        Box::new(self.nodes.clone())
    }

    fn builds(&self, _project: &str) -> Box<dyn BuildQuery + '_> {
        Box::new(self.builds.clone())
    }

    fn commands(&self) -> &dyn CommandRunner {
        &self.commands
    }

    fn sleeper(&self) -> &dyn Sleeper {
        &self.sleeper
    }
}
