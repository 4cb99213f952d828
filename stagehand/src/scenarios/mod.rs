//! Scenario definitions and the registry the CLI picks from.

pub mod cloud_build_csr_gke;
pub mod cloud_build_github_gke;
pub mod gke;
pub mod install_gcloud;

pub use cloud_build_csr_gke::CloudBuildCsrGke;
pub use cloud_build_github_gke::CloudBuildGitHubGke;
pub use install_gcloud::InstallGcloud;

use serde::Serialize;
use stagehand_common::{
    HarnessConfig, RunContext, ScenarioReport, SkipSignalSource, StageRunner, StateStore,
};

use crate::toolbox::Toolbox;

pub const CREATE_TEST_COPY: &str = "create_test_copy_of_examples";
pub const CREATE_OPTIONS: &str = "create_terratest_options";
pub const CLEANUP: &str = "cleanup";
pub const TERRAFORM_APPLY: &str = "terraform_apply";
pub const CONFIGURE_KUBECTL: &str = "configure_kubectl";
pub const WAIT_FOR_WORKERS: &str = "wait_for_workers";
pub const TRIGGER_BUILD: &str = "trigger_build";
pub const WAIT_FOR_BUILD: &str = "wait_for_build";

/// A stage as listed by `stagehand list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageInfo {
    pub name: &'static str,
    pub deferred: bool,
}

impl StageInfo {
    pub const fn stage(name: &'static str) -> Self {
        Self {
            name,
            deferred: false,
        }
    }

    pub const fn deferred(name: &'static str) -> Self {
        Self {
            name,
            deferred: true,
        }
    }
}

/// What stage bodies may reach: configuration and collaborators.
#[derive(Clone, Copy)]
pub struct ScenarioContext<'a> {
    pub config: &'a HarnessConfig,
    pub tools: &'a dyn Toolbox,
}

impl<'a> ScenarioContext<'a> {
    pub fn new(config: &'a HarnessConfig, tools: &'a dyn Toolbox) -> Self {
        Self { config, tools }
    }
}

pub trait Scenario {
    /// Also the run directory name under the state root.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Stages in registration order.
    fn stages(&self) -> &'static [StageInfo];

    /// Register and run every stage on `runner`.
    fn run<'a>(&self, runner: &mut StageRunner<'a>, ctx: ScenarioContext<'a>);
}

pub fn all() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(CloudBuildGitHubGke),
        Box::new(CloudBuildCsrGke),
        Box::new(InstallGcloud),
    ]
}

/// Case-insensitive lookup by name.
pub fn find(name: &str) -> Option<Box<dyn Scenario>> {
    all()
        .into_iter()
        .find(|s| s.name().eq_ignore_ascii_case(name))
}

pub fn store_for(scenario: &dyn Scenario, config: &HarnessConfig) -> StateStore {
    StateStore::new(RunContext::new(&config.state_root, scenario.name()))
}

/// One invocation of `scenario`; deferred stages have run when this returns.
pub fn run_scenario<'a>(
    scenario: &dyn Scenario,
    ctx: ScenarioContext<'a>,
    skip: impl SkipSignalSource + 'a,
) -> ScenarioReport {
    let mut runner = StageRunner::new(store_for(scenario, ctx.config), skip);
    scenario.run(&mut runner, ctx);
    runner.finish()
}
