//! Cloud Build triggered from a Cloud Source Repository, deploying to GKE.

use stagehand_common::collab::ShellCommand;
use stagehand_common::{HarnessError, HarnessResult, StageRunner, StateStore};

use super::gke::{self, GkeClusterVars, PROJECT_KEY};
use super::{
    CLEANUP, CONFIGURE_KUBECTL, CREATE_OPTIONS, CREATE_TEST_COPY, Scenario, ScenarioContext,
    StageInfo, TERRAFORM_APPLY, TRIGGER_BUILD, WAIT_FOR_WORKERS,
};

pub const MODULE: &str = "cloud-build-csr-gke";
pub const MODULE_PATH_KEY: &str = "cloudBuildCsrGkeTerraformModulePath";
pub const REMOTE_NAME: &str = "google";

const STAGES: &[StageInfo] = &[
    StageInfo::stage(CREATE_TEST_COPY),
    StageInfo::stage(CREATE_OPTIONS),
    StageInfo::deferred(CLEANUP),
    StageInfo::stage(TERRAFORM_APPLY),
    StageInfo::stage(CONFIGURE_KUBECTL),
    StageInfo::stage(WAIT_FOR_WORKERS),
    StageInfo::stage(TRIGGER_BUILD),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct CloudBuildCsrGke;

impl Scenario for CloudBuildCsrGke {
    fn name(&self) -> &'static str {
        "CloudBuildCsrGke"
    }

    fn description(&self) -> &'static str {
        "GKE cluster with a Cloud Build trigger on a Cloud Source Repository"
    }

    fn stages(&self) -> &'static [StageInfo] {
        STAGES
    }

    fn run<'a>(&self, runner: &mut StageRunner<'a>, ctx: ScenarioContext<'a>) {
        runner.run_stage(CREATE_TEST_COPY, |store| {
            gke::create_test_copy(store, ctx, MODULE, MODULE_PATH_KEY)
        });
        runner.run_stage(CREATE_OPTIONS, |store| {
            gke::create_options(store, ctx, MODULE_PATH_KEY, |id, module| {
                GkeClusterVars::new(&id.unique_id, &id.project, &id.region)
                    .to_infra_options(module)
            })
        });
        runner.defer_stage(CLEANUP, move |store| gke::destroy_cluster(store, ctx));
        runner.run_stage(TERRAFORM_APPLY, |store| gke::terraform_apply(store, ctx));
        runner.run_stage(CONFIGURE_KUBECTL, |store| gke::configure_kubectl(store, ctx));
        runner.run_stage(WAIT_FOR_WORKERS, |store| gke::wait_for_workers(store, ctx));
        runner.run_stage(TRIGGER_BUILD, |store| trigger_build(store, ctx));
    }
}

/// Source Repositories URL for `repo` in `project`.
pub fn source_repo_url(project: &str, repo: &str) -> String {
    format!("https://source.developers.google.com/p/{project}/r/{repo}")
}

fn trigger_build(store: &StateStore, ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    let options = store.load_infra_options()?;
    let project = store.load_string(PROJECT_KEY)?;
    let repo = options
        .var_str("repository_name")
        .ok_or_else(|| HarnessError::assertion("infrastructure options have no repository_name"))?;
    let sample_app = ctx.config.require_sample_app_dir()?;

    let add_remote = ShellCommand::new("git")
        .args(["remote", "add", REMOTE_NAME])
        .arg(source_repo_url(&project, repo))
        .current_dir(sample_app);
    ctx.tools.commands().run(&add_remote)?;

    let file = gke::write_trigger_file(sample_app)?;
    ctx.tools
        .commands()
        .run(&gke::commit_and_push(sample_app, &file, None))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_repo_url() {
        assert_eq!(
            source_repo_url("demo", "cloud-build-repo-abc"),
            "https://source.developers.google.com/p/demo/r/cloud-build-repo-abc"
        );
    }
}
