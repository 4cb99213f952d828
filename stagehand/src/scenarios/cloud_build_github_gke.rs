//! Cloud Build triggered from GitHub, deploying to GKE.
//!
//! Provisions the example, pushes a commit to the sample app, waits for the
//! triggered build to succeed, then removes the pushed images along with the
//! infrastructure.

use stagehand_common::retry::Poller;
use stagehand_common::wait::wait_for_successful_build;
use stagehand_common::{HarnessResult, StageRunner, StateStore};
use tracing::info;

use super::gke::{self, BUILD_ID_KEY, GkeClusterVars, GkeGithubVars, PROJECT_KEY};
use super::{
    CLEANUP, CONFIGURE_KUBECTL, CREATE_OPTIONS, CREATE_TEST_COPY, Scenario, ScenarioContext,
    StageInfo, TERRAFORM_APPLY, TRIGGER_BUILD, WAIT_FOR_BUILD, WAIT_FOR_WORKERS,
};

pub const MODULE: &str = "cloud-build-github-gke";
pub const MODULE_PATH_KEY: &str = "cloudBuildGitHubGkeTerraformModulePath";
pub const GITHUB_OWNER: &str = "gruntwork-io";
pub const GITHUB_REPOSITORY: &str = "sample-app-docker";
/// Output naming the build trigger created by the example.
pub const TRIGGER_ID_OUTPUT: &str = "trigger_id";

const STAGES: &[StageInfo] = &[
    StageInfo::stage(CREATE_TEST_COPY),
    StageInfo::stage(CREATE_OPTIONS),
    StageInfo::deferred(CLEANUP),
    StageInfo::stage(TERRAFORM_APPLY),
    StageInfo::stage(CONFIGURE_KUBECTL),
    StageInfo::stage(WAIT_FOR_WORKERS),
    StageInfo::stage(TRIGGER_BUILD),
    StageInfo::stage(WAIT_FOR_BUILD),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct CloudBuildGitHubGke;

impl Scenario for CloudBuildGitHubGke {
    fn name(&self) -> &'static str {
        "CloudBuildGitHubGke"
    }

    fn description(&self) -> &'static str {
        "GKE cluster with a Cloud Build trigger on a GitHub repository"
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
                GkeGithubVars {
                    cluster: GkeClusterVars::new(&id.unique_id, &id.project, &id.region),
                    github_owner: GITHUB_OWNER.to_string(),
                    github_repository: GITHUB_REPOSITORY.to_string(),
                }
                .to_infra_options(module)
            })
        });
        runner.defer_stage(CLEANUP, move |store| cleanup(store, ctx));
        runner.run_stage(TERRAFORM_APPLY, |store| gke::terraform_apply(store, ctx));
        runner.run_stage(CONFIGURE_KUBECTL, |store| gke::configure_kubectl(store, ctx));
        runner.run_stage(WAIT_FOR_WORKERS, |store| gke::wait_for_workers(store, ctx));
        runner.run_stage(TRIGGER_BUILD, |_| trigger_build(ctx));
        runner.run_stage(WAIT_FOR_BUILD, |store| wait_for_build(store, ctx));
    }
}

fn trigger_build(ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    let sample_app = ctx.config.require_sample_app_dir()?;
    let file = gke::write_trigger_file(sample_app)?;
    let cmd = gke::commit_and_push(sample_app, &file, Some("origin"));
    ctx.tools.commands().run(&cmd)?;
    Ok(())
}

fn wait_for_build(store: &StateStore, ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    let options = store.load_infra_options()?;
    let trigger_id = ctx
        .tools
        .infrastructure()
        .output(&options, TRIGGER_ID_OUTPUT)?;
    let project = store.load_string(PROJECT_KEY)?;
    let builds = ctx.tools.builds(&project);
    let poller = Poller::new(ctx.config.builds, ctx.tools.sleeper());
    let build_id = wait_for_successful_build(builds.as_ref(), &trigger_id, &poller)?;
    store.save_string(BUILD_ID_KEY, &build_id)
}

/// Delete the images of the recorded build (if any), then the cluster.
fn cleanup(store: &StateStore, ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    if store.contains(BUILD_ID_KEY)? {
        let project = store.load_string(PROJECT_KEY)?;
        let build_id = store.load_string(BUILD_ID_KEY)?;
        let builds = ctx.tools.builds(&project);
        let build = builds.get_build(&build_id)?;
        for image in &build.images {
            info!(image = %image, "Deleting build image");
            builds.delete_image(image)?;
        }
    } else {
        info!("No build recorded; skipping image cleanup");
    }
    gke::destroy_cluster(store, ctx)
}
