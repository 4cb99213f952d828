//! GKE cluster inputs and the stages the Cloud Build scenarios share.

use std::path::{Path, PathBuf};

use serde::Serialize;
use stagehand_common::collab::ShellCommand;
use stagehand_common::retry::Poller;
use stagehand_common::wait::wait_for_ready_nodes;
use stagehand_common::{HarnessError, HarnessResult, InfraOptions, KubectlOptions, StateStore};
use tracing::info;

use super::ScenarioContext;
use crate::workspace;

pub const UNIQUE_ID_KEY: &str = "uniqueID";
pub const PROJECT_KEY: &str = "project";
pub const REGION_KEY: &str = "region";
pub const BUILD_ID_KEY: &str = "buildID";

/// Nodes a healthy example cluster settles at.
pub const EXPECTED_NODES: usize = 3;

/// File committed to the sample app to start a build.
pub const TRIGGER_FILE: &str = "auto-committed.txt";
pub const TRIGGER_COMMIT_MESSAGE: &str = "triggering a build";

const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Six random base62 characters, unique enough to namespace one run's
/// cloud resources.
pub fn unique_id() -> String {
    (0..6)
        .map(|_| BASE62[fastrand::usize(..BASE62.len())] as char)
        .collect()
}

/// Container registry multi-region for a compute region.
pub fn lookup_multi_region(region: &str) -> &'static str {
    match region.split('-').next().unwrap_or_default() {
        "europe" => "eu",
        "asia" => "asia",
        _ => "us",
    }
}

pub fn cluster_name(id: &str) -> String {
    format!("gke-cluster-{id}").to_lowercase()
}

pub fn service_account_name(id: &str) -> String {
    format!("gke-cluster-sa-{id}").to_lowercase()
}

pub fn repository_name(id: &str) -> String {
    format!("cloud-build-repo-{id}").to_lowercase()
}

/// Inputs of the Cloud Build + GKE examples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GkeClusterVars {
    pub region: String,
    pub location: String,
    pub project: String,
    pub gcr_region: String,
    pub repository_name: String,
    pub cluster_name: String,
    pub cluster_service_account_name: String,
}

impl GkeClusterVars {
    pub fn new(unique_id: &str, project: &str, region: &str) -> Self {
        Self {
            region: region.to_string(),
            location: region.to_string(),
            project: project.to_string(),
            gcr_region: lookup_multi_region(region).to_string(),
            repository_name: repository_name(unique_id),
            cluster_name: cluster_name(unique_id),
            cluster_service_account_name: service_account_name(unique_id),
        }
    }

    pub fn to_infra_options(&self, template_dir: &Path) -> HarnessResult<InfraOptions> {
        InfraOptions::from_record(template_dir, self)
    }
}

/// Cluster inputs plus the GitHub repository whose pushes trigger builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GkeGithubVars {
    #[serde(flatten)]
    pub cluster: GkeClusterVars,
    pub github_owner: String,
    pub github_repository: String,
}

impl GkeGithubVars {
    pub fn to_infra_options(&self, template_dir: &Path) -> HarnessResult<InfraOptions> {
        InfraOptions::from_record(template_dir, self)
    }
}

/// Identity of one run, fixed when its options are created.
#[derive(Debug, Clone)]
pub struct RunIdentity {
    pub unique_id: String,
    pub project: String,
    pub region: String,
}

// Stage bodies shared by the Cloud Build scenarios.

/// Copy the example templates and record where `module` landed.
pub fn create_test_copy(
    store: &StateStore,
    ctx: ScenarioContext<'_>,
    module: &str,
    module_key: &str,
) -> HarnessResult<()> {
    let copy = workspace::copy_examples_to_temp(&ctx.config.examples_dir)?;
    let module_path = copy.join(module);
    info!(path = %module_path.display(), "Path to test folder");
    store.save_string(module_key, &module_path.display().to_string())
}

/// Pick the run identity, build the infrastructure options with
/// `make_options` and persist everything later stages need.
pub fn create_options<F>(
    store: &StateStore,
    ctx: ScenarioContext<'_>,
    module_key: &str,
    make_options: F,
) -> HarnessResult<()>
where
    F: FnOnce(&RunIdentity, &Path) -> HarnessResult<InfraOptions>,
{
    let module_path = PathBuf::from(store.load_string(module_key)?);
    let identity = RunIdentity {
        unique_id: unique_id(),
        project: ctx.config.require_project()?.to_string(),
        region: pick_region(ctx)?,
    };
    let kube_config =
        workspace::copy_kube_config_to_temp(ctx.config.kubeconfig_source().as_deref())?;
    let options = make_options(&identity, &module_path)?;
    info!(
        unique_id = %identity.unique_id,
        project = %identity.project,
        region = %identity.region,
        "Created run options"
    );

    store.save_string(UNIQUE_ID_KEY, &identity.unique_id)?;
    store.save_string(PROJECT_KEY, &identity.project)?;
    store.save_string(REGION_KEY, &identity.region)?;
    store.save_infra_options(&options)?;
    store.save_kubectl_options(&KubectlOptions::new(kube_config))
}

fn pick_region(ctx: ScenarioContext<'_>) -> HarnessResult<String> {
    if let Some(region) = &ctx.config.region {
        return Ok(region.clone());
    }
    let regions = &ctx.config.regions;
    if regions.is_empty() {
        return Err(HarnessError::Config("no regions to choose from".into()));
    }
    Ok(regions[fastrand::usize(..regions.len())].clone())
}

pub fn terraform_apply(store: &StateStore, ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    let options = store.load_infra_options()?;
    let outputs = ctx.tools.infrastructure().apply(&options)?;
    info!(outputs = outputs.len(), "Infrastructure applied");
    Ok(())
}

/// Fetch cluster credentials into the run's kube config.
pub fn configure_kubectl(store: &StateStore, ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    let options = store.load_infra_options()?;
    let kubectl = store.load_kubectl_options()?;
    let project = store.load_string(PROJECT_KEY)?;
    let region = store.load_string(REGION_KEY)?;
    let cluster = options
        .var_str("cluster_name")
        .ok_or_else(|| HarnessError::assertion("infrastructure options have no cluster_name"))?;

    let cmd = ShellCommand::new("gcloud")
        .args(["beta", "container", "clusters", "get-credentials", cluster])
        .args(["--region", region.as_str(), "--project", project.as_str()])
        .env("KUBECONFIG", kubectl.config_path.display().to_string());
    ctx.tools.commands().run(&cmd)?;
    Ok(())
}

pub fn wait_for_workers(store: &StateStore, ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    let kubectl = store.load_kubectl_options()?;
    let cluster = ctx.tools.cluster(&kubectl);
    let poller = Poller::new(ctx.config.nodes, ctx.tools.sleeper());
    wait_for_ready_nodes(cluster.as_ref(), EXPECTED_NODES, &poller)?;

    // Every registered node must be ready, not just the expected count.
    let nodes = cluster.list_nodes()?;
    let not_ready: Vec<&str> = nodes
        .iter()
        .filter(|n| !n.is_ready())
        .map(|n| n.name.as_str())
        .collect();
    if !not_ready.is_empty() {
        return Err(HarnessError::assertion(format!(
            "{} of {} registered nodes not ready: {}",
            not_ready.len(),
            nodes.len(),
            not_ready.join(", ")
        )));
    }
    Ok(())
}

/// Write a timestamped file into the sample app; returns its path.
pub fn write_trigger_file(sample_app: &Path) -> HarnessResult<PathBuf> {
    let path = sample_app.join(TRIGGER_FILE);
    std::fs::write(&path, format!("{}\n", chrono::Local::now()))?;
    Ok(path)
}

/// `git-add-commit-push` invocation for the trigger file.
///
/// With a remote, pushes there without pulling first.
pub fn commit_and_push(sample_app: &Path, file: &Path, remote: Option<&str>) -> ShellCommand {
    let mut cmd = ShellCommand::new("git-add-commit-push").current_dir(sample_app);
    if let Some(remote) = remote {
        cmd = cmd.args(["--remote-name", remote]);
    }
    cmd = cmd
        .arg("--path")
        .arg(file.display().to_string())
        .args(["--message", TRIGGER_COMMIT_MESSAGE]);
    if remote.is_some() {
        cmd = cmd.arg("--skip-git-pull");
    }
    cmd.args(["--skip-ci-flag", ""])
}

/// Tear down the cluster and the run's kube config.
pub fn destroy_cluster(store: &StateStore, ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    let options = store.load_infra_options()?;
    ctx.tools.infrastructure().destroy(&options)?;
    let kubectl = store.load_kubectl_options()?;
    workspace::remove_file_if_present(&kubectl.config_path)
}
