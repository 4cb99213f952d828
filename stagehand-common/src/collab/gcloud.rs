//! gcloud-backed [`BuildQuery`] for Cloud Build.

use serde::Deserialize;

use super::command::{CommandRunner, ProcessCommandRunner, ShellCommand};
use super::{Build, BuildQuery, BuildStatus};
use crate::errors::HarnessResult;

#[derive(Debug, Clone)]
pub struct GcloudBuilds<R = ProcessCommandRunner> {
    runner: R,
    project: String,
}

impl GcloudBuilds<ProcessCommandRunner> {
    pub fn new(project: impl Into<String>) -> Self {
        Self::with_runner(ProcessCommandRunner::new(), project)
    }
}

impl<R: CommandRunner> GcloudBuilds<R> {
    pub fn with_runner(runner: R, project: impl Into<String>) -> Self {
        Self {
            runner,
            project: project.into(),
        }
    }

    fn gcloud(&self) -> ShellCommand {
        ShellCommand::new("gcloud").arg(format!("--project={}", self.project))
    }
}

#[derive(Deserialize)]
struct ApiBuild {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    images: Vec<String>,
}

impl From<ApiBuild> for Build {
    fn from(api: ApiBuild) -> Self {
        Build {
            id: api.id,
            status: BuildStatus::from_api(&api.status),
            images: api.images,
        }
    }
}

impl<R: CommandRunner> BuildQuery for GcloudBuilds<R> {
    fn list_builds_for_trigger(&self, trigger_id: &str) -> HarnessResult<Vec<Build>> {
        let cmd = self
            .gcloud()
            .args(["builds", "list", "--format=json"])
            .arg(format!("--filter=buildTriggerId={trigger_id}"))
            .stdout_only();
        let raw = self.runner.run(&cmd)?;
        let builds: Vec<ApiBuild> = serde_json::from_str(&raw)?;
        Ok(builds.into_iter().map(Build::from).collect())
    }

    fn get_build(&self, id: &str) -> HarnessResult<Build> {
        let cmd = self
            .gcloud()
            .args(["builds", "describe", id, "--format=json"])
            .stdout_only();
        let raw = self.runner.run(&cmd)?;
        let build: ApiBuild = serde_json::from_str(&raw)?;
        Ok(build.into())
    }

    fn delete_image(&self, image: &str) -> HarnessResult<()> {
        let cmd = self.gcloud().args([
            "container",
            "images",
            "delete",
            image,
            "--quiet",
            "--force-delete-tags",
        ]);
        self.runner.run(&cmd)?;
        Ok(())
    }
}
