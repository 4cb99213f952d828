//! Runs the gcloud installer helper shipped next to the examples.

use std::path::{Path, PathBuf};

use stagehand_common::collab::ShellCommand;
use stagehand_common::{HarnessConfig, HarnessResult, StageRunner};
use tracing::info;

use super::{Scenario, ScenarioContext, StageInfo};

pub const INSTALL_STAGE: &str = "install_gcloud";

const STAGES: &[StageInfo] = &[StageInfo::stage(INSTALL_STAGE)];

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallGcloud;

/// `<examples>/../modules/gcp-helpers/bin/install-gcloud`.
pub fn installer_path(config: &HarnessConfig) -> PathBuf {
    config
        .examples_dir
        .parent()
        .unwrap_or(Path::new("."))
        .join("modules")
        .join("gcp-helpers")
        .join("bin")
        .join("install-gcloud")
}

impl Scenario for InstallGcloud {
    fn name(&self) -> &'static str {
        "InstallGcloud"
    }

    fn description(&self) -> &'static str {
        "Install the gcloud SDK with the bundled helper script"
    }

    fn stages(&self) -> &'static [StageInfo] {
        STAGES
    }

    fn run<'a>(&self, runner: &mut StageRunner<'a>, ctx: ScenarioContext<'a>) {
        runner.run_stage(INSTALL_STAGE, |_| install(ctx));
    }
}

fn install(ctx: ScenarioContext<'_>) -> HarnessResult<()> {
    let script = installer_path(ctx.config);
    let output = ctx
        .tools
        .commands()
        .run(&ShellCommand::new(script.display().to_string()))?;
    info!(script = %script.display(), output_bytes = output.len(), "gcloud installed");
    Ok(())
}
