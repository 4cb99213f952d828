//! Command-line surface.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use stagehand_common::report::REPORT_FILE;
use stagehand_common::{
    AnySkipSignal, EnvParser, EnvSkipSignals, HarnessConfig, StaticSkipSignals,
};

use crate::scenarios::{self, Scenario, ScenarioContext};
use crate::toolbox::Toolbox;

#[derive(Debug, Parser)]
#[command(
    name = "stagehand",
    version,
    about = "Run staged, resumable end-to-end validation scenarios"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ./stagehand.toml when present)
    #[arg(long, global = true, env = "STAGEHAND_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List scenarios and their stages
    List {
        #[arg(long)]
        json: bool,
    },

    /// Run one scenario
    ///
    /// Stages can be skipped with --skip or by exporting SKIP_<stage> with
    /// any non-empty value.
    Run {
        scenario: String,

        /// Stage to skip (repeatable)
        #[arg(long = "skip", value_name = "STAGE")]
        skip: Vec<String>,

        /// Parent directory of run state (overrides configuration)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or reset stored run state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum StateAction {
    /// Print stored entries of a scenario's run
    Show {
        scenario: String,
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
    /// Delete a scenario's run directory
    Clear {
        scenario: String,
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}

/// Whether the command succeeded; decides the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Load configuration from `cli.config` and the process environment.
pub fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    HarnessConfig::load(cli.config.as_deref(), &mut EnvParser::new())
        .context("failed to load configuration")
}

/// Run `cli` against `tools`, writing user-facing output to `out`.
pub fn execute(
    cli: &Cli,
    config: HarnessConfig,
    tools: &dyn Toolbox,
    env_skips: EnvSkipSignals,
    out: &mut dyn Write,
) -> Result<Outcome> {
    match &cli.command {
        Commands::List { json } => {
            list(*json, out)?;
            Ok(Outcome::Success)
        }
        Commands::Run {
            scenario,
            skip,
            state_dir,
            json,
        } => {
            let scenario = lookup(scenario)?;
            let config = with_state_dir(config, state_dir.as_ref());
            check_stage_names(scenario.as_ref(), skip)?;
            let skips = AnySkipSignal::new()
                .with(env_skips)
                .with(StaticSkipSignals::new(skip.iter().cloned()));
            let report = scenarios::run_scenario(
                scenario.as_ref(),
                ScenarioContext::new(&config, tools),
                skips,
            );
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                write!(out, "{report}")?;
            }
            Ok(if report.is_success() {
                Outcome::Success
            } else {
                Outcome::Failure
            })
        }
        Commands::State { action } => {
            match action {
                StateAction::Show {
                    scenario,
                    state_dir,
                } => {
                    let scenario = lookup(scenario)?;
                    let config = with_state_dir(config, state_dir.as_ref());
                    show_state(scenario.as_ref(), &config, out)?;
                }
                StateAction::Clear {
                    scenario,
                    state_dir,
                } => {
                    let scenario = lookup(scenario)?;
                    let config = with_state_dir(config, state_dir.as_ref());
                    let store = scenarios::store_for(scenario.as_ref(), &config);
                    store.clear()?;
                    writeln!(out, "Cleared {}", store.run().dir().display())?;
                }
            }
            Ok(Outcome::Success)
        }
    }
}

fn lookup(name: &str) -> Result<Box<dyn Scenario>> {
    match scenarios::find(name) {
        Some(s) => Ok(s),
        None => {
            let known: Vec<_> = scenarios::all().iter().map(|s| s.name()).collect();
            bail!("unknown scenario '{name}' (known: {})", known.join(", "))
        }
    }
}

fn with_state_dir(mut config: HarnessConfig, state_dir: Option<&PathBuf>) -> HarnessConfig {
    if let Some(dir) = state_dir {
        config.state_root = dir.clone();
    }
    config
}

fn check_stage_names(scenario: &dyn Scenario, skips: &[String]) -> Result<()> {
    for name in skips {
        if !scenario.stages().iter().any(|s| s.name == name.as_str()) {
            bail!(
                "scenario {} has no stage '{name}'",
                scenario.name()
            );
        }
    }
    Ok(())
}

fn list(json: bool, out: &mut dyn Write) -> Result<()> {
    let scenarios = scenarios::all();
    if json {
        let listing: Vec<_> = scenarios
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name(),
                    "description": s.description(),
                    "stages": s.stages(),
                })
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&listing)?)?;
        return Ok(());
    }
    for scenario in &scenarios {
        writeln!(out, "{}  {}", scenario.name(), scenario.description())?;
        for stage in scenario.stages() {
            let marker = if stage.deferred { " (deferred)" } else { "" };
            writeln!(out, "    {}{marker}", stage.name)?;
        }
    }
    Ok(())
}

fn show_state(scenario: &dyn Scenario, config: &HarnessConfig, out: &mut dyn Write) -> Result<()> {
    let store = scenarios::store_for(scenario, config);
    let keys = store.keys()?;
    writeln!(out, "Run directory: {}", store.run().dir().display())?;
    if keys.is_empty() {
        writeln!(out, "  (no state)")?;
    }
    for key in keys {
        let value: serde_json::Value = store
            .load(&key)
            .with_context(|| format!("failed to read state entry '{key}'"))?;
        writeln!(out, "  {key} = {value}")?;
    }
    let report = store.run().dir().join(REPORT_FILE);
    if report.is_file() {
        writeln!(out, "Last report: {}", report.display())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_skips() {
        let cli = Cli::try_parse_from([
            "stagehand",
            "run",
            "CloudBuildCsrGke",
            "--skip",
            "terraform_apply",
            "--skip",
            "cleanup",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                scenario,
                skip,
                json,
                ..
            } => {
                assert_eq!(scenario, "CloudBuildCsrGke");
                assert_eq!(skip, vec!["terraform_apply", "cleanup"]);
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_state_clear_with_global_verbose() {
        let cli = Cli::try_parse_from(["stagehand", "state", "clear", "InstallGcloud", "-v"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::State {
                action: StateAction::Clear { .. }
            }
        ));
    }

    #[test]
    fn test_unknown_skip_stage_rejected() {
        let scenario = scenarios::find("InstallGcloud").unwrap();
        assert!(check_stage_names(scenario.as_ref(), &["install_gcloud".into()]).is_ok());
        let err = check_stage_names(scenario.as_ref(), &["terraform_apply".into()]).unwrap_err();
        assert!(err.to_string().contains("no stage 'terraform_apply'"));
    }

    #[test]
    fn test_unknown_scenario_lists_known_ones() {
        let err = lookup("Nope").err().unwrap();
        assert!(err.to_string().contains("CloudBuildGitHubGke"));
    }
}
