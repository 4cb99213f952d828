//! stagehand - run staged, resumable validation scenarios.

#![forbid(unsafe_code)]

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use stagehand::cli::{self, Cli, Outcome};
use stagehand::toolbox::CliToolbox;
use stagehand_common::{EnvSkipSignals, LogConfig, init_logging};
use tracing::{debug, error};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("stagehand: failed to initialise logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Failure) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            eprintln!("stagehand: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let config = cli::load_config(cli)?;
    debug!(?config, "Configuration loaded");
    let tools = CliToolbox::new();
    let mut stdout = io::stdout().lock();
    cli::execute(cli, config, &tools, EnvSkipSignals::from_env(), &mut stdout)
}
