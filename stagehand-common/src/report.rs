//! Per-invocation scenario report.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{HarnessResult, StageFailure};
use crate::state::atomic_write;

/// File name of the persisted report inside the run directory.
pub const REPORT_FILE: &str = "report.json";

/// Lifecycle of one stage within one invocation.
///
/// `NotRun -> (Skipped | Running -> (Completed | Failed))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotRun,
    Skipped,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    /// Skipped and Completed both count as success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Skipped | Self::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotRun | Self::Running)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotRun => "not run",
            Self::Skipped => "skipped",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// What happened to one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub name: String,
    pub deferred: bool,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Outcome of one scenario invocation.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Stages in execution order; deferred stages appear where they ran.
    pub stages: Vec<StageRecord>,
    /// The non-deferred failure that aborted the run.
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<StageFailure>,
    /// Failures of deferred stages, reported separately.
    #[serde(serialize_with = "serialize_failures")]
    pub deferred_failures: Vec<StageFailure>,
}

/// Serialized form of a [`StageFailure`].
#[derive(Serialize)]
struct FailureSummary<'a> {
    stage: &'a str,
    code: &'static str,
    message: String,
}

impl<'a> From<&'a StageFailure> for FailureSummary<'a> {
    fn from(failure: &'a StageFailure) -> Self {
        Self {
            stage: &failure.stage,
            code: failure.source.code().code_string(),
            message: failure.source.to_string(),
        }
    }
}

fn serialize_failure<S: Serializer>(
    failure: &Option<StageFailure>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    failure
        .as_ref()
        .map(FailureSummary::from)
        .serialize(serializer)
}

fn serialize_failures<S: Serializer>(
    failures: &[StageFailure],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(failures.iter().map(FailureSummary::from))
}

impl ScenarioReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.deferred_failures.is_empty()
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|r| r.status)
    }

    /// Name of the stage that aborted the run, if any.
    pub fn failed_stage(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.stage.as_str())
    }

    /// Stages that completed in this invocation; candidates for skipping
    /// on a re-run.
    pub fn completed_stages(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .filter(|r| !r.deferred && r.status == StageStatus::Completed)
            .map(|r| r.name.as_str())
    }

    /// Write the report as `report.json` in `dir`.
    pub fn persist(&self, dir: &Path) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        let content = serde_json::to_vec_pretty(self)?;
        atomic_write(&path, &content)?;
        Ok(path)
    }

    /// Convert into a `Result`, failing if any stage failed.
    pub fn into_result(self) -> Result<Self, ScenarioFailure> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ScenarioFailure {
                report: Box::new(self),
            })
        }
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario {} ({})", self.scenario, self.run_dir.display())?;
        for record in &self.stages {
            let marker = if record.deferred { " (deferred)" } else { "" };
            write!(
                f,
                "  {:<32} {:<10} {:>8}ms{}",
                record.name, record.status, record.duration_ms, marker
            )?;
            if let Some(error) = &record.error {
                write!(f, "\n      {error}")?;
            }
            writeln!(f)?;
        }
        if let Some(failure) = &self.failure {
            writeln!(f, "FAILED: {failure}")?;
        }
        for failure in &self.deferred_failures {
            writeln!(f, "CLEANUP FAILED: {failure}")?;
        }
        if self.is_success() {
            writeln!(f, "PASSED")?;
        }
        Ok(())
    }
}

/// A scenario invocation that did not pass.
#[derive(Debug, thiserror::Error)]
#[error("{}", describe_failure(.report))]
pub struct ScenarioFailure {
    pub report: Box<ScenarioReport>,
}

fn describe_failure(report: &ScenarioReport) -> String {
    let mut parts = Vec::new();
    if let Some(failure) = &report.failure {
        parts.push(failure.to_string());
    }
    for failure in &report.deferred_failures {
        parts.push(format!("deferred {failure}"));
    }
    format!("scenario '{}' failed: {}", report.scenario, parts.join("; "))
}
