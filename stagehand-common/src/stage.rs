//! Stage runner.
//!
//! A scenario calls [`StageRunner::run_stage`] once per stage in order and
//! [`StageRunner::defer_stage`] for teardown. Once a non-deferred stage
//! fails, later non-deferred stages are recorded as not run and their bodies
//! are never invoked. Deferred stages registered before that point still run,
//! exactly once, when the runner is finished or dropped.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, info_span, warn};

use crate::errors::{HarnessError, HarnessResult, StageFailure};
use crate::report::{ScenarioReport, StageRecord, StageStatus};
use crate::skip::SkipSignalSource;
use crate::state::StateStore;

type StageBody<'a> = Box<dyn FnOnce(&StateStore) -> HarnessResult<()> + 'a>;

struct DeferredStage<'a> {
    name: String,
    body: StageBody<'a>,
}

/// Sequences the stages of one scenario invocation.
pub struct StageRunner<'a> {
    store: StateStore,
    skip: Box<dyn SkipSignalSource + 'a>,
    started_at: chrono::DateTime<Utc>,
    seen: HashSet<String>,
    records: Vec<StageRecord>,
    failure: Option<StageFailure>,
    deferred: Vec<DeferredStage<'a>>,
    deferred_failures: Vec<StageFailure>,
    finished: bool,
}

impl<'a> StageRunner<'a> {
    pub fn new(store: StateStore, skip: impl SkipSignalSource + 'a) -> Self {
        info!(
            scenario = store.run().scenario(),
            run_dir = %store.run().dir().display(),
            "Starting scenario"
        );
        Self {
            store,
            skip: Box::new(skip),
            started_at: Utc::now(),
            seen: HashSet::new(),
            records: Vec::new(),
            failure: None,
            deferred: Vec::new(),
            deferred_failures: Vec::new(),
            finished: false,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Whether a non-deferred stage has failed in this invocation.
    pub fn is_aborted(&self) -> bool {
        self.failure.is_some()
    }

    /// Run `body` as stage `name`, unless skipped or the run already failed.
    pub fn run_stage<F>(&mut self, name: &str, body: F) -> StageStatus
    where
        F: FnOnce(&StateStore) -> HarnessResult<()>,
    {
        if !self.seen.insert(name.to_string()) {
            warn!(stage = name, "Stage registered twice");
            let failure = StageFailure::new(name, HarnessError::DuplicateStage(name.to_string()));
            self.push_record(name, false, StageStatus::Failed, 0, Some(&failure));
            if self.failure.is_none() {
                self.failure = Some(failure);
            }
            return StageStatus::Failed;
        }

        if let Some(failed) = &self.failure {
            warn!(stage = name, failed_stage = %failed.stage, "Not running stage: an earlier stage failed");
            self.push_record(name, false, StageStatus::NotRun, 0, None);
            return StageStatus::NotRun;
        }

        if self.skip.should_skip(name) {
            info!(stage = name, "Skipping stage (skip signal set)");
            self.push_record(name, false, StageStatus::Skipped, 0, None);
            return StageStatus::Skipped;
        }

        let (status, duration_ms, failure) = execute(name, &self.store, body);
        self.push_record(name, false, status, duration_ms, failure.as_ref());
        if let Some(failure) = failure {
            self.failure = Some(failure);
        }
        status
    }

    /// Register `body` as deferred stage `name`.
    ///
    /// It runs when the runner finishes, on success and failure alike. A
    /// registration after the run has already aborted is never reached and is
    /// recorded as not run.
    pub fn defer_stage<F>(&mut self, name: &str, body: F)
    where
        F: FnOnce(&StateStore) -> HarnessResult<()> + 'a,
    {
        if !self.seen.insert(name.to_string()) {
            warn!(stage = name, "Deferred stage registered twice");
            let failure = StageFailure::new(name, HarnessError::DuplicateStage(name.to_string()));
            self.push_record(name, true, StageStatus::Failed, 0, Some(&failure));
            self.deferred_failures.push(failure);
            return;
        }

        if self.failure.is_some() {
            warn!(stage = name, "Deferred stage not registered: an earlier stage failed");
            self.push_record(name, true, StageStatus::NotRun, 0, None);
            return;
        }

        info!(stage = name, "Registered deferred stage");
        self.deferred.push(DeferredStage {
            name: name.to_string(),
            body: Box::new(body),
        });
    }

    /// Run all deferred stages and produce the report.
    ///
    /// The report is also written to the run directory; a failure to write it
    /// is logged, not returned.
    pub fn finish(mut self) -> ScenarioReport {
        self.drain_deferred();
        self.finished = true;

        let report = ScenarioReport {
            scenario: self.store.run().scenario().to_string(),
            run_dir: self.store.run().dir().to_path_buf(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            stages: std::mem::take(&mut self.records),
            failure: self.failure.take(),
            deferred_failures: std::mem::take(&mut self.deferred_failures),
        };

        match report.persist(self.store.run().dir()) {
            Ok(path) => info!(path = %path.display(), "Wrote scenario report"),
            Err(e) => warn!(error = %e, "Failed to write scenario report"),
        }

        if report.is_success() {
            info!(scenario = %report.scenario, "Scenario passed");
        } else {
            error!(
                scenario = %report.scenario,
                failed_stage = report.failed_stage().unwrap_or("-"),
                deferred_failures = report.deferred_failures.len(),
                "Scenario failed"
            );
        }
        report
    }

    fn drain_deferred(&mut self) {
        for DeferredStage { name, body } in std::mem::take(&mut self.deferred) {
            if self.skip.should_skip(&name) {
                info!(stage = %name, "Skipping deferred stage (skip signal set)");
                self.push_record(&name, true, StageStatus::Skipped, 0, None);
                continue;
            }
            let (status, duration_ms, failure) = execute(&name, &self.store, body);
            self.push_record(&name, true, status, duration_ms, failure.as_ref());
            if let Some(failure) = failure {
                self.deferred_failures.push(failure);
            }
        }
    }

    fn push_record(
        &mut self,
        name: &str,
        deferred: bool,
        status: StageStatus,
        duration_ms: u64,
        failure: Option<&StageFailure>,
    ) {
        self.records.push(StageRecord {
            name: name.to_string(),
            deferred,
            status,
            duration_ms,
            error: failure.map(|f| f.source.to_string()),
            error_code: failure.map(|f| f.source.code().code_string().to_string()),
        });
    }
}

impl Drop for StageRunner<'_> {
    fn drop(&mut self) {
        if self.finished || self.deferred.is_empty() {
            return;
        }
        warn!(
            scenario = self.store.run().scenario(),
            pending = self.deferred.len(),
            "Runner dropped before finish; running deferred stages"
        );
        self.drain_deferred();
        for failure in &self.deferred_failures {
            error!(stage = %failure.stage, error = %failure.source, "Deferred stage failed");
        }
    }
}

/// Run one stage body, turning errors and panics into a failure.
fn execute<F>(name: &str, store: &StateStore, body: F) -> (StageStatus, u64, Option<StageFailure>)
where
    F: FnOnce(&StateStore) -> HarnessResult<()>,
{
    let span = info_span!("stage", stage = name);
    let _enter = span.enter();
    info!("Stage starting");

    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| body(store)));
    let duration_ms = start.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(HarnessError::Panicked(panic_message(payload.as_ref()))),
    };

    match result {
        Ok(()) => {
            info!(duration_ms, "Stage completed");
            (StageStatus::Completed, duration_ms, None)
        }
        Err(e) => {
            error!(duration_ms, code = %e.code(), error = %e, "Stage failed");
            (StageStatus::Failed, duration_ms, Some(StageFailure::new(name, e)))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
