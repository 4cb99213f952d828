mod common;

use std::cell::RefCell;

use common::TestRoot;
use stagehand_common::testing::TestLogger;
use stagehand_common::{
    ErrorCode, HarnessError, NoSkip, StageRunner, StageStatus, StaticSkipSignals,
};

#[test]
fn test_rerun_skips_completed_stages_and_reads_their_state() {
    let logger = TestLogger::for_test("test_rerun_skips_completed_stages_and_reads_their_state");
    let root = TestRoot::new();

    let mut first = StageRunner::new(root.store("Demo"), NoSkip);
    first.run_stage("provision", |store| store.save_string("clusterName", "gke-abc"));
    first.run_stage("deploy", |_| Err(HarnessError::assertion("rollout timed out")));
    first.run_stage("verify", |_| panic!("must not run after a failure"));
    let report = first.finish();

    assert_eq!(report.failed_stage(), Some("deploy"));
    assert_eq!(report.status_of("verify"), Some(StageStatus::NotRun));
    let completed: Vec<String> = report.completed_stages().map(str::to_string).collect();
    assert_eq!(completed, vec!["provision"]);

    let seen = RefCell::new(None);
    let mut second = StageRunner::new(root.store("Demo"), StaticSkipSignals::new(completed));
    second.run_stage("provision", |_| panic!("skipped stage must not run"));
    second.run_stage("deploy", |store| {
        *seen.borrow_mut() = Some(store.load_string("clusterName")?);
        Ok(())
    });
    second.run_stage("verify", |_| Ok(()));
    let report = second.finish();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.status_of("provision"), Some(StageStatus::Skipped));
    assert_eq!(report.status_of("deploy"), Some(StageStatus::Completed));
    assert_eq!(seen.into_inner().as_deref(), Some("gke-abc"));
    logger.pass();
}

#[test]
fn test_deferred_failure_is_reported_beside_the_stage_failure() {
    let root = TestRoot::new();
    let mut runner = StageRunner::new(root.store("Demo"), NoSkip);

    runner.run_stage("setup", |_| Ok(()));
    runner.defer_stage("cleanup", |_| {
        Err(HarnessError::fatal("terraform", "destroy failed"))
    });
    runner.run_stage("apply", |_| Err(HarnessError::fatal("terraform", "apply failed")));
    let report = runner.finish();

    assert!(!report.is_success());
    assert_eq!(report.failed_stage(), Some("apply"));
    assert_eq!(report.deferred_failures.len(), 1);
    assert_eq!(report.deferred_failures[0].stage, "cleanup");
    assert_eq!(report.status_of("cleanup"), Some(StageStatus::Failed));

    let failure = report.failure.as_ref().expect("stage failure");
    assert_eq!(failure.source.code(), ErrorCode::CollaboratorFatal);
    assert!(failure.source.to_string().contains("apply failed"));
}

#[test]
fn test_deferred_stages_run_when_runner_is_dropped() {
    let root = TestRoot::new();
    let store = root.store("Demo");
    {
        let mut runner = StageRunner::new(store.clone(), NoSkip);
        runner.defer_stage("first", |store| store.save_string("order", "first"));
        runner.defer_stage("second", |store| {
            let before = store.load_string("order")?;
            store.save_string("order", &format!("{before},second"))
        });
    }
    assert_eq!(store.load_string("order").unwrap(), "first,second");
}

#[test]
fn test_persisted_report_lists_every_stage() {
    let root = TestRoot::new();
    let store = root.store("Demo");
    let mut runner = StageRunner::new(store.clone(), StaticSkipSignals::new(["b"]));
    runner.run_stage("a", |_| Ok(()));
    runner.defer_stage("teardown", |_| Ok(()));
    runner.run_stage("b", |_| Ok(()));
    let report = runner.finish();

    let path = store.run().dir().join(stagehand_common::report::REPORT_FILE);
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    let names: Vec<&str> = written["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "teardown"]);
    assert_eq!(written["stages"][1]["status"], "skipped");
    assert!(report.is_success());
}
