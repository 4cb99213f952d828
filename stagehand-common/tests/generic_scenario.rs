//! A five-stage scenario wired directly to the fakes.

mod common;

use std::time::Duration;

use common::TestRoot;
use stagehand_common::collab::{BuildStatus, CommandRunner, Infrastructure, ShellCommand};
use stagehand_common::testing::{
    RecordingCommandRunner, RecordingInfrastructure, ScriptedBuildSource, ScriptedNodeSource,
};
use stagehand_common::wait::{wait_for_ready_nodes, wait_for_successful_build};
use stagehand_common::{
    InfraOptions, NoSkip, Poller, RecordingSleeper, RetryPolicy, StageRunner,
    StageStatus,
};

const NODES: RetryPolicy = RetryPolicy::new(30, Duration::from_secs(10));
const BUILDS: RetryPolicy = RetryPolicy::new(30, Duration::from_secs(20));

struct Fakes {
    infra: RecordingInfrastructure,
    nodes: ScriptedNodeSource,
    builds: ScriptedBuildSource,
    commands: RecordingCommandRunner,
    sleeper: RecordingSleeper,
}

impl Fakes {
    fn new() -> Self {
        Self {
            infra: RecordingInfrastructure::new().with_output("trigger_id", "trig-9"),
            nodes: ScriptedNodeSource::ready_counts([2, 2, 2, 2, 2, 3]),
            builds: ScriptedBuildSource::for_build(
                "b-42",
                [
                    BuildStatus::Queued,
                    BuildStatus::Working,
                    BuildStatus::Working,
                    BuildStatus::Success,
                ],
            ),
            commands: RecordingCommandRunner::new(),
            sleeper: RecordingSleeper::new(),
        }
    }
}

fn run(root: &TestRoot, fakes: &Fakes) -> stagehand_common::ScenarioReport {
    let mut runner = StageRunner::new(root.store("Generic"), NoSkip);
    runner.run_stage("provision", |store| {
        let options = InfraOptions::new("/templates/generic").with_var("size", 3);
        fakes.infra.apply(&options)?;
        store.save_infra_options(&options)
    });
    runner.defer_stage("cleanup", |store| {
        fakes.infra.destroy(&store.load_infra_options()?)
    });
    runner.run_stage("wait_ready", |_| {
        let poller = Poller::new(NODES, &fakes.sleeper);
        wait_for_ready_nodes(&fakes.nodes, 3, &poller).map(|_| ())
    });
    runner.run_stage("trigger", |_| {
        fakes
            .commands
            .run(&ShellCommand::new("git").args(["push", "origin"]))
            .map(|_| ())
    });
    runner.run_stage("wait_build", |store| {
        let trigger = fakes.infra.output(&store.load_infra_options()?, "trigger_id")?;
        let poller = Poller::new(BUILDS, &fakes.sleeper);
        let id = wait_for_successful_build(&fakes.builds, &trigger, &poller)?;
        store.save_string("buildID", &id)
    });
    runner.finish()
}

#[test]
fn test_generic_scenario_polls_then_cleans_up() {
    let root = TestRoot::new();
    let fakes = Fakes::new();

    let report = run(&root, &fakes);
    assert!(report.is_success(), "{report}");

    assert_eq!(fakes.nodes.calls(), 6);
    assert_eq!(fakes.builds.get_calls(), 4);
    assert_eq!(
        fakes.sleeper.sleeps(),
        [vec![Duration::from_secs(10); 5], vec![Duration::from_secs(20); 3]].concat()
    );
    assert_eq!(root.store("Generic").load_string("buildID").unwrap(), "b-42");
    assert_eq!(fakes.commands.command_lines(), vec!["git push origin"]);
    assert_eq!(fakes.infra.destroys(), 1);
    assert_eq!(report.stages.last().map(|s| s.name.as_str()), Some("cleanup"));
}

#[test]
fn test_unready_cluster_exhausts_node_budget() {
    let root = TestRoot::new();
    let fakes = Fakes {
        nodes: ScriptedNodeSource::ready_counts([2]),
        ..Fakes::new()
    };

    let report = run(&root, &fakes);
    assert_eq!(report.failed_stage(), Some("wait_ready"));
    assert_eq!(fakes.nodes.calls(), 30);
    assert_eq!(fakes.sleeper.total(), Duration::from_secs(29 * 10));
    assert_eq!(report.status_of("trigger"), Some(StageStatus::NotRun));
    assert_eq!(report.status_of("wait_build"), Some(StageStatus::NotRun));
    assert!(fakes.commands.calls().is_empty());
    assert_eq!(fakes.infra.destroys(), 1);

    let error = report.stage("wait_ready").and_then(|s| s.error.clone()).unwrap();
    assert!(error.contains("2 of 3 nodes ready"), "{error}");
}

#[test]
fn test_terminal_build_status_fails_without_retrying() {
    let root = TestRoot::new();
    let fakes = Fakes {
        builds: ScriptedBuildSource::for_build(
            "b-42",
            [BuildStatus::Working, BuildStatus::Other("FAILURE".into())],
        ),
        ..Fakes::new()
    };

    let report = run(&root, &fakes);
    assert_eq!(report.failed_stage(), Some("wait_build"));
    assert_eq!(fakes.builds.get_calls(), 2);
    assert!(!root.store("Generic").contains("buildID").unwrap());
    assert_eq!(fakes.infra.destroys(), 1);
}
