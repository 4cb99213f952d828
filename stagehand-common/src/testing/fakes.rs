//! Deterministic in-memory collaborators for tests.
//!
//! Every fake is cheap to clone and clones share state, so a test can hand
//! one clone to the code under test and inspect recorded calls on another.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::collab::{
    Build, BuildQuery, BuildStatus, ClusterQuery, CommandRunner, Infrastructure, Node, ShellCommand,
};
use crate::errors::{HarnessError, HarnessResult};
use crate::options::{InfraOptions, InfraOutputs};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Records commands; answers by command-line prefix.
#[derive(Debug, Clone, Default)]
pub struct RecordingCommandRunner {
    inner: Arc<Mutex<CommandScript>>,
}

#[derive(Debug, Default)]
struct CommandScript {
    responses: Vec<(String, Result<String, String>)>,
    calls: Vec<ShellCommand>,
}

impl RecordingCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands whose command line starts with `prefix`.
    pub fn respond_to(&self, prefix: impl Into<String>, output: impl Into<String>) {
        lock(&self.inner)
            .responses
            .push((prefix.into(), Ok(output.into())));
    }

    /// Fail commands whose command line starts with `prefix`.
    pub fn fail_on(&self, prefix: impl Into<String>, message: impl Into<String>) {
        lock(&self.inner)
            .responses
            .push((prefix.into(), Err(message.into())));
    }

    pub fn calls(&self) -> Vec<ShellCommand> {
        lock(&self.inner).calls.clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ShellCommand::command_line).collect()
    }
}

impl CommandRunner for RecordingCommandRunner {
    fn run(&self, command: &ShellCommand) -> HarnessResult<String> {
        let mut script = lock(&self.inner);
        script.calls.push(command.clone());
        let line = command.command_line();
        let response = script
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone());
        match response {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(HarnessError::fatal(&command.program, message)),
            None => Ok(String::new()),
        }
    }
}

/// Cluster whose node listing follows a script, one entry per call.
///
/// The last entry repeats once the script runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedNodeSource {
    inner: Arc<Mutex<NodeScript>>,
}

#[derive(Debug, Default)]
struct NodeScript {
    script: Vec<Result<Vec<Node>, String>>,
    calls: usize,
}

impl ScriptedNodeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// One call per entry, each reporting that many ready nodes.
    pub fn ready_counts(counts: impl IntoIterator<Item = usize>) -> Self {
        let source = Self::new();
        for count in counts {
            source.push_nodes(
                (0..count)
                    .map(|i| Node::new(format!("node-{i}"), true))
                    .collect(),
            );
        }
        source
    }

    pub fn push_nodes(&self, nodes: Vec<Node>) {
        lock(&self.inner).script.push(Ok(nodes));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.inner).script.push(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        lock(&self.inner).calls
    }
}

impl ClusterQuery for ScriptedNodeSource {
    fn list_nodes(&self) -> HarnessResult<Vec<Node>> {
        let mut script = lock(&self.inner);
        let index = script.calls.min(script.script.len().saturating_sub(1));
        script.calls += 1;
        match script.script.get(index) {
            Some(Ok(nodes)) => Ok(nodes.clone()),
            Some(Err(message)) => Err(HarnessError::fatal("kubectl", message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// Build service with one build whose status follows a script.
#[derive(Debug, Clone)]
pub struct ScriptedBuildSource {
    inner: Arc<Mutex<BuildScript>>,
}

#[derive(Debug)]
struct BuildScript {
    build_id: String,
    statuses: Vec<BuildStatus>,
    images: Vec<String>,
    empty_listings: usize,
    list_calls: usize,
    get_calls: usize,
    deleted: Vec<String>,
    fail_delete: Option<String>,
}

impl ScriptedBuildSource {
    /// `get_build` walks `statuses` one call at a time, repeating the last.
    pub fn for_build(
        build_id: impl Into<String>,
        statuses: impl IntoIterator<Item = BuildStatus>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BuildScript {
                build_id: build_id.into(),
                statuses: statuses.into_iter().collect(),
                images: Vec::new(),
                empty_listings: 0,
                list_calls: 0,
                get_calls: 0,
                deleted: Vec::new(),
                fail_delete: None,
            })),
        }
    }

    /// The first `n` trigger listings come back empty.
    #[must_use]
    pub fn with_empty_listings(self, n: usize) -> Self {
        lock(&self.inner).empty_listings = n;
        self
    }

    #[must_use]
    pub fn with_images<I, S>(self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.inner).images = images.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn failing_deletes(self, message: impl Into<String>) -> Self {
        lock(&self.inner).fail_delete = Some(message.into());
        self
    }

    pub fn list_calls(&self) -> usize {
        lock(&self.inner).list_calls
    }

    pub fn get_calls(&self) -> usize {
        lock(&self.inner).get_calls
    }

    pub fn deleted_images(&self) -> Vec<String> {
        lock(&self.inner).deleted.clone()
    }

    fn current(script: &BuildScript, index: usize) -> Build {
        let status = script
            .statuses
            .get(index.min(script.statuses.len().saturating_sub(1)))
            .cloned()
            .unwrap_or(BuildStatus::Queued);
        Build {
            id: script.build_id.clone(),
            status,
            images: script.images.clone(),
        }
    }
}

impl BuildQuery for ScriptedBuildSource {
    fn list_builds_for_trigger(&self, _trigger_id: &str) -> HarnessResult<Vec<Build>> {
        let mut script = lock(&self.inner);
        script.list_calls += 1;
        if script.list_calls <= script.empty_listings {
            return Ok(Vec::new());
        }
        Ok(vec![Self::current(&script, script.get_calls)])
    }

    fn get_build(&self, id: &str) -> HarnessResult<Build> {
        let mut script = lock(&self.inner);
        if id != script.build_id {
            return Err(HarnessError::fatal("cloud-build", format!("build {id} not found")));
        }
        let build = Self::current(&script, script.get_calls);
        script.get_calls += 1;
        Ok(build)
    }

    fn delete_image(&self, image: &str) -> HarnessResult<()> {
        let mut script = lock(&self.inner);
        if let Some(message) = &script.fail_delete {
            return Err(HarnessError::fatal("gcr", message.clone()));
        }
        script.deleted.push(image.to_string());
        Ok(())
    }
}

/// What a [`RecordingInfrastructure`] was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum InfraCall {
    Apply(InfraOptions),
    Destroy(InfraOptions),
    Output(String),
}

/// Infrastructure that records calls and serves configured outputs.
#[derive(Debug, Clone, Default)]
pub struct RecordingInfrastructure {
    inner: Arc<Mutex<InfraScript>>,
}

#[derive(Debug, Default)]
struct InfraScript {
    outputs: BTreeMap<String, String>,
    calls: Vec<InfraCall>,
    fail_apply: Option<String>,
    fail_destroy: Option<String>,
}

impl RecordingInfrastructure {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        lock(&self.inner).outputs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn failing_apply(self, message: impl Into<String>) -> Self {
        lock(&self.inner).fail_apply = Some(message.into());
        self
    }

    #[must_use]
    pub fn failing_destroy(self, message: impl Into<String>) -> Self {
        lock(&self.inner).fail_destroy = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<InfraCall> {
        lock(&self.inner).calls.clone()
    }

    pub fn applies(&self) -> usize {
        self.count(|c| matches!(c, InfraCall::Apply(_)))
    }

    pub fn destroys(&self) -> usize {
        self.count(|c| matches!(c, InfraCall::Destroy(_)))
    }

    fn count(&self, pred: impl Fn(&InfraCall) -> bool) -> usize {
        lock(&self.inner).calls.iter().filter(|c| pred(c)).count()
    }
}

impl Infrastructure for RecordingInfrastructure {
    fn apply(&self, options: &InfraOptions) -> HarnessResult<InfraOutputs> {
        let mut script = lock(&self.inner);
        script.calls.push(InfraCall::Apply(options.clone()));
        if let Some(message) = &script.fail_apply {
            return Err(HarnessError::fatal("terraform", message.clone()));
        }
        Ok(script
            .outputs
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect())
    }

    fn destroy(&self, options: &InfraOptions) -> HarnessResult<()> {
        let mut script = lock(&self.inner);
        script.calls.push(InfraCall::Destroy(options.clone()));
        match &script.fail_destroy {
            Some(message) => Err(HarnessError::fatal("terraform", message.clone())),
            None => Ok(()),
        }
    }

    fn output(&self, _options: &InfraOptions, key: &str) -> HarnessResult<String> {
        let mut script = lock(&self.inner);
        script.calls.push(InfraCall::Output(key.to_string()));
        script
            .outputs
            .get(key)
            .cloned()
            .ok_or_else(|| HarnessError::fatal("terraform", format!("output '{key}' not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_runner_first_matching_prefix_wins() {
        let runner = RecordingCommandRunner::new();
        runner.respond_to("git remote", "added");
        runner.fail_on("git", "not a repository");
        assert_eq!(
            runner
                .run(&ShellCommand::new("git").args(["remote", "add"]))
                .unwrap(),
            "added"
        );
        assert!(runner.run(&ShellCommand::new("git").arg("push")).is_err());
        assert_eq!(runner.run(&ShellCommand::new("ls")).unwrap(), "");
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn test_node_source_repeats_last_entry() {
        let nodes = ScriptedNodeSource::ready_counts([1, 2]);
        assert_eq!(nodes.list_nodes().unwrap().len(), 1);
        assert_eq!(nodes.list_nodes().unwrap().len(), 2);
        assert_eq!(nodes.list_nodes().unwrap().len(), 2);
        assert_eq!(nodes.calls(), 3);
    }

    #[test]
    fn test_build_source_walks_statuses() {
        let builds = ScriptedBuildSource::for_build("b-1", [BuildStatus::Queued, BuildStatus::Success])
            .with_empty_listings(1);
        assert!(builds.list_builds_for_trigger("t").unwrap().is_empty());
        assert_eq!(builds.list_builds_for_trigger("t").unwrap()[0].id, "b-1");
        assert_eq!(builds.get_build("b-1").unwrap().status, BuildStatus::Queued);
        assert_eq!(builds.get_build("b-1").unwrap().status, BuildStatus::Success);
        assert_eq!(builds.get_build("b-1").unwrap().status, BuildStatus::Success);
        assert!(builds.get_build("other").is_err());
        assert_eq!(builds.get_calls(), 3);
    }

    #[test]
    fn test_infrastructure_records_calls() {
        let infra = RecordingInfrastructure::new().with_output("trigger_id", "t-1");
        let opts = InfraOptions::new("/m");
        infra.apply(&opts).unwrap();
        assert_eq!(infra.output(&opts, "trigger_id").unwrap(), "t-1");
        assert!(infra.output(&opts, "missing").is_err());
        infra.destroy(&opts).unwrap();
        assert_eq!(infra.applies(), 1);
        assert_eq!(infra.destroys(), 1);
        assert_eq!(infra.calls().len(), 4);
    }
}
