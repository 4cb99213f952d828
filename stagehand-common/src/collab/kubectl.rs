//! kubectl-backed [`ClusterQuery`].

use serde::Deserialize;

use super::command::{CommandRunner, ProcessCommandRunner, ShellCommand};
use super::{ClusterQuery, Node};
use crate::errors::HarnessResult;
use crate::options::KubectlOptions;

#[derive(Debug, Clone)]
pub struct KubectlCli<R = ProcessCommandRunner> {
    runner: R,
    options: KubectlOptions,
}

impl KubectlCli<ProcessCommandRunner> {
    pub fn new(options: KubectlOptions) -> Self {
        Self::with_runner(ProcessCommandRunner::new(), options)
    }
}

impl<R: CommandRunner> KubectlCli<R> {
    pub fn with_runner(runner: R, options: KubectlOptions) -> Self {
        Self { runner, options }
    }
}

impl<R: CommandRunner> ClusterQuery for KubectlCli<R> {
    fn list_nodes(&self) -> HarnessResult<Vec<Node>> {
        let cmd = ShellCommand::new("kubectl")
            .args(self.options.args())
            .args(["get", "nodes", "-o", "json"])
            .stdout_only();
        let raw = self.runner.run(&cmd)?;
        parse_nodes(&raw)
    }
}

#[derive(Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<NodeItem>,
}

#[derive(Deserialize)]
struct NodeItem {
    metadata: Metadata,
    #[serde(default)]
    status: Option<NodeStatus>,
}

#[derive(Deserialize)]
struct Metadata {
    name: String,
}

#[derive(Deserialize)]
struct NodeStatus {
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Deserialize)]
struct Condition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

/// A node is ready when its `Ready` condition reports `True`.
fn parse_nodes(raw: &str) -> HarnessResult<Vec<Node>> {
    let list: NodeList = serde_json::from_str(raw)?;
    Ok(list
        .items
        .into_iter()
        .map(|item| {
            let ready = item.status.is_some_and(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.kind == "Ready" && c.status == "True")
            });
            Node::new(item.metadata.name, ready)
        })
        .collect())
}
