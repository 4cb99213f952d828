//! Waits shared by scenarios: cluster membership and build completion.

use tracing::info;

use crate::collab::{BuildQuery, BuildStatus, ClusterQuery, Node};
use crate::errors::{HarnessError, HarnessResult};
use crate::retry::{Poll, Poller};

/// Poll until exactly `expected` nodes report ready.
pub fn wait_for_ready_nodes(
    cluster: &dyn ClusterQuery,
    expected: usize,
    poller: &Poller<'_>,
) -> HarnessResult<Vec<Node>> {
    let description = format!("wait for {expected} ready nodes");
    let nodes = poller.poll(&description, |_| -> HarnessResult<Poll<Vec<Node>>> {
        let nodes = cluster.list_nodes()?;
        let ready: Vec<Node> = nodes.iter().filter(|n| n.is_ready()).cloned().collect();
        if ready.len() == expected {
            Ok(Poll::Ready(ready))
        } else {
            Ok(Poll::not_ready(format!(
                "{} of {expected} nodes ready ({} registered)",
                ready.len(),
                nodes.len()
            )))
        }
    })?;
    info!(count = nodes.len(), "Cluster nodes ready");
    Ok(nodes)
}

/// Map one build observation onto the poll outcome.
///
/// Queued and working builds may still succeed; any other non-success
/// status is final.
pub fn classify_build(id: &str, status: &BuildStatus) -> HarnessResult<Poll<String>> {
    match status {
        BuildStatus::Success => Ok(Poll::Ready(id.to_string())),
        BuildStatus::Queued => Ok(Poll::not_ready("Build is queued")),
        BuildStatus::Working => Ok(Poll::not_ready("Build is executing")),
        BuildStatus::Other(raw) => Err(HarnessError::fatal(
            "cloud-build",
            format!("Build is not successful: build {id} ended with status {raw}"),
        )),
    }
}

/// Poll the most recent build of `trigger_id` until it succeeds; returns its id.
pub fn wait_for_successful_build(
    builds: &dyn BuildQuery,
    trigger_id: &str,
    poller: &Poller<'_>,
) -> HarnessResult<String> {
    let build_id = poller.poll("wait for build to complete", |_| -> HarnessResult<Poll<String>> {
        let listed = builds.list_builds_for_trigger(trigger_id)?;
        let Some(latest) = listed.first() else {
            return Ok(Poll::not_ready("Build hasn't been triggered"));
        };
        let build = builds.get_build(&latest.id)?;
        classify_build(&build.id, &build.status)
    })?;
    info!(build_id = %build_id, trigger_id, "Build succeeded");
    Ok(build_id)
}
