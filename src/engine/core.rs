// src/engine/core.rs

//! Pure decisions behind stage execution.
//!
//! Nothing in here touches the network or disk: the runtime shell asks these
//! functions what to do and then performs the IO.

use crate::config::model::{ConfigDirective, StageDefinition};
use crate::dag::StageGraph;
use crate::errors::{Result, StagehandError};
use crate::remote::join_url;
use crate::state::RunState;
use crate::types::StageStatus;

/// One job to post: all of a stage's directives for a single resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub resource: String,
    pub url: String,
    pub configs: Vec<ConfigDirective>,
}

/// A dependency not yet recorded as completed in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDependency {
    pub name: String,
    /// Threads to poll for confirmation. Empty when the dependency was never
    /// submitted in this run.
    pub thread_ids: Vec<String>,
}

/// Group a stage's directives per resource and resolve each resource's URL
/// against the compute endpoint.
///
/// Every resource is resolved before anything is returned, so a missing
/// resource fails the stage before any job is posted.
pub fn plan_submissions(
    definition: &StageDefinition,
    compute_endpoint: &str,
) -> Result<Vec<Submission>> {
    definition
        .directives_by_resource()
        .into_iter()
        .map(|(resource, directives)| {
            let uri = definition.resource_uri(resource).ok_or_else(|| {
                StagehandError::ResourceResolution {
                    stage: definition.name.clone(),
                    resource: resource.to_string(),
                }
            })?;
            Ok(Submission {
                resource: resource.to_string(),
                url: join_url(compute_endpoint, uri),
                configs: directives.into_iter().cloned().collect(),
            })
        })
        .collect()
}

/// Direct dependencies of `stage` whose recorded state is not `completed`,
/// in declaration order. A dependency with no record at all is pending too.
pub fn pending_dependencies(
    graph: &StageGraph,
    state: &RunState,
    stage: &str,
) -> Vec<PendingDependency> {
    graph
        .dependencies_of(stage)
        .into_iter()
        .filter_map(|dep| {
            let record = state.stages.get(dep.name());
            if record.and_then(|r| r.state) == Some(StageStatus::Completed) {
                return None;
            }
            Some(PendingDependency {
                name: dep.name().to_string(),
                thread_ids: record.map(|r| r.threads()).unwrap_or_default(),
            })
        })
        .collect()
}
