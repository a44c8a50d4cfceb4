//! Start point launcher.
//!
//! Every launched start point runs on its own tokio task. Parallel runs
//! spawn them all and wait with `join_all`; sequential runs await each task
//! before spawning the next. A failing or panicking start point is reported
//! in the [`RunSummary`] and never affects its siblings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::dispatch::{RunContext, Router};
use super::ordering::{discover_start_points, order_start_points, StartPoint};
use crate::environment::Environment;
use crate::error::{FlowError, Result};
use crate::events::{FlowEvent, ObserverRegistry};
use crate::graph::FlowGraph;
use crate::types::NodeId;

/// Run state of a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Stopping,
}

impl RunState {
    /// Whether a run is in progress (stopping included)
    pub fn is_active(self) -> bool {
        self != Self::Idle
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub execution_id: String,
    /// Start points launched, in launch order
    pub launched: Vec<NodeId>,
    /// Start points skipped by a `! :` label
    pub excluded: Vec<NodeId>,
    /// Start points that returned an error or panicked
    pub failed: Vec<(NodeId, String)>,
    /// Whether stop() was requested during the run
    pub stopped: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// True when no launched start point failed
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A run in flight
pub struct RunHandle {
    execution_id: String,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub(crate) fn new(execution_id: String, task: JoinHandle<RunSummary>) -> Self {
        Self { execution_id, task }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for every launched start point to finish
    pub async fn wait(self) -> Result<RunSummary> {
        self.task
            .await
            .map_err(|e| FlowError::ExecutionFailed(format!("Run task failed: {}", e)))
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("execution_id", &self.execution_id)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Everything a run needs, captured from the workspace under its lock
pub struct RunPlan {
    pub workspace: String,
    pub execution_id: String,
    pub sequential: bool,
    pub launch: Vec<StartPoint>,
    pub excluded: Vec<StartPoint>,
    router: Arc<Router>,
    cancel: Arc<AtomicBool>,
    environment: Arc<Environment>,
    max_depth: usize,
}

impl RunPlan {
    pub fn new(
        workspace: impl Into<String>,
        graph: &FlowGraph,
        environment: Environment,
        cancel: Arc<AtomicBool>,
        sequential: bool,
        max_depth: usize,
    ) -> Self {
        let (launch, excluded) = order_start_points(discover_start_points(graph));
        Self {
            workspace: workspace.into(),
            execution_id: format!("run-{}", uuid::Uuid::new_v4()),
            sequential,
            launch,
            excluded,
            router: Arc::new(Router::build(graph)),
            cancel,
            environment: Arc::new(environment),
            max_depth,
        }
    }

    fn context_for(&self, node_id: &str) -> RunContext {
        RunContext::new(
            node_id,
            self.execution_id.clone(),
            self.router.clone(),
            self.cancel.clone(),
            self.environment.clone(),
            self.max_depth,
        )
    }

    fn launch_one(&self, point: &StartPoint, observers: &ObserverRegistry) -> JoinHandle<Result<()>> {
        log::info!(
            "[{}] Launching start point '{}' ({})",
            self.execution_id,
            point.label,
            point.node_id
        );
        observers.notify(&FlowEvent::StartPointLaunched {
            execution_id: self.execution_id.clone(),
            node_id: point.node_id.clone(),
            label: point.label.clone(),
        });
        let component = point.component.clone();
        let ctx = self.context_for(&point.node_id);
        tokio::spawn(async move {
            match component.as_startable() {
                Some(startable) => startable.start(ctx).await,
                None => Err(FlowError::ExecutionFailed(format!(
                    "'{}' is not startable",
                    component.component_type()
                ))),
            }
        })
    }
}

/// Record one start point's outcome
fn settle(
    summary: &mut RunSummary,
    node_id: &NodeId,
    outcome: std::result::Result<Result<()>, tokio::task::JoinError>,
    observers: &ObserverRegistry,
) {
    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) if e.is_panic() => Some("start point panicked".to_string()),
        Err(e) => Some(e.to_string()),
    };
    match error {
        None => {
            log::debug!("[{}] Start point '{}' completed", summary.execution_id, node_id);
            observers.notify(&FlowEvent::StartPointCompleted {
                execution_id: summary.execution_id.clone(),
                node_id: node_id.clone(),
            });
        }
        Some(error) => {
            log::error!(
                "[{}] Start point '{}' failed: {}",
                summary.execution_id,
                node_id,
                error
            );
            observers.notify(&FlowEvent::StartPointFailed {
                execution_id: summary.execution_id.clone(),
                node_id: node_id.clone(),
                error: error.clone(),
            });
            summary.failed.push((node_id.clone(), error));
        }
    }
}

/// Launch every start point of `plan` and wait for all of them
pub async fn execute(plan: RunPlan, observers: &ObserverRegistry) -> RunSummary {
    let started = Instant::now();
    let mut summary = RunSummary {
        execution_id: plan.execution_id.clone(),
        excluded: plan.excluded.iter().map(|p| p.node_id.clone()).collect(),
        ..Default::default()
    };
    for point in &plan.excluded {
        log::info!("[{}] Skipping excluded start point '{}'", plan.execution_id, point.label);
    }

    if plan.sequential {
        for point in &plan.launch {
            if plan.cancel.load(Ordering::SeqCst) {
                log::info!(
                    "[{}] Stop requested; not launching '{}'",
                    plan.execution_id,
                    point.label
                );
                break;
            }
            summary.launched.push(point.node_id.clone());
            let outcome = plan.launch_one(point, observers).await;
            settle(&mut summary, &point.node_id, outcome, observers);
        }
    } else {
        let handles: Vec<JoinHandle<Result<()>>> = plan
            .launch
            .iter()
            .map(|point| {
                summary.launched.push(point.node_id.clone());
                plan.launch_one(point, observers)
            })
            .collect();
        for (point, outcome) in plan.launch.iter().zip(join_all(handles).await) {
            settle(&mut summary, &point.node_id, outcome, observers);
        }
    }

    summary.stopped = plan.cancel.load(Ordering::SeqCst);
    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    log::info!(
        "[{}] Run finished: {} launched, {} failed, {} excluded{}",
        summary.execution_id,
        summary.launched.len(),
        summary.failed.len(),
        summary.excluded.len(),
        if summary.stopped { " (stopped)" } else { "" }
    );
    summary
}
