//! Plan execution engine
//!
//! Walks an [`ExecutionPlan`] against a [`PlatformBackend`]:
//! - sequential nodes run one child at a time and stop at the first failure
//! - parallel nodes spawn every child, wait for all of them and report the
//!   first observed failure along with which siblings succeeded
//! - non-executable steps are logged and recorded as no-ops
//!
//! A deadline is checked before each step starts. Commands that are already
//! running are never interrupted; when the deadline passes while waiting on a
//! parallel group the wait ends and the spawned children are left detached.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::PlatformBackend;
use crate::errors::{DevrunError, ExecError, Result};
use crate::output::OutputSink;
use crate::plan::{ExecutionPlan, PlanNode, PlanTarget, Step};

/// Per-invocation execution options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// No step starts after this instant
    pub deadline: Option<Instant>,
}

impl RunOptions {
    /// Options with a deadline `timeout` from now
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
    Succeeded,
    /// IDE-directed command that was not executed
    NoOp,
}

/// Record of one completed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub command_id: String,
    pub component: Option<String>,
    pub status: StepStatus,
    pub duration: Duration,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub target: PlanTarget,
    /// Completed steps in completion order
    pub executed: Vec<StepRecord>,
    /// Ids of non-executable steps
    pub skipped: Vec<String>,
}

impl RunReport {
    /// Ids of completed steps in completion order
    pub fn executed_ids(&self) -> Vec<&str> {
        self.executed.iter().map(|r| r.command_id.as_str()).collect()
    }
}

struct NodeOutcome {
    records: Vec<StepRecord>,
    result: Result<()>,
}

impl NodeOutcome {
    fn failed(records: Vec<StepRecord>, error: DevrunError) -> Self {
        Self {
            records,
            result: Err(error),
        }
    }
}

/// Executes plans against one backend
#[derive(Clone)]
pub struct PlanExecutor {
    backend: Arc<dyn PlatformBackend>,
    sink: Arc<dyn OutputSink>,
    options: RunOptions,
}

impl PlanExecutor {
    pub fn new(backend: Arc<dyn PlatformBackend>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            backend,
            sink,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Execute a plan to completion
    #[instrument(skip(self, plan), fields(target = %plan.target, backend = self.backend.name()))]
    pub async fn run(&self, plan: &ExecutionPlan) -> Result<RunReport> {
        info!("Running {} ({} steps)", plan.target, plan.root.step_count());
        let outcome = self.clone().run_node(plan.root.clone()).await;
        outcome.result?;

        let skipped = outcome
            .records
            .iter()
            .filter(|r| r.status == StepStatus::NoOp)
            .map(|r| r.command_id.clone())
            .collect();
        info!("Completed {}", plan.target);
        Ok(RunReport {
            target: plan.target.clone(),
            executed: outcome.records,
            skipped,
        })
    }

    fn run_node(self, node: PlanNode) -> BoxFuture<'static, NodeOutcome> {
        async move {
            match node {
                PlanNode::Step(step) => self.run_step(step).await,
                PlanNode::Sequential { id, children } => {
                    self.run_sequential(id.as_deref().unwrap_or("<sequence>"), children)
                        .await
                }
                PlanNode::Parallel { id, children } => self.run_parallel(id, children).await,
            }
        }
        .boxed()
    }

    async fn run_step(&self, step: Step) -> NodeOutcome {
        if self.options.deadline_passed() {
            warn!("Deadline passed before starting '{}'", step.command_id);
            return NodeOutcome::failed(
                Vec::new(),
                ExecError::DeadlineExceeded {
                    command: step.command_id,
                }
                .into(),
            );
        }

        let started = Instant::now();
        let Some(exec) = step.exec() else {
            info!("Skipping IDE command '{}'", step.command_id);
            return NodeOutcome {
                records: vec![StepRecord {
                    command_id: step.command_id,
                    component: None,
                    status: StepStatus::NoOp,
                    duration: Duration::ZERO,
                }],
                result: Ok(()),
            };
        };

        let component = exec.component.clone();
        info!(
            command = %step.command_id,
            component = %component,
            "Executing: {}",
            exec.command_line
        );
        match self.backend.execute(&step, self.sink.as_ref()).await {
            Ok(()) => {
                let duration = started.elapsed();
                debug!("Command '{}' succeeded in {:?}", step.command_id, duration);
                NodeOutcome {
                    records: vec![StepRecord {
                        command_id: step.command_id,
                        component: Some(component),
                        status: StepStatus::Succeeded,
                        duration,
                    }],
                    result: Ok(()),
                }
            }
            Err(e) => {
                error!("Command '{}' failed: {}", step.command_id, e);
                NodeOutcome::failed(Vec::new(), e)
            }
        }
    }

    async fn run_sequential(&self, label: &str, children: Vec<PlanNode>) -> NodeOutcome {
        let total = children.len();
        let mut records = Vec::new();

        for (index, child) in children.into_iter().enumerate() {
            let outcome = self.clone().run_node(child).await;
            records.extend(outcome.records);
            if let Err(e) = outcome.result {
                let remaining = total - index - 1;
                if remaining > 0 {
                    info!("Skipping {} remaining command(s) of '{}'", remaining, label);
                }
                return NodeOutcome::failed(records, e);
            }
        }

        NodeOutcome {
            records,
            result: Ok(()),
        }
    }

    async fn run_parallel(&self, group: String, children: Vec<PlanNode>) -> NodeOutcome {
        let total = children.len();
        debug!("Starting {} commands of '{}' in parallel", total, group);

        let mut in_flight: FuturesUnordered<_> = children
            .into_iter()
            .map(|child| {
                let label = child.label().to_string();
                let handle = tokio::spawn(self.clone().run_node(child));
                async move { (label, handle.await) }
            })
            .collect();

        let mut records = Vec::new();
        let mut succeeded = Vec::new();
        let mut failures = 0;
        let mut first_failure: Option<(String, DevrunError)> = None;

        loop {
            let next = match self.options.deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, in_flight.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            let pending = in_flight.len();
                            warn!(
                                "Deadline passed waiting on '{}'; leaving {} command(s) running",
                                group, pending
                            );
                            return NodeOutcome::failed(
                                records,
                                ExecError::GroupTimedOut { group, pending }.into(),
                            );
                        }
                    }
                }
                None => in_flight.next().await,
            };
            let Some((label, joined)) = next else {
                break;
            };

            let outcome = joined.unwrap_or_else(|e| {
                NodeOutcome::failed(
                    Vec::new(),
                    DevrunError::Internal(format!("Task for '{}' did not complete: {}", label, e)),
                )
            });
            records.extend(outcome.records);
            match outcome.result {
                Ok(()) => succeeded.push(label),
                Err(e) => {
                    failures += 1;
                    error!("'{}' failed in parallel command '{}': {}", label, group, e);
                    if first_failure.is_none() {
                        first_failure = Some((label, e));
                    }
                }
            }
        }

        let result = match first_failure {
            None => Ok(()),
            Some((label, error)) => Err(group_failure(group, label, error, failures, total, succeeded)),
        };
        NodeOutcome { records, result }
    }
}

/// Fold the first observed failure of a parallel group into the group's error
fn group_failure(
    group: String,
    label: String,
    error: DevrunError,
    failures: usize,
    total: usize,
    succeeded: Vec<String>,
) -> DevrunError {
    let (command, exit_code) = match error {
        DevrunError::Exec(ExecError::CommandFailed {
            command, exit_code, ..
        }) => (command, exit_code),
        DevrunError::Exec(
            e @ (ExecError::DeadlineExceeded { .. } | ExecError::GroupTimedOut { .. }),
        ) => return e.into(),
        _ => (label, None),
    };
    ExecError::CommandFailed {
        command,
        exit_code,
        group: Some(group),
        failures,
        total,
        succeeded,
    }
    .into()
}
