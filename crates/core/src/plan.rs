//! Execution plans
//!
//! The resolver turns devfile commands into an explicit tree of [`PlanNode`]s:
//! leaf steps, sequential groups and parallel groups. The tree is independent
//! of the devfile representation and is rebuilt for every invocation.

use indexmap::IndexMap;
use serde::Serialize;

use crate::devfile::{EventKind, GroupKind};

/// What a plan was built for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "camelCase")]
pub enum PlanTarget {
    /// A single command or composite id
    Command(String),
    /// A lifecycle event sequence
    Event(EventKind),
    /// The default command of a group kind
    Default(GroupKind),
}

impl std::fmt::Display for PlanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(id) => write!(f, "command {}", id),
            Self::Event(kind) => write!(f, "event {}", kind),
            Self::Default(kind) => write!(f, "default {} command", kind),
        }
    }
}

/// Resolved plan for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub target: PlanTarget,
    pub root: PlanNode,
}

impl ExecutionPlan {
    /// All leaf steps in depth-first declared order
    pub fn steps(&self) -> Vec<&Step> {
        let mut steps = Vec::new();
        self.root.collect_steps(&mut steps);
        steps
    }

    /// Ids of the leaf steps in depth-first declared order
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps().iter().map(|s| s.command_id.as_str()).collect()
    }
}

/// Node of the plan tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlanNode {
    /// Leaf command
    Step(Step),
    /// Children run one at a time in order, stopping at the first failure
    Sequential {
        /// Composite id, `None` for the top level of an event sequence
        id: Option<String>,
        children: Vec<PlanNode>,
    },
    /// Children run concurrently; the group waits for all of them
    Parallel { id: String, children: Vec<PlanNode> },
}

impl PlanNode {
    /// Identifier used when reporting on this node
    pub fn label(&self) -> &str {
        match self {
            Self::Step(step) => &step.command_id,
            Self::Sequential { id, .. } => id.as_deref().unwrap_or("<sequence>"),
            Self::Parallel { id, .. } => id,
        }
    }

    /// Number of leaf steps below this node
    pub fn step_count(&self) -> usize {
        match self {
            Self::Step(_) => 1,
            Self::Sequential { children, .. } | Self::Parallel { children, .. } => {
                children.iter().map(PlanNode::step_count).sum()
            }
        }
    }

    fn collect_steps<'a>(&'a self, out: &mut Vec<&'a Step>) {
        match self {
            Self::Step(step) => out.push(step),
            Self::Sequential { children, .. } | Self::Parallel { children, .. } => {
                for child in children {
                    child.collect_steps(out);
                }
            }
        }
    }
}

/// Leaf of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub command_id: String,
    /// Runs concurrently with its siblings (parent composite is parallel)
    pub parallel: bool,
    pub action: StepAction,
}

impl Step {
    /// The exec payload, if this step runs a process
    pub fn exec(&self) -> Option<&ExecStep> {
        match &self.action {
            StepAction::Exec(exec) => Some(exec),
            StepAction::NonExecutable { .. } => None,
        }
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepAction {
    /// Shell command line run inside a container
    Exec(ExecStep),
    /// IDE-directed command reported as a no-op
    NonExecutable { kind: NonExecutableKind },
}

/// IDE-directed command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NonExecutableKind {
    VscodeLaunch,
    VscodeTask,
}

/// Exec payload bound to a resolved container component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecStep {
    pub component: String,
    pub command_line: String,
    pub working_dir: Option<String>,
    /// Container environment with the command's overrides merged over it
    pub env: IndexMap<String, String>,
}
