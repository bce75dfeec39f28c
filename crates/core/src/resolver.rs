//! Command graph resolution
//!
//! Expands a command id, an event sequence or a group's default command into
//! an [`ExecutionPlan`]. Composite commands are expanded depth-first in their
//! declared order. All referential checks (unknown ids, cycles, exec commands
//! targeting something other than a container) happen here, before anything
//! is executed.

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::devfile::{Command, CompositeCommand, DevfileData, EventKind, ExecCommand, GroupKind};
use crate::errors::ResolveError;
use crate::plan::{
    ExecStep, ExecutionPlan, NonExecutableKind, PlanNode, PlanTarget, Step, StepAction,
};

type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Resolves devfile commands into execution plans
///
/// Borrows the document read-only, so any number of resolvers may run
/// concurrently against the same document. Nothing is cached between calls.
#[derive(Debug, Clone, Copy)]
pub struct CommandResolver<'a> {
    devfile: &'a DevfileData,
}

impl<'a> CommandResolver<'a> {
    pub fn new(devfile: &'a DevfileData) -> Self {
        Self { devfile }
    }

    /// Resolve a command or composite id
    #[instrument(skip(self))]
    pub fn resolve(&self, id: &str) -> ResolveResult<ExecutionPlan> {
        let mut path = Vec::new();
        let root = self.resolve_node(id, None, false, &mut path)?;
        debug!("Resolved command {} into {} step(s)", id, root.step_count());
        Ok(ExecutionPlan {
            target: PlanTarget::Command(id.to_string()),
            root,
        })
    }

    /// Resolve every command bound to an event
    ///
    /// The top level of an event sequence is always sequential, whatever the
    /// parallelism of the composites inside it.
    #[instrument(skip(self))]
    pub fn resolve_event(&self, kind: EventKind) -> ResolveResult<ExecutionPlan> {
        let mut children = Vec::new();
        for id in self.devfile.event_commands(kind) {
            let mut path = Vec::new();
            children.push(self.resolve_node(id, Some(kind.as_str()), false, &mut path)?);
        }
        debug!(
            "Resolved event {} into {} command(s)",
            kind.as_str(),
            children.len()
        );
        Ok(ExecutionPlan {
            target: PlanTarget::Event(kind),
            root: PlanNode::Sequential { id: None, children },
        })
    }

    /// Resolve the default command of a group kind
    #[instrument(skip(self))]
    pub fn resolve_default(&self, kind: GroupKind) -> ResolveResult<ExecutionPlan> {
        let command = self.default_command(kind)?;
        let mut path = Vec::new();
        let root = self.resolve_node(command.id(), None, false, &mut path)?;
        Ok(ExecutionPlan {
            target: PlanTarget::Default(kind),
            root,
        })
    }

    /// Resolve a name that is either an event name or a command id
    ///
    /// Event names take precedence over command ids.
    pub fn resolve_target(&self, name: &str) -> ResolveResult<ExecutionPlan> {
        match name.parse::<EventKind>() {
            Ok(kind) => self.resolve_event(kind),
            Err(_) => self.resolve(name),
        }
    }

    /// Whether any command belongs to the group kind
    pub fn has_group(&self, kind: GroupKind) -> bool {
        self.devfile
            .commands
            .iter()
            .any(|c| c.group().map(|g| g.kind) == Some(kind))
    }

    /// Select the default command of a group kind
    ///
    /// Exactly one `isDefault` candidate wins. Without any marked default, a
    /// lone candidate is selected. Every other situation (no candidates,
    /// several untagged candidates, several marked defaults) is ambiguous.
    pub fn default_command(&self, kind: GroupKind) -> ResolveResult<&'a Command> {
        let candidates: Vec<&Command> = self
            .devfile
            .commands
            .iter()
            .filter(|c| c.group().map(|g| g.kind) == Some(kind))
            .collect();

        let defaults: Vec<&Command> = candidates
            .iter()
            .copied()
            .filter(|c| c.group().map(|g| g.is_default).unwrap_or(false))
            .collect();

        match (defaults.as_slice(), candidates.as_slice()) {
            ([single], _) => Ok(*single),
            ([], [single]) => Ok(*single),
            ([], _) => Err(ambiguous(kind, &candidates)),
            (_, _) => Err(ambiguous(kind, &defaults)),
        }
    }

    fn resolve_node(
        &self,
        id: &str,
        referenced_by: Option<&str>,
        parallel: bool,
        path: &mut Vec<String>,
    ) -> ResolveResult<PlanNode> {
        if path.iter().any(|p| p == id) {
            let mut chain = path.clone();
            chain.push(id.to_string());
            return Err(ResolveError::CyclicComposite {
                id: id.to_string(),
                chain: chain.join(" -> "),
            });
        }

        let command = self
            .devfile
            .command(id)
            .ok_or_else(|| ResolveError::UnknownCommand {
                id: id.to_string(),
                referenced_by: referenced_by.map(str::to_string),
            })?;

        match command {
            Command::Exec(exec) => Ok(PlanNode::Step(Step {
                command_id: exec.id.clone(),
                parallel,
                action: StepAction::Exec(self.bind_exec(exec)?),
            })),
            Command::Composite(composite) => {
                path.push(id.to_string());
                let node = self.resolve_composite(composite, path);
                path.pop();
                node
            }
            Command::VscodeLaunch(c) => Ok(non_executable(
                &c.id,
                parallel,
                NonExecutableKind::VscodeLaunch,
            )),
            Command::VscodeTask(c) => Ok(non_executable(
                &c.id,
                parallel,
                NonExecutableKind::VscodeTask,
            )),
        }
    }

    fn resolve_composite(
        &self,
        composite: &CompositeCommand,
        path: &mut Vec<String>,
    ) -> ResolveResult<PlanNode> {
        let mut children = Vec::with_capacity(composite.commands.len());
        for child in &composite.commands {
            children.push(self.resolve_node(
                child,
                Some(&composite.id),
                composite.parallel,
                path,
            )?);
        }

        debug!(
            "Expanded composite {} (parallel: {}) into {} child node(s)",
            composite.id,
            composite.parallel,
            children.len()
        );

        if composite.parallel {
            Ok(PlanNode::Parallel {
                id: composite.id.clone(),
                children,
            })
        } else {
            Ok(PlanNode::Sequential {
                id: Some(composite.id.clone()),
                children,
            })
        }
    }

    fn bind_exec(&self, exec: &ExecCommand) -> ResolveResult<ExecStep> {
        let component = self.devfile.component(&exec.component).ok_or_else(|| {
            ResolveError::InvalidComponent {
                command: exec.id.clone(),
                component: exec.component.clone(),
                reason: "component not found in devfile".to_string(),
            }
        })?;

        let container = component
            .as_container()
            .ok_or_else(|| ResolveError::InvalidComponent {
                command: exec.id.clone(),
                component: exec.component.clone(),
                reason: format!("{} components cannot run commands", component.kind()),
            })?;

        let mut env: IndexMap<String, String> = container.env_map();
        for var in &exec.env {
            env.insert(var.name.clone(), var.value.clone());
        }
        if let Some(name) = env.keys().find(|name| !is_env_name(name)) {
            return Err(ResolveError::InvalidEnvName {
                command: exec.id.clone(),
                name: name.clone(),
            });
        }

        Ok(ExecStep {
            component: container.name.clone(),
            command_line: exec.command_line.clone(),
            working_dir: exec.working_dir.clone().filter(|d| !d.is_empty()),
            env,
        })
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the names a POSIX shell can export
fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn non_executable(id: &str, parallel: bool, kind: NonExecutableKind) -> PlanNode {
    PlanNode::Step(Step {
        command_id: id.to_string(),
        parallel,
        action: StepAction::NonExecutable { kind },
    })
}

fn ambiguous(kind: GroupKind, commands: &[&Command]) -> ResolveError {
    ResolveError::AmbiguousDefaultCommand {
        kind: kind.as_str().to_string(),
        candidates: commands.iter().map(|c| c.id().to_string()).collect(),
    }
}
