//! Component adapter
//!
//! A [`ComponentAdapter`] binds one component (name, working directory and
//! devfile) to one platform backend for its whole lifetime. Every operation
//! resolves its plan completely before anything runs, so resolution errors
//! never leave a half-executed sequence behind.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::backend::PlatformBackend;
use crate::devfile::{DevfileData, EventKind, GroupKind};
use crate::errors::Result;
use crate::executor::{PlanExecutor, RunOptions, RunReport};
use crate::output::{OutputSink, TracingSink};
use crate::plan::ExecutionPlan;
use crate::resolver::CommandResolver;

/// What an adapter operates on
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub component_name: String,
    /// Local working directory of the component
    pub context: PathBuf,
    pub devfile: Arc<DevfileData>,
}

impl AdapterContext {
    pub fn new(
        component_name: impl Into<String>,
        context: impl Into<PathBuf>,
        devfile: Arc<DevfileData>,
    ) -> Self {
        Self {
            component_name: component_name.into(),
            context: context.into(),
            devfile,
        }
    }
}

/// Parameters of a push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushParameters {
    /// Directory to sync; the adapter context when unset
    pub source: Option<PathBuf>,
    /// Run the default build and run commands after syncing
    pub run_commands: bool,
}

/// Commands run by a push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// `None` when no build command exists or commands were not requested
    pub build: Option<RunReport>,
    pub run: Option<RunReport>,
}

/// Runs devfile commands of one component on its bound backend
pub struct ComponentAdapter {
    context: AdapterContext,
    backend: Arc<dyn PlatformBackend>,
    sink: Arc<dyn OutputSink>,
    options: RunOptions,
}

impl ComponentAdapter {
    pub fn new(context: AdapterContext, backend: Arc<dyn PlatformBackend>) -> Self {
        Self {
            context,
            backend,
            sink: Arc::new(TracingSink),
            options: RunOptions::default(),
        }
    }

    /// Send command output to this sink instead of the log
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn component_name(&self) -> &str {
        &self.context.component_name
    }

    pub fn context(&self) -> &AdapterContext {
        &self.context
    }

    pub fn devfile(&self) -> &DevfileData {
        &self.context.devfile
    }

    /// Name of the bound backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn resolver(&self) -> CommandResolver<'_> {
        CommandResolver::new(&self.context.devfile)
    }

    fn executor(&self) -> PlanExecutor {
        PlanExecutor::new(self.backend.clone(), self.sink.clone()).with_options(self.options)
    }

    /// Resolve an event name or command id without executing anything
    pub fn plan(&self, target: &str) -> Result<ExecutionPlan> {
        Ok(self.resolver().resolve_target(target)?)
    }

    /// Resolve and run one command or composite
    #[instrument(skip(self), fields(component = %self.context.component_name))]
    pub async fn run_command(&self, id: &str) -> Result<RunReport> {
        let plan = self.resolver().resolve(id)?;
        self.executor().run(&plan).await
    }

    /// Resolve and run the commands bound to a lifecycle event, in order
    #[instrument(skip(self), fields(component = %self.context.component_name))]
    pub async fn run_event(&self, kind: EventKind) -> Result<RunReport> {
        let plan = self.resolver().resolve_event(kind)?;
        self.executor().run(&plan).await
    }

    /// Resolve and run the default command of a group kind
    #[instrument(skip(self), fields(component = %self.context.component_name))]
    pub async fn run_default(&self, kind: GroupKind) -> Result<RunReport> {
        let plan = self.resolver().resolve_default(kind)?;
        self.executor().run(&plan).await
    }

    /// Provision the component, then run its postStart commands
    #[instrument(skip(self), fields(component = %self.context.component_name))]
    pub async fn start(&self) -> Result<RunReport> {
        let plan = self.resolver().resolve_event(EventKind::PostStart)?;
        self.backend.start(&self.context.devfile).await?;
        info!("Component '{}' started", self.component_name());
        self.executor().run(&plan).await
    }

    /// Run the preStop commands, then tear the component down
    ///
    /// A failing preStop command aborts the stop and leaves the component running.
    #[instrument(skip(self), fields(component = %self.context.component_name))]
    pub async fn stop(&self) -> Result<RunReport> {
        let plan = self.resolver().resolve_event(EventKind::PreStop)?;
        let report = self.executor().run(&plan).await?;
        self.backend.stop(&self.context.devfile).await?;
        info!("Component '{}' stopped", self.component_name());
        Ok(report)
    }

    /// Sync sources, then optionally run the default build and run commands
    #[instrument(skip(self), fields(component = %self.context.component_name))]
    pub async fn push(&self, params: PushParameters) -> Result<PushReport> {
        let resolver = self.resolver();
        let (build_plan, run_plan) = if params.run_commands {
            let build = if resolver.has_group(GroupKind::Build) {
                Some(resolver.resolve_default(GroupKind::Build)?)
            } else {
                debug!("No build command defined, skipping build");
                None
            };
            (build, Some(resolver.resolve_default(GroupKind::Run)?))
        } else {
            (None, None)
        };

        let source = params
            .source
            .unwrap_or_else(|| self.context.context.clone());
        self.backend.push(&self.context.devfile, &source).await?;
        info!("Synced {} for '{}'", source.display(), self.component_name());

        let executor = self.executor();
        let mut report = PushReport::default();
        if let Some(plan) = build_plan {
            report.build = Some(executor.run(&plan).await?);
        }
        if let Some(plan) = run_plan {
            report.run = Some(executor.run(&plan).await?);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalEngineBackend;
    use crate::devfile::{
        Command, Component, Container, EnvVar, Events, ExecCommand, Group,
    };
    use crate::errors::{DevrunError, ResolveError};
    use crate::output::BufferSink;
    use crate::platform::mock::{MockEngine, MockExecResponse};

    fn exec(id: &str, line: &str, group: Option<(GroupKind, bool)>) -> Command {
        Command::Exec(ExecCommand {
            id: id.to_string(),
            command_line: line.to_string(),
            component: "runtime".to_string(),
            env: vec![EnvVar::new("STEP", id)],
            group: group.map(|(kind, is_default)| Group { kind, is_default }),
            ..Default::default()
        })
    }

    fn devfile(commands: Vec<Command>, events: Events) -> Arc<DevfileData> {
        Arc::new(DevfileData {
            components: vec![Component::Container(Container {
                name: "runtime".to_string(),
                image: "node:18".to_string(),
                mount_sources: true,
                ..Default::default()
            })],
            commands,
            events,
            ..Default::default()
        })
    }

    fn adapter(devfile: Arc<DevfileData>) -> (ComponentAdapter, Arc<MockEngine>) {
        let engine = MockEngine::new();
        let backend = Arc::new(LocalEngineBackend::new("web", engine.clone()));
        let adapter = ComponentAdapter::new(AdapterContext::new("web", "/work/web", devfile), backend)
            .with_sink(Arc::new(BufferSink::new()));
        (adapter, engine)
    }

    #[tokio::test]
    async fn test_start_provisions_then_runs_post_start() {
        let events = Events {
            post_start: vec!["init".to_string()],
            ..Default::default()
        };
        let (adapter, engine) = adapter(devfile(vec![exec("init", "npm ci", None)], events));

        let report = adapter.start().await.unwrap();
        assert_eq!(report.executed_ids(), vec!["init"]);
        assert_eq!(engine.containers().len(), 1);
        assert_eq!(engine.executed_command_lines(), vec!["npm ci"]);
    }

    #[tokio::test]
    async fn test_stop_runs_pre_stop_before_teardown() {
        let events = Events {
            pre_stop: vec!["save".to_string()],
            ..Default::default()
        };
        let (adapter, engine) = adapter(devfile(vec![exec("save", "sync", None)], events));
        engine.add_component_container("web", "runtime");

        adapter.stop().await.unwrap();
        assert_eq!(engine.executed_command_lines(), vec!["sync"]);
        assert!(engine.containers().is_empty());
    }

    #[tokio::test]
    async fn test_failed_pre_stop_keeps_component() {
        let events = Events {
            pre_stop: vec!["save".to_string()],
            ..Default::default()
        };
        let (adapter, engine) = adapter(devfile(vec![exec("save", "sync", None)], events));
        engine.add_component_container("web", "runtime");
        engine.set_exec_response("sync", MockExecResponse::exit(1));

        assert!(adapter.stop().await.is_err());
        assert_eq!(engine.containers().len(), 1);
    }

    #[tokio::test]
    async fn test_push_runs_build_then_run() {
        let commands = vec![
            exec("compile", "make", Some((GroupKind::Build, true))),
            exec("serve", "./app", Some((GroupKind::Run, true))),
        ];
        let (adapter, engine) = adapter(devfile(commands, Events::default()));
        engine.add_component_container("web", "runtime");

        let report = adapter
            .push(PushParameters {
                source: None,
                run_commands: true,
            })
            .await
            .unwrap();
        assert!(report.build.is_some());
        assert_eq!(engine.executed_command_lines(), vec!["make", "./app"]);
        assert_eq!(engine.copies()[0].source, PathBuf::from("/work/web"));
    }

    #[tokio::test]
    async fn test_push_without_build_command() {
        let commands = vec![exec("serve", "./app", Some((GroupKind::Run, false)))];
        let (adapter, engine) = adapter(devfile(commands, Events::default()));
        engine.add_component_container("web", "runtime");

        let report = adapter
            .push(PushParameters {
                source: Some(PathBuf::from("/elsewhere")),
                run_commands: true,
            })
            .await
            .unwrap();
        assert!(report.build.is_none());
        assert_eq!(engine.executed_command_lines(), vec!["./app"]);
    }

    #[tokio::test]
    async fn test_push_resolution_error_before_sync() {
        let (adapter, engine) = adapter(devfile(Vec::new(), Events::default()));
        engine.add_component_container("web", "runtime");

        let err = adapter
            .push(PushParameters {
                source: None,
                run_commands: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DevrunError::Resolve(ResolveError::AmbiguousDefaultCommand { .. })
        ));
        assert!(engine.copies().is_empty());
    }

    #[test]
    fn test_plan_accepts_events_and_commands() {
        let events = Events {
            post_start: vec!["init".to_string()],
            ..Default::default()
        };
        let (adapter, _) = adapter(devfile(vec![exec("init", "npm ci", None)], events));

        assert_eq!(adapter.plan("postStart").unwrap().step_ids(), vec!["init"]);
        assert_eq!(adapter.plan("init").unwrap().step_ids(), vec!["init"]);
        assert!(adapter.plan("missing").is_err());
        assert_eq!(adapter.backend_name(), "local");
    }
}
