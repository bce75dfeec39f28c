//! Shared test helpers for core integration tests.

#![allow(dead_code)]

use devrun_core::adapter::{AdapterContext, ComponentAdapter};
use devrun_core::backend::{ClusterBackend, LocalEngineBackend};
use devrun_core::devfile::{
    Command, Component, CompositeCommand, Container, DevfileData, EnvVar, Events, ExecCommand,
    Group, GroupKind,
};
use devrun_core::output::BufferSink;
use devrun_core::platform::mock::{MockCluster, MockEngine};
use std::sync::Arc;

/// Component name used by every test adapter
pub const COMPONENT: &str = "web";
/// Container component exec commands target by default
pub const CONTAINER: &str = "runtime";

/// Exec command running `line` in the default container
pub fn exec(id: &str, line: &str) -> Command {
    Command::Exec(ExecCommand {
        id: id.to_string(),
        command_line: line.to_string(),
        component: CONTAINER.to_string(),
        ..Default::default()
    })
}

/// Exec command with a group
pub fn grouped(id: &str, line: &str, kind: GroupKind, is_default: bool) -> Command {
    Command::Exec(ExecCommand {
        id: id.to_string(),
        command_line: line.to_string(),
        component: CONTAINER.to_string(),
        group: Some(Group { kind, is_default }),
        ..Default::default()
    })
}

/// Composite command over `children`
pub fn composite(id: &str, children: &[&str], parallel: bool) -> Command {
    Command::Composite(CompositeCommand {
        id: id.to_string(),
        commands: children.iter().map(|c| c.to_string()).collect(),
        parallel,
        ..Default::default()
    })
}

/// Source-mounting container with a declared env
pub fn runtime_container() -> Component {
    Component::Container(Container {
        name: CONTAINER.to_string(),
        image: "node:18".to_string(),
        env: vec![EnvVar::new("NODE_ENV", "development")],
        mount_sources: true,
        ..Default::default()
    })
}

/// Devfile with the runtime container and the given commands/events
pub fn devfile(commands: Vec<Command>, events: Events) -> Arc<DevfileData> {
    Arc::new(DevfileData {
        schema_version: "2.0.0".to_string(),
        components: vec![runtime_container()],
        commands,
        events,
        ..Default::default()
    })
}

/// Adapter on a mock local engine with a running runtime container
pub fn local_adapter(
    devfile: Arc<DevfileData>,
) -> (ComponentAdapter, Arc<MockEngine>, Arc<BufferSink>) {
    let engine = MockEngine::new();
    engine.add_component_container(COMPONENT, CONTAINER);
    let sink = Arc::new(BufferSink::new());
    let backend = Arc::new(LocalEngineBackend::new(COMPONENT, engine.clone()));
    let adapter = ComponentAdapter::new(AdapterContext::new(COMPONENT, "/work/web", devfile), backend)
        .with_sink(sink.clone());
    (adapter, engine, sink)
}

/// Adapter on a mock cluster without any running pod
pub fn cluster_adapter(
    devfile: Arc<DevfileData>,
) -> (ComponentAdapter, Arc<MockCluster>, Arc<BufferSink>) {
    let cluster = MockCluster::new("dev");
    let sink = Arc::new(BufferSink::new());
    let backend = Arc::new(ClusterBackend::new(COMPONENT, cluster.clone()));
    let adapter = ComponentAdapter::new(AdapterContext::new(COMPONENT, "/work/web", devfile), backend)
        .with_sink(sink.clone());
    (adapter, cluster, sink)
}
