//! In-memory platform clients for testing adapter and executor flows
//!
//! [`MockEngine`] and [`MockCluster`] implement the client traits without a
//! container engine or cluster. Exec responses are configured per command
//! line (exit code, output lines, delay, transport failure) and every call is
//! recorded so tests can assert on ordering and concurrency.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{label_selector, ClusterClient, ContainerSpec, EngineClient, ExecSpec};
use crate::errors::{PlatformError, Result};
use crate::output::{OutputSink, OutputStream};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configured outcome of an exec call
#[derive(Debug, Clone, Default)]
pub struct MockExecResponse {
    /// Exit code to return
    pub exit_code: i32,
    /// Simulated execution time
    pub delay: Option<Duration>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Fail the exec itself with a platform error instead of returning a code
    pub transport_error: Option<String>,
}

impl MockExecResponse {
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_stdout(mut self, line: impl Into<String>) -> Self {
        self.stdout.push(line.into());
        self
    }

    pub fn with_stderr(mut self, line: impl Into<String>) -> Self {
        self.stderr.push(line.into());
        self
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            transport_error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Record of an exec call for verification in tests
#[derive(Debug, Clone)]
pub struct MockExecCall {
    /// Container id (engine) or pod name (cluster)
    pub target: String,
    /// Container name inside the pod; empty for the engine
    pub container: String,
    pub spec: ExecSpec,
    pub started: Instant,
    pub finished: Instant,
}

/// Record of a source copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCopy {
    pub target: String,
    pub container: String,
    pub source: PathBuf,
    pub dest: String,
}

/// Exec response table and call history shared by both mocks
#[derive(Debug, Default)]
struct ExecState {
    default_response: Mutex<MockExecResponse>,
    responses: Mutex<HashMap<String, MockExecResponse>>,
    history: Mutex<Vec<MockExecCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ExecState {
    async fn exec(
        &self,
        target: &str,
        container: &str,
        spec: &ExecSpec,
        sink: &dyn OutputSink,
    ) -> Result<i32> {
        let response = lock(&self.responses)
            .get(&spec.command_line)
            .cloned()
            .unwrap_or_else(|| lock(&self.default_response).clone());

        let started = Instant::now();
        let now_running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_running, Ordering::SeqCst);

        debug!(
            "Mock exec of '{}' on {} (delay {:?})",
            spec.command_line, target, response.delay
        );
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        for line in &response.stdout {
            sink.write_line(&spec.command_id, OutputStream::Stdout, line);
        }
        for line in &response.stderr {
            sink.write_line(&spec.command_id, OutputStream::Stderr, line);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        lock(&self.history).push(MockExecCall {
            target: target.to_string(),
            container: container.to_string(),
            spec: spec.clone(),
            started,
            finished: Instant::now(),
        });

        match response.transport_error {
            Some(message) => Err(PlatformError::CliError(message).into()),
            None => Ok(response.exit_code),
        }
    }
}

/// Check labels against a `key=value[,key=value]` selector
fn matches_selector(labels: &HashMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .all(|part| match part.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(part),
        })
}

macro_rules! exec_controls {
    () => {
        /// Response for exec calls without a specific entry
        pub fn set_default_response(&self, response: MockExecResponse) {
            *lock(&self.exec.default_response) = response;
        }

        /// Response for exec calls running exactly this command line
        pub fn set_exec_response(&self, command_line: impl Into<String>, response: MockExecResponse) {
            lock(&self.exec.responses).insert(command_line.into(), response);
        }

        /// Exec calls in completion order
        pub fn exec_history(&self) -> Vec<MockExecCall> {
            lock(&self.exec.history).clone()
        }

        /// Command lines executed, in completion order
        pub fn executed_command_lines(&self) -> Vec<String> {
            self.exec_history()
                .into_iter()
                .map(|c| c.spec.command_line)
                .collect()
        }

        /// Highest number of exec calls observed running at once
        pub fn max_concurrent_execs(&self) -> usize {
            self.exec.max_in_flight.load(Ordering::SeqCst)
        }

        /// Source copies performed
        pub fn copies(&self) -> Vec<MockCopy> {
            lock(&self.copies).clone()
        }
    };
}

/// Container known to the mock engine
#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub spec: Option<ContainerSpec>,
}

impl MockContainer {
    pub fn new(id: impl Into<String>, labels: &[(&str, &str)]) -> Self {
        Self {
            id: id.into(),
            image: "mock:latest".to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            spec: None,
        }
    }
}

/// In-memory local engine
#[derive(Debug, Default)]
pub struct MockEngine {
    exec: ExecState,
    containers: Mutex<Vec<MockContainer>>,
    volumes: Mutex<Vec<String>>,
    copies: Mutex<Vec<MockCopy>>,
    next_id: AtomicUsize,
    /// Simulate an engine that cannot be reached
    unavailable: std::sync::atomic::AtomicBool,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    exec_controls!();

    pub fn add_container(&self, container: MockContainer) {
        lock(&self.containers).push(container);
    }

    /// Add a running container for a devfile container component
    pub fn add_component_container(&self, component: &str, alias: &str) -> String {
        let id = format!("{}-{}-id", component, alias);
        self.add_container(MockContainer::new(
            id.clone(),
            &[(super::COMPONENT_LABEL, component), (super::ALIAS_LABEL, alias)],
        ));
        id
    }

    pub fn containers(&self) -> Vec<MockContainer> {
        lock(&self.containers).clone()
    }

    pub fn volumes(&self) -> Vec<String> {
        lock(&self.volumes).clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PlatformError::NotInstalled {
                tool: "docker".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl EngineClient for MockEngine {
    fn name(&self) -> &'static str {
        "mock-engine"
    }

    async fn find_container(&self, labels: &[(&str, &str)]) -> Result<Option<String>> {
        self.check_available()?;
        let selector = label_selector(labels);
        Ok(lock(&self.containers)
            .iter()
            .find(|c| matches_selector(&c.labels, &selector))
            .map(|c| c.id.clone()))
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.check_available()?;
        let mut volumes = lock(&self.volumes);
        if !volumes.iter().any(|v| v == name) {
            volumes.push(name.to_string());
        }
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.check_available()?;
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.containers).push(MockContainer {
            id: id.clone(),
            image: spec.image.clone(),
            labels: spec
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            spec: Some(spec.clone()),
        });
        Ok(id)
    }

    async fn exec(&self, container_id: &str, spec: &ExecSpec, sink: &dyn OutputSink) -> Result<i32> {
        self.check_available()?;
        self.exec.exec(container_id, "", spec, sink).await
    }

    async fn copy_into(&self, container_id: &str, source: &Path, dest: &str) -> Result<()> {
        self.check_available()?;
        lock(&self.copies).push(MockCopy {
            target: container_id.to_string(),
            container: String::new(),
            source: source.to_path_buf(),
            dest: dest.to_string(),
        });
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.check_available()?;
        lock(&self.containers).retain(|c| c.id != container_id);
        Ok(())
    }
}

/// Pod known to the mock cluster
#[derive(Debug, Clone)]
pub struct MockPod {
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// In-memory cluster scoped to one namespace
#[derive(Debug)]
pub struct MockCluster {
    namespace: String,
    exec: ExecState,
    pods: Mutex<Vec<MockPod>>,
    manifests: Mutex<Vec<serde_json::Value>>,
    copies: Mutex<Vec<MockCopy>>,
    deletions: Mutex<Vec<(String, String)>>,
}

impl MockCluster {
    pub fn new(namespace: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.into(),
            exec: ExecState::default(),
            pods: Mutex::new(Vec::new()),
            manifests: Mutex::new(Vec::new()),
            copies: Mutex::new(Vec::new()),
            deletions: Mutex::new(Vec::new()),
        })
    }

    exec_controls!();

    /// Add a running pod for an adapter component
    pub fn add_component_pod(&self, component: &str) -> String {
        let name = format!("{}-pod", component);
        lock(&self.pods).push(MockPod {
            name: name.clone(),
            labels: HashMap::from([(super::COMPONENT_LABEL.to_string(), component.to_string())]),
        });
        name
    }

    pub fn pods(&self) -> Vec<MockPod> {
        lock(&self.pods).clone()
    }

    /// Manifests applied, in order
    pub fn applied_manifests(&self) -> Vec<serde_json::Value> {
        lock(&self.manifests).clone()
    }

    /// (kind, selector) pairs deleted, in order
    pub fn deletions(&self) -> Vec<(String, String)> {
        lock(&self.deletions).clone()
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn apply(&self, manifest: &serde_json::Value) -> Result<()> {
        lock(&self.manifests).push(manifest.clone());

        // Deployments get a running pod carrying the template labels
        if manifest["kind"] == "Deployment" {
            let name = manifest["metadata"]["name"].as_str().unwrap_or("deployment");
            let labels: HashMap<String, String> = manifest["spec"]["template"]["metadata"]
                ["labels"]
                .as_object()
                .map(|map| {
                    map.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            let mut pods = lock(&self.pods);
            let pod_name = format!("{}-pod", name);
            if !pods.iter().any(|p| p.name == pod_name) {
                pods.push(MockPod {
                    name: pod_name,
                    labels,
                });
            }
        }
        Ok(())
    }

    async fn wait_rollout(&self, _deployment: &str) -> Result<()> {
        Ok(())
    }

    async fn find_pod(&self, selector: &str) -> Result<Option<String>> {
        Ok(lock(&self.pods)
            .iter()
            .find(|p| matches_selector(&p.labels, selector))
            .map(|p| p.name.clone()))
    }

    async fn exec(
        &self,
        pod: &str,
        container: &str,
        spec: &ExecSpec,
        sink: &dyn OutputSink,
    ) -> Result<i32> {
        self.exec.exec(pod, container, spec, sink).await
    }

    async fn copy_into(&self, pod: &str, container: &str, source: &Path, dest: &str) -> Result<()> {
        lock(&self.copies).push(MockCopy {
            target: pod.to_string(),
            container: container.to_string(),
            source: source.to_path_buf(),
            dest: dest.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, kind: &str, selector: &str) -> Result<()> {
        lock(&self.deletions).push((kind.to_string(), selector.to_string()));
        if kind == "deployment" {
            lock(&self.pods).retain(|p| !matches_selector(&p.labels, selector));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::BufferSink;
    use indexmap::IndexMap;

    fn spec(line: &str) -> ExecSpec {
        ExecSpec {
            command_id: line.to_string(),
            command_line: line.to_string(),
            working_dir: None,
            env: IndexMap::new(),
        }
    }

    #[test]
    fn test_matches_selector() {
        let labels = HashMap::from([
            ("component".to_string(), "web".to_string()),
            ("alias".to_string(), "runtime".to_string()),
        ]);
        assert!(matches_selector(&labels, "component=web"));
        assert!(matches_selector(&labels, "component=web,alias"));
        assert!(!matches_selector(&labels, "component=web,alias=tools"));
        assert!(!matches_selector(&labels, "missing"));
    }

    #[tokio::test]
    async fn test_engine_exec_response_and_history() {
        let engine = MockEngine::new();
        let id = engine.add_component_container("web", "runtime");
        engine.set_exec_response("false", MockExecResponse::exit(1).with_stdout("boom"));

        let sink = BufferSink::new();
        assert_eq!(engine.exec(&id, &spec("true"), &sink).await.unwrap(), 0);
        assert_eq!(engine.exec(&id, &spec("false"), &sink).await.unwrap(), 1);

        assert_eq!(engine.executed_command_lines(), vec!["true", "false"]);
        assert_eq!(sink.lines_for("false"), vec!["boom"]);
        assert_eq!(
            engine
                .find_container(&[("component", "web"), ("alias", "runtime")])
                .await
                .unwrap(),
            Some(id)
        );
    }

    #[tokio::test]
    async fn test_engine_unavailable() {
        let engine = MockEngine::new();
        engine.set_unavailable(true);
        assert!(engine.find_container(&[("component", "web")]).await.is_err());
    }

    #[tokio::test]
    async fn test_cluster_apply_creates_pod_and_delete_removes_it() {
        let cluster = MockCluster::new("dev");
        let manifest = serde_json::json!({
            "kind": "Deployment",
            "metadata": { "name": "web" },
            "spec": { "template": { "metadata": { "labels": { "component": "web" } } } }
        });
        cluster.apply(&manifest).await.unwrap();
        assert_eq!(
            cluster.find_pod("component=web").await.unwrap(),
            Some("web-pod".to_string())
        );

        cluster.delete("deployment", "component=web").await.unwrap();
        assert!(cluster.find_pod("component=web").await.unwrap().is_none());
        assert_eq!(cluster.deletions().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let cluster = MockCluster::new("dev");
        cluster.set_default_response(MockExecResponse::transport_error("connection refused"));
        let err = cluster
            .exec("pod", "runtime", &spec("ls"), &BufferSink::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
