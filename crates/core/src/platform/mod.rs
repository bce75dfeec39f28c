//! Platform clients
//!
//! Backends talk to the outside world through two narrow client traits:
//! [`EngineClient`] for a local container engine and [`ClusterClient`] for a
//! cluster. The CLI implementations shell out to `docker` and `kubectl`; the
//! [`mock`] module provides in-memory implementations for tests.

pub mod docker;
pub mod kubectl;
pub mod mock;
pub mod process;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;

use crate::errors::Result;
use crate::output::OutputSink;
use crate::plan::ExecStep;

pub use docker::DockerCliClient;
pub use kubectl::KubectlClient;

/// Label carrying the adapter component name
pub const COMPONENT_LABEL: &str = "component";
/// Label carrying the devfile container component name
pub const ALIAS_LABEL: &str = "alias";

/// Command run inside a container when the devfile does not override it
///
/// Keeps the container alive so commands can be executed into it.
pub const KEEP_ALIVE_COMMAND: &[&str] = &["tail", "-f", "/dev/null"];

/// Request to run one command line inside a running container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    /// Id used to label output lines
    pub command_id: String,
    pub command_line: String,
    pub working_dir: Option<String>,
    pub env: IndexMap<String, String>,
}

impl ExecSpec {
    pub fn from_step(command_id: &str, exec: &ExecStep) -> Self {
        Self {
            command_id: command_id.to_string(),
            command_line: exec.command_line.clone(),
            working_dir: exec.working_dir.clone(),
            env: exec.env.clone(),
        }
    }

    /// Shell script applying env and working directory before the command line
    ///
    /// Used by clients whose exec primitive cannot set them natively.
    pub fn shell_script(&self) -> String {
        let mut script = String::new();
        for (name, value) in &self.env {
            script.push_str(&format!("export {}={}; ", name, shell_words::quote(value)));
        }
        if let Some(dir) = self.working_dir.as_deref().filter(|d| !d.is_empty()) {
            script.push_str(&format!("cd {} && ", shell_words::quote(dir)));
        }
        script.push_str(&self.command_line);
        script
    }
}

/// Request to create a container on the local engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub labels: IndexMap<String, String>,
    pub env: IndexMap<String, String>,
    /// Entrypoint override; first element is the executable
    pub command: Vec<String>,
    pub args: Vec<String>,
    /// (volume name, mount path) pairs
    pub volumes: Vec<(String, String)>,
    pub memory_limit: Option<String>,
    pub ports: Vec<i32>,
}

/// Local container engine operations used by the local backend
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Engine name for logs and errors
    fn name(&self) -> &'static str;

    /// Id of a running container carrying all the given labels
    async fn find_container(&self, labels: &[(&str, &str)]) -> Result<Option<String>>;

    /// Create a named volume, succeeding if it already exists
    async fn create_volume(&self, name: &str) -> Result<()>;

    /// Create and start a detached container, returning its id
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Run a command line in a container, streaming output; returns the exit code
    async fn exec(&self, container_id: &str, spec: &ExecSpec, sink: &dyn OutputSink) -> Result<i32>;

    /// Copy the contents of a local directory to a path inside a container
    async fn copy_into(&self, container_id: &str, source: &Path, dest: &str) -> Result<()>;

    /// Force-remove a container
    async fn remove_container(&self, container_id: &str) -> Result<()>;
}

/// Cluster operations used by the cluster backend
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Namespace every operation is scoped to
    fn namespace(&self) -> &str;

    /// Create or update a resource from its manifest
    async fn apply(&self, manifest: &serde_json::Value) -> Result<()>;

    /// Wait until the named deployment has rolled out
    async fn wait_rollout(&self, deployment: &str) -> Result<()>;

    /// Name of a running pod matching the label selector
    async fn find_pod(&self, selector: &str) -> Result<Option<String>>;

    /// Run a command line in a pod container, streaming output; returns the exit code
    async fn exec(
        &self,
        pod: &str,
        container: &str,
        spec: &ExecSpec,
        sink: &dyn OutputSink,
    ) -> Result<i32>;

    /// Copy the contents of a local directory to a path inside a pod container
    async fn copy_into(&self, pod: &str, container: &str, source: &Path, dest: &str) -> Result<()>;

    /// Delete resources of a kind matching the label selector
    async fn delete(&self, kind: &str, selector: &str) -> Result<()>;
}

/// Label selector in `key=value[,key=value]` form
pub fn label_selector(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_script_applies_env_and_dir() {
        let mut env = IndexMap::new();
        env.insert("GREETING".to_string(), "hello world".to_string());
        env.insert("MODE".to_string(), "dev".to_string());
        let spec = ExecSpec {
            command_id: "run".to_string(),
            command_line: "npm start".to_string(),
            working_dir: Some("/projects/app".to_string()),
            env,
        };
        assert_eq!(
            spec.shell_script(),
            "export GREETING='hello world'; export MODE=dev; cd /projects/app && npm start"
        );
    }

    #[test]
    fn test_shell_script_plain() {
        let spec = ExecSpec {
            command_id: "run".to_string(),
            command_line: "make".to_string(),
            working_dir: Some(String::new()),
            env: IndexMap::new(),
        };
        assert_eq!(spec.shell_script(), "make");
    }

    #[test]
    fn test_label_selector() {
        assert_eq!(
            label_selector(&[("component", "web"), ("alias", "runtime")]),
            "component=web,alias=runtime"
        );
    }
}
