//! Platform backends
//!
//! A [`PlatformBackend`] runs resolved steps inside the running instances of
//! a component and provisions, syncs and tears those instances down. The
//! adapter binds exactly one backend for its lifetime.

pub mod cluster;
pub mod local;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;

use crate::devfile::{Container, DevfileData};
use crate::errors::{ExecError, Result};
use crate::output::OutputSink;
use crate::plan::Step;
use crate::platform::KEEP_ALIVE_COMMAND;

pub use cluster::ClusterBackend;
pub use local::LocalEngineBackend;

/// Environment variable naming the projects root inside containers
pub const PROJECTS_ROOT_ENV: &str = "PROJECTS_ROOT";
/// Environment variable naming where sources are synced inside a container
pub const PROJECT_SOURCE_ENV: &str = "PROJECT_SOURCE";

/// Execution platform for a component
#[async_trait]
pub trait PlatformBackend: Send + Sync {
    /// Backend name for logs and errors
    fn name(&self) -> &'static str;

    /// Run one step, streaming its output into the sink
    ///
    /// Non-zero exit status is reported as [`ExecError::CommandFailed`].
    /// Steps without an exec payload are no-ops.
    async fn execute(&self, step: &Step, sink: &dyn OutputSink) -> Result<()>;

    /// Provision the component's containers
    async fn start(&self, devfile: &DevfileData) -> Result<()>;

    /// Copy the source directory into every container that mounts sources
    async fn push(&self, devfile: &DevfileData, source: &Path) -> Result<()>;

    /// Tear the component's containers down
    async fn stop(&self, devfile: &DevfileData) -> Result<()>;
}

/// Map an exit code to the step outcome
pub(crate) fn check_exit(command_id: &str, exit_code: i32) -> Result<()> {
    if exit_code == 0 {
        Ok(())
    } else {
        Err(ExecError::command_failed(command_id, exit_code).into())
    }
}

/// Declared env plus the project variables for source-mounting containers
pub(crate) fn container_env(container: &Container, projects_root: &str) -> IndexMap<String, String> {
    let mut env = container.env_map();
    if container.mount_sources {
        env.entry(PROJECTS_ROOT_ENV.to_string())
            .or_insert_with(|| projects_root.to_string());
        env.entry(PROJECT_SOURCE_ENV.to_string())
            .or_insert_with(|| container.source_path(projects_root));
    }
    env
}

/// Entrypoint of a container, keeping it alive when nothing is declared
pub(crate) fn container_command(container: &Container) -> Vec<String> {
    if container.command.is_empty() && container.args.is_empty() {
        KEEP_ALIVE_COMMAND.iter().map(|s| s.to_string()).collect()
    } else {
        container.command.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devfile::EnvVar;

    #[test]
    fn test_container_env_adds_project_variables() {
        let container = Container {
            name: "runtime".to_string(),
            env: vec![EnvVar::new("A", "1")],
            mount_sources: true,
            source_mapping: Some("/src".to_string()),
            ..Default::default()
        };
        let env = container_env(&container, "/projects");
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
        assert_eq!(env.get(PROJECTS_ROOT_ENV).map(String::as_str), Some("/projects"));
        assert_eq!(env.get(PROJECT_SOURCE_ENV).map(String::as_str), Some("/src"));
    }

    #[test]
    fn test_container_env_without_sources() {
        let container = Container {
            name: "db".to_string(),
            ..Default::default()
        };
        assert!(container_env(&container, "/projects").is_empty());
    }

    #[test]
    fn test_container_command_keep_alive() {
        let idle = Container::default();
        assert_eq!(container_command(&idle), vec!["tail", "-f", "/dev/null"]);

        let with_args = Container {
            args: vec!["--serve".to_string()],
            ..Default::default()
        };
        assert!(container_command(&with_args).is_empty());
    }

    #[test]
    fn test_check_exit() {
        assert!(check_exit("a", 0).is_ok());
        let err = check_exit("a", 2).unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
    }
}
