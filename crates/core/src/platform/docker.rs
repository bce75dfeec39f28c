//! Docker CLI engine client

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, instrument};

use super::process::{run_checked, run_streaming};
use super::{ContainerSpec, EngineClient, ExecSpec};
use crate::errors::{PlatformError, Result};
use crate::output::OutputSink;

/// Engine client shelling out to a docker-compatible CLI
#[derive(Debug, Clone)]
pub struct DockerCliClient {
    /// CLI binary path (e.g. "docker" or "podman")
    docker_path: String,
}

impl DockerCliClient {
    pub fn new() -> Self {
        Self::with_path("docker")
    }

    pub fn with_path(docker_path: impl Into<String>) -> Self {
        Self {
            docker_path: docker_path.into(),
        }
    }

    pub fn docker_path(&self) -> &str {
        &self.docker_path
    }

    /// Arguments for `docker run` built from a container spec
    pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];

        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (name, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", name, value));
        }
        for (volume, path) in &spec.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", volume, path));
        }
        if let Some(memory) = &spec.memory_limit {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }
        for port in &spec.ports {
            args.push("--expose".to_string());
            args.push(port.to_string());
        }

        // --entrypoint takes a single executable; the rest of the command
        // line is passed ahead of the image arguments
        let mut trailing = Vec::new();
        if let Some((entrypoint, rest)) = spec.command.split_first() {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
            trailing.extend(rest.iter().cloned());
        }

        args.push(spec.image.clone());
        args.extend(trailing);
        args.extend(spec.args.iter().cloned());
        args
    }

    /// Arguments for `docker exec` built from an exec spec
    pub fn exec_args(container_id: &str, spec: &ExecSpec) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if let Some(dir) = spec.working_dir.as_deref().filter(|d| !d.is_empty()) {
            args.push("-w".to_string());
            args.push(dir.to_string());
        }
        for (name, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", name, value));
        }
        args.push(container_id.to_string());
        args.push("/bin/sh".to_string());
        args.push("-c".to_string());
        args.push(spec.command_line.clone());
        args
    }
}

impl Default for DockerCliClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineClient for DockerCliClient {
    fn name(&self) -> &'static str {
        "docker"
    }

    #[instrument(skip(self))]
    async fn find_container(&self, labels: &[(&str, &str)]) -> Result<Option<String>> {
        let mut args = vec!["ps".to_string(), "-q".to_string()];
        for (key, value) in labels {
            args.push("--filter".to_string());
            args.push(format!("label={}={}", key, value));
        }

        let stdout = run_checked(&self.docker_path, &args, None).await?;
        let id = stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string);
        debug!("Found container: {:?}", id);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn create_volume(&self, name: &str) -> Result<()> {
        let args = vec!["volume".to_string(), "create".to_string(), name.to_string()];
        run_checked(&self.docker_path, &args, None).await?;
        Ok(())
    }

    #[instrument(skip(self, spec), fields(image = %spec.image))]
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        let stdout = run_checked(&self.docker_path, &Self::run_args(spec), None).await?;
        let id = stdout.trim().to_string();
        if id.is_empty() {
            return Err(PlatformError::CliError(format!(
                "{} run did not report a container id",
                self.docker_path
            ))
            .into());
        }
        debug!("Started container {}", id);
        Ok(id)
    }

    #[instrument(skip(self, spec, sink), fields(command = %spec.command_id))]
    async fn exec(&self, container_id: &str, spec: &ExecSpec, sink: &dyn OutputSink) -> Result<i32> {
        let args = Self::exec_args(container_id, spec);
        run_streaming(&self.docker_path, &args, &spec.command_id, sink).await
    }

    #[instrument(skip(self))]
    async fn copy_into(&self, container_id: &str, source: &Path, dest: &str) -> Result<()> {
        let mkdir = vec![
            "exec".to_string(),
            container_id.to_string(),
            "mkdir".to_string(),
            "-p".to_string(),
            dest.to_string(),
        ];
        run_checked(&self.docker_path, &mkdir, None).await?;

        // Trailing "/." copies the directory contents rather than the directory
        let copy = vec![
            "cp".to_string(),
            format!("{}/.", source.display()),
            format!("{}:{}", container_id, dest),
        ];
        run_checked(&self.docker_path, &copy, None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, container_id: &str) -> Result<()> {
        let args = vec!["rm".to_string(), "-f".to_string(), container_id.to_string()];
        run_checked(&self.docker_path, &args, None).await?;
        Ok(())
    }
}
