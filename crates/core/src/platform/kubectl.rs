//! kubectl cluster client

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, instrument};

use super::process::{run_checked, run_streaming};
use super::{ClusterClient, ExecSpec};
use crate::errors::{PlatformError, Result};
use crate::output::OutputSink;

/// Seconds to wait for a deployment rollout
const ROLLOUT_TIMEOUT_SECS: u64 = 300;

/// Cluster client shelling out to kubectl, scoped to one namespace
#[derive(Debug, Clone)]
pub struct KubectlClient {
    kubectl_path: String,
    namespace: String,
}

impl KubectlClient {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_path("kubectl", namespace)
    }

    pub fn with_path(kubectl_path: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kubectl_path: kubectl_path.into(),
            namespace: namespace.into(),
        }
    }

    /// Arguments prefixed with the namespace flag
    fn args<I, S>(&self, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec!["-n".to_string(), self.namespace.clone()];
        args.extend(rest.into_iter().map(Into::into));
        args
    }

    /// Arguments for `kubectl exec`; env and working dir are applied by the script
    pub fn exec_args(&self, pod: &str, container: &str, spec: &ExecSpec) -> Vec<String> {
        self.args([
            "exec".to_string(),
            pod.to_string(),
            "-c".to_string(),
            container.to_string(),
            "--".to_string(),
            "/bin/sh".to_string(),
            "-c".to_string(),
            spec.shell_script(),
        ])
    }
}

#[async_trait]
impl ClusterClient for KubectlClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    #[instrument(skip(self, manifest))]
    async fn apply(&self, manifest: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_string(manifest)
            .map_err(|e| PlatformError::CliError(format!("Failed to serialize manifest: {}", e)))?;
        run_checked(&self.kubectl_path, &self.args(["apply", "-f", "-"]), Some(body.as_str()))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn wait_rollout(&self, deployment: &str) -> Result<()> {
        let args = self.args([
            "rollout".to_string(),
            "status".to_string(),
            format!("deployment/{}", deployment),
            format!("--timeout={}s", ROLLOUT_TIMEOUT_SECS),
        ]);
        run_checked(&self.kubectl_path, &args, None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_pod(&self, selector: &str) -> Result<Option<String>> {
        let args = self.args([
            "get",
            "pods",
            "-l",
            selector,
            "--field-selector=status.phase=Running",
            "-o",
            "name",
        ]);
        let stdout = run_checked(&self.kubectl_path, &args, None).await?;
        let pod = stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(|l| l.trim_start_matches("pod/").to_string());
        debug!("Found pod: {:?}", pod);
        Ok(pod)
    }

    #[instrument(skip(self, spec, sink), fields(command = %spec.command_id))]
    async fn exec(
        &self,
        pod: &str,
        container: &str,
        spec: &ExecSpec,
        sink: &dyn OutputSink,
    ) -> Result<i32> {
        let args = self.exec_args(pod, container, spec);
        run_streaming(&self.kubectl_path, &args, &spec.command_id, sink).await
    }

    #[instrument(skip(self))]
    async fn copy_into(&self, pod: &str, container: &str, source: &Path, dest: &str) -> Result<()> {
        let mkdir = self.args(["exec", pod, "-c", container, "--", "mkdir", "-p", dest]);
        run_checked(&self.kubectl_path, &mkdir, None).await?;

        let copy = self.args([
            "cp".to_string(),
            format!("{}/.", source.display()),
            format!("{}/{}:{}", self.namespace, pod, dest),
            "-c".to_string(),
            container.to_string(),
        ]);
        run_checked(&self.kubectl_path, &copy, None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, kind: &str, selector: &str) -> Result<()> {
        let args = self.args(["delete", kind, "-l", selector, "--ignore-not-found"]);
        run_checked(&self.kubectl_path, &args, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_exec_args_are_namespaced() {
        let client = KubectlClient::new("dev");
        let mut env = IndexMap::new();
        env.insert("PORT".to_string(), "8080".to_string());
        let spec = ExecSpec {
            command_id: "run".to_string(),
            command_line: "npm start".to_string(),
            working_dir: Some("/projects".to_string()),
            env,
        };

        let args = client.exec_args("web-7f9c", "runtime", &spec);
        assert_eq!(&args[..2], &["-n", "dev"]);
        assert_eq!(args[2], "exec");
        assert_eq!(args[3], "web-7f9c");
        assert_eq!(&args[4..6], &["-c", "runtime"]);
        assert_eq!(
            args.last().map(String::as_str),
            Some("export PORT=8080; cd /projects && npm start")
        );
    }

    #[test]
    fn test_namespace_accessor() {
        let client = KubectlClient::with_path("/usr/local/bin/kubectl", "team-a");
        assert_eq!(client.namespace(), "team-a");
    }
}
