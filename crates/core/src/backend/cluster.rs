//! Cluster backend
//!
//! All container components of a devfile run in one pod managed by a
//! Deployment named after the component. Commands exec into the pod's
//! container that matches the step's component.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{check_exit, container_command, container_env, PlatformBackend};
use crate::devfile::{
    Component, Container, DevfileData, ManifestComponent, DEFAULT_PROJECTS_ROOT,
};
use crate::errors::{PlatformError, Result};
use crate::output::OutputSink;
use crate::plan::Step;
use crate::platform::{label_selector, ClusterClient, ExecSpec, COMPONENT_LABEL};

/// Name of the pod volume holding synced project sources
const PROJECTS_VOLUME: &str = "projects";

/// Runs a component as a Deployment on a cluster
pub struct ClusterBackend {
    component_name: String,
    client: Arc<dyn ClusterClient>,
    projects_root: String,
}

impl ClusterBackend {
    pub fn new(component_name: impl Into<String>, client: Arc<dyn ClusterClient>) -> Self {
        Self {
            component_name: component_name.into(),
            client,
            projects_root: DEFAULT_PROJECTS_ROOT.to_string(),
        }
    }

    /// Container path sources are synced under by default
    pub fn with_projects_root(mut self, projects_root: impl Into<String>) -> Self {
        self.projects_root = projects_root.into();
        self
    }

    fn selector(&self) -> String {
        label_selector(&[(COMPONENT_LABEL, self.component_name.as_str())])
    }

    async fn require_pod(&self, container: &str) -> Result<String> {
        self.client
            .find_pod(&self.selector())
            .await?
            .ok_or_else(|| {
                PlatformError::InstanceNotFound {
                    component: self.component_name.clone(),
                    container: container.to_string(),
                }
                .into()
            })
    }

    fn container_manifest(&self, container: &Container) -> Value {
        let env: Vec<Value> = container_env(container, &self.projects_root)
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();

        let mut mounts: Vec<Value> = container
            .volume_mounts
            .iter()
            .map(|m| json!({ "name": m.name, "mountPath": m.mount_path() }))
            .collect();
        if container.mount_sources {
            mounts.push(json!({
                "name": PROJECTS_VOLUME,
                "mountPath": container.source_path(&self.projects_root),
            }));
        }

        let mut manifest = json!({
            "name": container.name,
            "image": container.image,
            "command": container_command(container),
            "args": container.args,
            "env": env,
            "volumeMounts": mounts,
            "ports": container
                .endpoints
                .iter()
                .map(|e| json!({ "name": e.name, "containerPort": e.target_port }))
                .collect::<Vec<_>>(),
        });
        if let Some(memory) = &container.memory_limit {
            manifest["resources"] = json!({ "limits": { "memory": memory } });
        }
        manifest
    }

    /// Deployment manifest holding every container component of the devfile
    pub fn deployment_manifest(&self, devfile: &DevfileData) -> Value {
        let mut volumes: Vec<Value> = devfile
            .volumes()
            .map(|v| json!({ "name": v.name, "emptyDir": {} }))
            .collect();
        if devfile.containers().any(|c| c.mount_sources) {
            volumes.push(json!({ "name": PROJECTS_VOLUME, "emptyDir": {} }));
        }

        let labels = json!({ COMPONENT_LABEL: self.component_name });
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": self.component_name,
                "labels": labels,
            },
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": labels },
                "template": {
                    "metadata": { "labels": labels },
                    "spec": {
                        "containers": devfile
                            .containers()
                            .map(|c| self.container_manifest(c))
                            .collect::<Vec<_>>(),
                        "volumes": volumes,
                    }
                }
            }
        })
    }

    /// Inline manifest of a kubernetes/openshift component, if it carries JSON
    fn inline_manifest(component: &ManifestComponent) -> Option<Value> {
        let inlined = component.inlined.as_deref()?;
        match serde_json::from_str::<Value>(inlined) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    "Skipping component '{}': inline manifest is not JSON ({})",
                    component.name, e
                );
                None
            }
        }
    }
}

#[async_trait]
impl PlatformBackend for ClusterBackend {
    fn name(&self) -> &'static str {
        "cluster"
    }

    #[instrument(skip(self, step, sink), fields(command = %step.command_id))]
    async fn execute(&self, step: &Step, sink: &dyn OutputSink) -> Result<()> {
        let Some(exec) = step.exec() else {
            return Ok(());
        };

        let pod = self.require_pod(&exec.component).await?;
        let spec = ExecSpec::from_step(&step.command_id, exec);
        let exit_code = self.client.exec(&pod, &exec.component, &spec, sink).await?;
        debug!("Command '{}' exited with {}", step.command_id, exit_code);
        check_exit(&step.command_id, exit_code)
    }

    #[instrument(skip(self, devfile), fields(component = %self.component_name, namespace = %self.client.namespace()))]
    async fn start(&self, devfile: &DevfileData) -> Result<()> {
        for component in &devfile.components {
            match component {
                Component::Kubernetes(manifest) | Component::Openshift(manifest) => {
                    if let Some(value) = Self::inline_manifest(manifest) {
                        self.client.apply(&value).await?;
                        info!("Applied manifest component '{}'", manifest.name);
                    } else if manifest.uri.is_some() {
                        warn!("Skipping component '{}': manifest URIs are not fetched", manifest.name);
                    }
                }
                Component::Plugin(_) => warn!("Ignoring plugin component '{}'", component.name()),
                Component::Container(_) | Component::Volume(_) => {}
            }
        }

        if devfile.containers().next().is_none() {
            debug!("No container components to deploy");
            return Ok(());
        }

        self.client.apply(&self.deployment_manifest(devfile)).await?;
        self.client.wait_rollout(&self.component_name).await?;
        info!("Deployment '{}' is ready", self.component_name);
        Ok(())
    }

    #[instrument(skip(self, devfile), fields(component = %self.component_name))]
    async fn push(&self, devfile: &DevfileData, source: &Path) -> Result<()> {
        for container in devfile.containers().filter(|c| c.mount_sources) {
            let pod = self.require_pod(&container.name).await?;
            let dest = container.source_path(&self.projects_root);
            info!("Syncing {} to {}/{}:{}", source.display(), pod, container.name, dest);
            self.client.copy_into(&pod, &container.name, source, &dest).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, _devfile), fields(component = %self.component_name))]
    async fn stop(&self, _devfile: &DevfileData) -> Result<()> {
        self.client.delete("deployment", &self.selector()).await?;
        info!("Deleted deployment '{}'", self.component_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devfile::{EnvVar, Volume, VolumeMount};
    use crate::errors::DevrunError;
    use crate::output::BufferSink;
    use crate::plan::{ExecStep, StepAction};
    use crate::platform::mock::{MockCluster, MockExecResponse};
    use indexmap::IndexMap;

    fn devfile() -> DevfileData {
        DevfileData {
            components: vec![
                Component::Container(Container {
                    name: "runtime".to_string(),
                    image: "node:18".to_string(),
                    env: vec![EnvVar::new("PORT", "3000")],
                    memory_limit: Some("1Gi".to_string()),
                    mount_sources: true,
                    volume_mounts: vec![VolumeMount {
                        name: "cache".to_string(),
                        path: Some("/data".to_string()),
                    }],
                    ..Default::default()
                }),
                Component::Container(Container {
                    name: "tools".to_string(),
                    image: "busybox".to_string(),
                    command: vec!["sleep".to_string(), "infinity".to_string()],
                    ..Default::default()
                }),
                Component::Volume(Volume {
                    name: "cache".to_string(),
                    size: Some("1Gi".to_string()),
                }),
            ],
            ..Default::default()
        }
    }

    fn step(id: &str, component: &str, line: &str) -> Step {
        let mut env = IndexMap::new();
        env.insert("MODE".to_string(), "dev".to_string());
        Step {
            command_id: id.to_string(),
            parallel: false,
            action: StepAction::Exec(ExecStep {
                component: component.to_string(),
                command_line: line.to_string(),
                working_dir: None,
                env,
            }),
        }
    }

    #[test]
    fn test_deployment_manifest() {
        let backend = ClusterBackend::new("web", MockCluster::new("dev"));
        let manifest = backend.deployment_manifest(&devfile());

        assert_eq!(manifest["kind"], "Deployment");
        assert_eq!(manifest["metadata"]["name"], "web");
        assert_eq!(manifest["spec"]["selector"]["matchLabels"]["component"], "web");

        let containers = manifest["spec"]["template"]["spec"]["containers"]
            .as_array()
            .unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0]["name"], "runtime");
        assert_eq!(containers[0]["command"], json!(["tail", "-f", "/dev/null"]));
        assert_eq!(containers[0]["resources"]["limits"]["memory"], "1Gi");
        assert_eq!(containers[0]["volumeMounts"][0]["mountPath"], "/data");
        assert_eq!(containers[0]["volumeMounts"][1]["mountPath"], "/projects");
        assert_eq!(containers[1]["command"], json!(["sleep", "infinity"]));

        let volumes = manifest["spec"]["template"]["spec"]["volumes"]
            .as_array()
            .unwrap();
        assert_eq!(volumes.len(), 2);
    }

    #[tokio::test]
    async fn test_start_execute_stop() {
        let cluster = MockCluster::new("dev");
        cluster.set_exec_response("npm test", MockExecResponse::exit(1));
        let backend = ClusterBackend::new("web", cluster.clone());
        let sink = BufferSink::new();

        backend.start(&devfile()).await.unwrap();
        assert_eq!(cluster.applied_manifests().len(), 1);

        backend
            .execute(&step("run", "tools", "echo hi"), &sink)
            .await
            .unwrap();
        let err = backend
            .execute(&step("test", "runtime", "npm test"), &sink)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));

        let history = cluster.exec_history();
        assert_eq!(history[0].target, "web-pod");
        assert_eq!(history[0].container, "tools");
        assert_eq!(history[0].spec.env.get("MODE").map(String::as_str), Some("dev"));

        backend.stop(&devfile()).await.unwrap();
        assert_eq!(
            cluster.deletions(),
            vec![("deployment".to_string(), "component=web".to_string())]
        );
        assert!(cluster.pods().is_empty());
    }

    #[tokio::test]
    async fn test_execute_without_pod() {
        let backend = ClusterBackend::new("web", MockCluster::new("dev"));
        let err = backend
            .execute(&step("run", "runtime", "true"), &BufferSink::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DevrunError::Platform(PlatformError::InstanceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_push_copies_into_source_containers() {
        let cluster = MockCluster::new("dev");
        cluster.add_component_pod("web");
        let backend = ClusterBackend::new("web", cluster.clone());

        backend.push(&devfile(), Path::new("/work/app")).await.unwrap();
        let copies = cluster.copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].container, "runtime");
        assert_eq!(copies[0].dest, "/projects");
    }

    #[tokio::test]
    async fn test_start_applies_inline_json_manifests() {
        let mut devfile = devfile();
        devfile.components.push(Component::Kubernetes(ManifestComponent {
            name: "db".to_string(),
            inlined: Some(r#"{"kind": "Service", "metadata": {"name": "db"}}"#.to_string()),
            uri: None,
        }));
        let cluster = MockCluster::new("dev");
        let backend = ClusterBackend::new("web", cluster.clone());

        backend.start(&devfile).await.unwrap();
        let applied = cluster.applied_manifests();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0]["kind"], "Service");
        assert_eq!(applied[1]["kind"], "Deployment");
    }
}
