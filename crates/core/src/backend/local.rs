//! Local container engine backend

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{check_exit, container_command, container_env, PlatformBackend};
use crate::devfile::{Component, Container, DevfileData, DEFAULT_PROJECTS_ROOT};
use crate::errors::{PlatformError, Result};
use crate::output::OutputSink;
use crate::plan::Step;
use crate::platform::{ContainerSpec, EngineClient, ExecSpec, ALIAS_LABEL, COMPONENT_LABEL};

/// Suffix of the volume holding synced project sources
const PROJECTS_VOLUME_SUFFIX: &str = "projects";

/// Runs a component's containers on a local engine
///
/// Each devfile container component maps to one engine container labelled
/// `component=<component name>` and `alias=<container name>`.
pub struct LocalEngineBackend {
    component_name: String,
    client: Arc<dyn EngineClient>,
    projects_root: String,
}

impl LocalEngineBackend {
    pub fn new(component_name: impl Into<String>, client: Arc<dyn EngineClient>) -> Self {
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

    fn volume_name(&self, volume: &str) -> String {
        format!("{}-{}", self.component_name, volume)
    }

    async fn find(&self, container: &str) -> Result<Option<String>> {
        self.client
            .find_container(&[
                (COMPONENT_LABEL, self.component_name.as_str()),
                (ALIAS_LABEL, container),
            ])
            .await
    }

    async fn require(&self, container: &str) -> Result<String> {
        self.find(container).await?.ok_or_else(|| {
            PlatformError::InstanceNotFound {
                component: self.component_name.clone(),
                container: container.to_string(),
            }
            .into()
        })
    }

    /// Engine container spec for a devfile container component
    pub fn container_spec(&self, container: &Container) -> ContainerSpec {
        let mut labels = IndexMap::new();
        labels.insert(COMPONENT_LABEL.to_string(), self.component_name.clone());
        labels.insert(ALIAS_LABEL.to_string(), container.name.clone());

        let mut volumes: Vec<(String, String)> = container
            .volume_mounts
            .iter()
            .map(|m| (self.volume_name(&m.name), m.mount_path()))
            .collect();
        if container.mount_sources {
            volumes.push((
                self.volume_name(PROJECTS_VOLUME_SUFFIX),
                container.source_path(&self.projects_root),
            ));
        }

        ContainerSpec {
            image: container.image.clone(),
            labels,
            env: container_env(container, &self.projects_root),
            command: container_command(container),
            args: container.args.clone(),
            volumes,
            memory_limit: container.memory_limit.clone(),
            ports: container.endpoints.iter().map(|e| e.target_port).collect(),
        }
    }
}

#[async_trait]
impl PlatformBackend for LocalEngineBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, step, sink), fields(command = %step.command_id))]
    async fn execute(&self, step: &Step, sink: &dyn OutputSink) -> Result<()> {
        let Some(exec) = step.exec() else {
            return Ok(());
        };

        let container_id = self.require(&exec.component).await?;
        let spec = ExecSpec::from_step(&step.command_id, exec);
        let exit_code = self.client.exec(&container_id, &spec, sink).await?;
        debug!("Command '{}' exited with {}", step.command_id, exit_code);
        check_exit(&step.command_id, exit_code)
    }

    #[instrument(skip(self, devfile), fields(component = %self.component_name))]
    async fn start(&self, devfile: &DevfileData) -> Result<()> {
        for component in &devfile.components {
            match component {
                Component::Kubernetes(_) | Component::Openshift(_) => {
                    return Err(PlatformError::UnsupportedComponent {
                        name: component.name().to_string(),
                        kind: component.kind().to_string(),
                        backend: self.client.name().to_string(),
                    }
                    .into());
                }
                Component::Plugin(_) => {
                    warn!("Ignoring plugin component '{}'", component.name());
                }
                Component::Container(_) | Component::Volume(_) => {}
            }
        }

        for volume in devfile.volumes() {
            self.client.create_volume(&self.volume_name(&volume.name)).await?;
        }

        for container in devfile.containers() {
            if let Some(id) = self.find(&container.name).await? {
                debug!("Reusing container {} for '{}'", id, container.name);
                continue;
            }
            if container.mount_sources {
                self.client
                    .create_volume(&self.volume_name(PROJECTS_VOLUME_SUFFIX))
                    .await?;
            }
            let id = self.client.run_container(&self.container_spec(container)).await?;
            info!("Started container '{}' ({})", container.name, id);
        }
        Ok(())
    }

    #[instrument(skip(self, devfile), fields(component = %self.component_name))]
    async fn push(&self, devfile: &DevfileData, source: &Path) -> Result<()> {
        for container in devfile.containers().filter(|c| c.mount_sources) {
            let id = self.require(&container.name).await?;
            let dest = container.source_path(&self.projects_root);
            info!("Syncing {} to '{}':{}", source.display(), container.name, dest);
            self.client.copy_into(&id, source, &dest).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, devfile), fields(component = %self.component_name))]
    async fn stop(&self, devfile: &DevfileData) -> Result<()> {
        for container in devfile.containers() {
            match self.find(&container.name).await? {
                Some(id) => {
                    self.client.remove_container(&id).await?;
                    info!("Removed container '{}' ({})", container.name, id);
                }
                None => debug!("No container to remove for '{}'", container.name),
            }
        }
        Ok(())
    }
}
