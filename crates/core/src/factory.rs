//! Component adapter factory
//!
//! Picks the backend for a component from its platform context: the local
//! engine when the push target is docker, otherwise the cluster, which needs a
//! namespace.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::adapter::{AdapterContext, ComponentAdapter};
use crate::backend::{ClusterBackend, LocalEngineBackend, PlatformBackend};
use crate::devfile::DevfileData;
use crate::errors::{PlatformError, Result};
use crate::platform::{DockerCliClient, KubectlClient};
use crate::settings::{AdapterSettings, PushTarget};

/// Cluster coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterContext {
    pub namespace: String,
}

/// Where and how a component should run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformContext {
    pub target: PushTarget,
    /// Required for the kube target
    pub cluster: Option<ClusterContext>,
    pub settings: AdapterSettings,
}

impl PlatformContext {
    /// Context derived from settings alone
    pub fn from_settings(settings: AdapterSettings) -> Self {
        Self {
            target: settings.push_target,
            cluster: settings
                .namespace
                .clone()
                .map(|namespace| ClusterContext { namespace }),
            settings,
        }
    }
}

/// Build an adapter bound to the backend selected by the platform context
#[instrument(skip(devfile, platform), fields(target = %platform.target))]
pub fn new_component_adapter(
    component_name: impl Into<String> + std::fmt::Debug,
    context: impl Into<PathBuf> + std::fmt::Debug,
    devfile: Arc<DevfileData>,
    platform: PlatformContext,
) -> Result<ComponentAdapter> {
    let component_name = component_name.into();
    let projects_root = platform.settings.projects_root.clone();

    let backend: Arc<dyn PlatformBackend> = match platform.target {
        PushTarget::Docker => {
            debug!("Using local engine at {}", platform.settings.docker_path);
            let client = DockerCliClient::with_path(platform.settings.docker_path.clone());
            Arc::new(
                LocalEngineBackend::new(component_name.clone(), Arc::new(client))
                    .with_projects_root(projects_root),
            )
        }
        PushTarget::Kube => {
            let namespace = platform
                .cluster
                .as_ref()
                .map(|c| c.namespace.trim())
                .filter(|ns| !ns.is_empty())
                .ok_or_else(|| PlatformError::MissingPlatformContext {
                    target: PushTarget::Kube.to_string(),
                    reason: "Error retrieving context for Kubernetes: no namespace set".to_string(),
                })?;
            debug!("Using cluster namespace {}", namespace);
            let client = KubectlClient::with_path(platform.settings.kubectl_path.clone(), namespace);
            Arc::new(
                ClusterBackend::new(component_name.clone(), Arc::new(client))
                    .with_projects_root(projects_root),
            )
        }
    };

    Ok(with_backend(
        AdapterContext::new(component_name, context, devfile),
        backend,
    ))
}

/// Build an adapter around an already constructed backend
pub fn with_backend(context: AdapterContext, backend: Arc<dyn PlatformBackend>) -> ComponentAdapter {
    ComponentAdapter::new(context, backend)
}
