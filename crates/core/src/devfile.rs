//! Devfile document model
//!
//! In-memory representation of an already-resolved devfile (schema 2.0.0):
//! commands, components, projects and event bindings. Parsing and the
//! parent/plugin overlay merge happen outside this crate; the document
//! arrives flat and is treated as read-only for the lifetime of an adapter.
//!
//! The serde derives mirror the devfile JSON layout so an external caller
//! can deserialize a document directly. No schema validation is performed.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::ResolveError;

/// Default location of project sources inside a container
pub const DEFAULT_PROJECTS_ROOT: &str = "/projects";

/// Devfile 2.0.0 document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevfileData {
    /// Devfile schema version
    #[serde(default)]
    pub schema_version: String,
    /// Optional metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Projects worked on in the workspace
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Workspace components (containers, manifests, plugins, volumes)
    #[serde(default)]
    pub components: Vec<Component>,
    /// Predefined workspace commands
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Bindings of commands to lifecycle events
    #[serde(default)]
    pub events: Events,
}

impl DevfileData {
    /// Look up a command by id
    pub fn command(&self, id: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.id() == id)
    }

    /// Look up a component by name
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name() == name)
    }

    /// Look up a container component by name
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.component(name).and_then(Component::as_container)
    }

    /// All container components, in declaration order
    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.components.iter().filter_map(Component::as_container)
    }

    /// All volume components, in declaration order
    pub fn volumes(&self) -> impl Iterator<Item = &Volume> {
        self.components.iter().filter_map(|c| match c {
            Component::Volume(v) => Some(v),
            _ => None,
        })
    }

    /// Command ids bound to a lifecycle event, in execution order
    pub fn event_commands(&self, kind: EventKind) -> &[String] {
        match kind {
            EventKind::PreStart => &self.events.pre_start,
            EventKind::PostStart => &self.events.post_start,
            EventKind::PreStop => &self.events.pre_stop,
            EventKind::PostStop => &self.events.post_stop,
        }
    }
}

/// Optional devfile metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Kind of command group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Build,
    Run,
    Test,
    Debug,
}

impl GroupKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Run => "run",
            Self::Test => "test",
            Self::Debug => "debug",
        }
    }
}

impl FromStr for GroupKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(Self::Build),
            "run" => Ok(Self::Run),
            "test" => Ok(Self::Test),
            "debug" => Ok(Self::Debug),
            _ => Err(format!(
                "Unknown command group kind: {}. Supported kinds: build, run, test, debug",
                s
            )),
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Group a command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub kind: GroupKind,
    #[serde(default)]
    pub is_default: bool,
}

/// Environment variable declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A devfile command, keyed by its variant name in JSON
/// (`{"exec": {...}}`, `{"composite": {...}}`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// CLI command executed in a component container
    Exec(ExecCommand),
    /// Several sub-commands executed sequentially or concurrently
    Composite(CompositeCommand),
    /// IDE launch configuration, not executed by the engine
    VscodeLaunch(VscodeCommand),
    /// IDE task, not executed by the engine
    VscodeTask(VscodeCommand),
}

impl Command {
    /// Command identifier
    pub fn id(&self) -> &str {
        match self {
            Self::Exec(c) => &c.id,
            Self::Composite(c) => &c.id,
            Self::VscodeLaunch(c) | Self::VscodeTask(c) => &c.id,
        }
    }

    /// Group the command belongs to, if any
    pub fn group(&self) -> Option<&Group> {
        match self {
            Self::Exec(c) => c.group.as_ref(),
            Self::Composite(c) => c.group.as_ref(),
            Self::VscodeLaunch(c) | Self::VscodeTask(c) => c.group.as_ref(),
        }
    }

    /// Variant name as used in the devfile
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exec(_) => "exec",
            Self::Composite(_) => "composite",
            Self::VscodeLaunch(_) => "vscodeLaunch",
            Self::VscodeTask(_) => "vscodeTask",
        }
    }
}

/// Exec command definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCommand {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The actual command-line string
    #[serde(default)]
    pub command_line: String,
    /// Component the command runs in
    #[serde(default)]
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Overrides merged over the container's declared environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// Composite command definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeCommand {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Ids of the commands that comprise this composite, in order
    #[serde(default)]
    pub commands: Vec<String>,
    /// Whether the sub-commands run concurrently
    #[serde(default)]
    pub parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// VS Code launch/task command definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VscodeCommand {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inlined: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

/// A devfile component, keyed by its variant name in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Component {
    Container(Container),
    Kubernetes(ManifestComponent),
    Openshift(ManifestComponent),
    Plugin(PluginComponent),
    Volume(Volume),
}

impl Component {
    /// Component name
    pub fn name(&self) -> &str {
        match self {
            Self::Container(c) => &c.name,
            Self::Kubernetes(c) | Self::Openshift(c) => &c.name,
            Self::Plugin(c) => c.name.as_deref().unwrap_or_default(),
            Self::Volume(c) => &c.name,
        }
    }

    /// Variant name as used in the devfile
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Container(_) => "container",
            Self::Kubernetes(_) => "kubernetes",
            Self::Openshift(_) => "openshift",
            Self::Plugin(_) => "plugin",
            Self::Volume(_) => "volume",
        }
    }

    /// The container definition, if this is a runnable component
    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Self::Container(c) => Some(c),
            _ => None,
        }
    }
}

/// Workspace container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub image: String,
    /// Overrides the image entrypoint when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    /// Whether project sources are transferred into this container
    #[serde(default)]
    pub mount_sources: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mapping: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
}

impl Container {
    /// Declared environment in declaration order
    pub fn env_map(&self) -> IndexMap<String, String> {
        self.env
            .iter()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect()
    }

    /// Path sources are synced to, defaulting to the projects root
    pub fn source_path(&self, projects_root: &str) -> String {
        self.source_mapping
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| projects_root.to_string())
    }
}

/// Volume mounted into a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Name of a volume component
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl VolumeMount {
    /// Mount path, `/<name>` when omitted
    pub fn mount_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/{}", self.name))
    }
}

/// Exposed container endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    pub target_port: i32,
}

/// Kubernetes/OpenShift manifest component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestComponent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inlined: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Plugin component (already merged; kept for completeness)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginComponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
}

/// Volume shared by several containers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Lifecycle event bindings; each list holds command ids in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Events {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_start: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_start: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_stop: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_stop: Vec<String>,
}

/// Lifecycle trigger points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    PreStart,
    PostStart,
    PreStop,
    PostStop,
}

impl EventKind {
    /// Get the event name as used in the devfile
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreStart => "preStart",
            Self::PostStart => "postStart",
            Self::PreStop => "preStop",
            Self::PostStop => "postStop",
        }
    }

    /// All events in lifecycle order
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::PreStart,
            EventKind::PostStart,
            EventKind::PreStop,
            EventKind::PostStop,
        ]
    }
}

impl FromStr for EventKind {
    type Err = ResolveError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ResolveError::UnknownEvent {
                name: s.to_string(),
            })
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Project worked on in the workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<ProjectSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<ProjectSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<ProjectSource>,
}

impl Project {
    /// Path relative to the projects root, defaulting to the project name
    pub fn clone_path(&self) -> &str {
        self.clone_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Git, GitHub or zip project source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_checkout_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DevfileData {
        serde_json::from_value(json!({
            "schemaVersion": "2.0.0",
            "metadata": { "name": "nodejs" },
            "projects": [
                { "name": "web", "git": { "location": "https://example.com/web.git" } }
            ],
            "components": [
                { "container": {
                    "name": "runtime",
                    "image": "node:18",
                    "mountSources": true,
                    "env": [{ "name": "PORT", "value": "3000" }],
                    "volumeMounts": [{ "name": "cache" }]
                } },
                { "volume": { "name": "cache", "size": "1Gi" } }
            ],
            "commands": [
                { "exec": {
                    "id": "install",
                    "commandLine": "npm install",
                    "component": "runtime",
                    "group": { "kind": "build", "isDefault": true }
                } },
                { "composite": { "id": "all", "commands": ["install"], "parallel": true } },
                { "vscodeLaunch": { "id": "debug-launch", "inlined": "{}" } }
            ],
            "events": { "postStart": ["install"] }
        }))
        .unwrap()
    }

    #[test]
    fn test_deserialize_document() {
        let devfile = sample();
        assert_eq!(devfile.schema_version, "2.0.0");
        assert_eq!(devfile.metadata.name.as_deref(), Some("nodejs"));
        assert_eq!(devfile.commands.len(), 3);
        assert_eq!(devfile.components.len(), 2);

        let install = devfile.command("install").unwrap();
        assert_eq!(install.kind(), "exec");
        assert_eq!(install.group().unwrap().kind, GroupKind::Build);
        assert!(install.group().unwrap().is_default);

        match devfile.command("all").unwrap() {
            Command::Composite(c) => {
                assert!(c.parallel);
                assert_eq!(c.commands, vec!["install".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(devfile.command("debug-launch").unwrap().kind(), "vscodeLaunch");
        assert!(devfile.command("missing").is_none());
    }

    #[test]
    fn test_component_lookups() {
        let devfile = sample();
        assert!(devfile.container("runtime").is_some());
        assert!(devfile.container("cache").is_none());
        assert_eq!(devfile.component("cache").unwrap().kind(), "volume");
        assert_eq!(devfile.containers().count(), 1);
        assert_eq!(devfile.volumes().count(), 1);

        let runtime = devfile.container("runtime").unwrap();
        assert_eq!(runtime.env_map().get("PORT").map(String::as_str), Some("3000"));
        assert_eq!(runtime.source_path(DEFAULT_PROJECTS_ROOT), "/projects");
        assert_eq!(runtime.volume_mounts[0].mount_path(), "/cache");
    }

    #[test]
    fn test_event_commands() {
        let devfile = sample();
        assert_eq!(
            devfile.event_commands(EventKind::PostStart),
            &["install".to_string()]
        );
        assert!(devfile.event_commands(EventKind::PreStop).is_empty());
    }

    #[test]
    fn test_event_kind_from_str() {
        assert_eq!("preStart".parse::<EventKind>().unwrap(), EventKind::PreStart);
        assert_eq!("poststop".parse::<EventKind>().unwrap(), EventKind::PostStop);
        assert!(matches!(
            "onAttach".parse::<EventKind>(),
            Err(ResolveError::UnknownEvent { .. })
        ));
    }

    #[test]
    fn test_group_kind_from_str() {
        assert_eq!("run".parse::<GroupKind>().unwrap(), GroupKind::Run);
        assert_eq!("DEBUG".parse::<GroupKind>().unwrap(), GroupKind::Debug);
        assert!("deploy".parse::<GroupKind>().is_err());
        assert_eq!(GroupKind::Test.to_string(), "test");
    }

    #[test]
    fn test_project_clone_path_defaults_to_name() {
        let devfile = sample();
        assert_eq!(devfile.projects[0].clone_path(), "web");
    }
}
