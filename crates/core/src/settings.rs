//! Adapter settings
//!
//! Settings are read from an optional TOML file and overridden by environment
//! variables; the CLI applies its own flags last. Precedence is
//! CLI flag > environment > file > default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument};

use crate::devfile::DEFAULT_PROJECTS_ROOT;
use crate::errors::{ConfigError, Result};

/// Environment variable selecting the push target
pub const PUSH_TARGET_ENV: &str = "DEVRUN_PUSH_TARGET";
/// Environment variable naming the cluster namespace
pub const NAMESPACE_ENV: &str = "DEVRUN_NAMESPACE";
/// Environment variable overriding the docker binary
pub const DOCKER_PATH_ENV: &str = "DEVRUN_DOCKER_PATH";
/// Environment variable overriding the kubectl binary
pub const KUBECTL_PATH_ENV: &str = "DEVRUN_KUBECTL_PATH";

/// Where a component's containers run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushTarget {
    /// Local container engine
    Docker,
    /// Cluster namespace
    #[default]
    Kube,
}

impl PushTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Kube => "kube",
        }
    }

    /// Whether this target runs on the local engine
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Docker)
    }
}

impl std::str::FromStr for PushTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "kube" | "kubernetes" => Ok(Self::Kube),
            _ => Err(ConfigError::Validation {
                message: format!("Unknown push target: {}. Supported targets: docker, kube", s),
            }),
        }
    }
}

impl std::fmt::Display for PushTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings used to build component adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterSettings {
    pub push_target: PushTarget,
    /// Cluster namespace; required for the kube target
    pub namespace: Option<String>,
    pub docker_path: String,
    pub kubectl_path: String,
    /// Projects root inside containers
    pub projects_root: String,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            push_target: PushTarget::default(),
            namespace: None,
            docker_path: "docker".to_string(),
            kubectl_path: "kubectl".to_string(),
            projects_root: DEFAULT_PROJECTS_ROOT.to_string(),
        }
    }
}

impl AdapterSettings {
    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    #[instrument]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        debug!("Loaded settings file {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Settings from an optional file with the process environment applied
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by environment variable name
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(target) = lookup(PUSH_TARGET_ENV) {
            self.push_target = target.parse()?;
        }
        if let Some(namespace) = lookup(NAMESPACE_ENV) {
            self.namespace = Some(namespace);
        }
        if let Some(path) = lookup(DOCKER_PATH_ENV) {
            self.docker_path = path;
        }
        if let Some(path) = lookup(KUBECTL_PATH_ENV) {
            self.kubectl_path = path;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check field invariants
    pub fn validate(&self) -> Result<()> {
        if self.docker_path.trim().is_empty() || self.kubectl_path.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "Tool paths must not be empty".to_string(),
            }
            .into());
        }
        if !self.projects_root.starts_with('/') {
            return Err(ConfigError::Validation {
                message: format!(
                    "projects_root must be an absolute container path, got '{}'",
                    self.projects_root
                ),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DevrunError;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = AdapterSettings::default();
        assert_eq!(settings.push_target, PushTarget::Kube);
        assert_eq!(settings.docker_path, "docker");
        assert_eq!(settings.projects_root, "/projects");
        assert!(settings.namespace.is_none());
    }

    #[test]
    fn test_push_target_parse() {
        assert_eq!("docker".parse::<PushTarget>().unwrap(), PushTarget::Docker);
        assert_eq!("Kubernetes".parse::<PushTarget>().unwrap(), PushTarget::Kube);
        assert!("podman".parse::<PushTarget>().is_err());
        assert_eq!(PushTarget::Docker.to_string(), "docker");
        assert!(PushTarget::Docker.is_local());
    }

    #[test]
    fn test_from_toml() {
        let settings = AdapterSettings::from_toml_str(
            r#"
push_target = "docker"
docker_path = "/usr/bin/podman"
"#,
        )
        .unwrap();
        assert_eq!(settings.push_target, PushTarget::Docker);
        assert_eq!(settings.docker_path, "/usr/bin/podman");
        assert_eq!(settings.kubectl_path, "kubectl");
    }

    #[test]
    fn test_toml_errors() {
        let err = AdapterSettings::from_toml_str("push_target = 3").unwrap_err();
        assert!(matches!(err, DevrunError::Config(ConfigError::Parsing { .. })));

        let err = AdapterSettings::from_toml_str("projects_root = \"relative\"").unwrap_err();
        assert!(matches!(err, DevrunError::Config(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let env = HashMap::from([
            (PUSH_TARGET_ENV, "kube"),
            (NAMESPACE_ENV, "team-a"),
            (DOCKER_PATH_ENV, ""),
        ]);
        let settings = AdapterSettings::from_toml_str("push_target = \"docker\"")
            .unwrap()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.push_target, PushTarget::Kube);
        assert_eq!(settings.namespace.as_deref(), Some("team-a"));
        // empty values are ignored
        assert_eq!(settings.docker_path, "docker");
    }

    #[test]
    fn test_invalid_override() {
        let err = AdapterSettings::default()
            .with_overrides(|key| (key == PUSH_TARGET_ENV).then(|| "nowhere".to_string()))
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace = \"dev\"").unwrap();
        let settings = AdapterSettings::load(file.path()).unwrap();
        assert_eq!(settings.namespace.as_deref(), Some("dev"));

        let err = AdapterSettings::load(Path::new("/nonexistent/devrun.toml")).unwrap_err();
        assert!(matches!(err, DevrunError::Config(ConfigError::NotFound { .. })));
    }
}
