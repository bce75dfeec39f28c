//! Helpers shared by the subcommands: devfile discovery, adapter construction
//! and console output.

use anyhow::{Context, Result};
use devrun_core::devfile::DevfileData;
use devrun_core::errors::{ConfigError, DevrunError};
use devrun_core::output::{OutputSink, OutputStream};
use devrun_core::settings::{AdapterSettings, PushTarget};
use devrun_core::{new_component_adapter, ComponentAdapter, PlatformContext, RunOptions};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cli::OutputFormat;

/// Devfile names probed in the context directory, in order
const DEVFILE_NAMES: &[&str] = &["devfile.yaml", ".devfile.yaml", "devfile.json"];

/// Options common to every subcommand
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub devfile: Option<PathBuf>,
    pub component: Option<String>,
    pub context: Option<PathBuf>,
    pub push_target: Option<PushTarget>,
    pub namespace: Option<String>,
    pub settings: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub output: OutputFormat,
}

impl GlobalArgs {
    /// Context directory, the working directory when unset
    pub fn context_dir(&self) -> PathBuf {
        self.context.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve the devfile path, probing the context directory when unset
    pub fn devfile_path(&self) -> std::result::Result<PathBuf, DevrunError> {
        if let Some(path) = &self.devfile {
            return Ok(path.clone());
        }
        let context = self.context_dir();
        DEVFILE_NAMES
            .iter()
            .map(|name| context.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                ConfigError::NotFound {
                    path: context.join(DEVFILE_NAMES[0]).display().to_string(),
                }
                .into()
            })
    }

    /// Component name: flag, then devfile metadata, then the context directory name
    pub fn component_name(&self, devfile: &DevfileData) -> String {
        if let Some(name) = &self.component {
            return name.clone();
        }
        if let Some(name) = devfile.metadata.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let context = self.context_dir();
        std::fs::canonicalize(&context)
            .unwrap_or(context)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "component".to_string())
    }

    /// Settings from file and environment, with flags applied last
    pub fn settings(&self) -> Result<AdapterSettings> {
        let mut settings = AdapterSettings::resolve(self.settings.as_deref())?;
        if let Some(target) = self.push_target {
            settings.push_target = target;
        }
        if let Some(namespace) = self.namespace.as_ref().filter(|ns| !ns.trim().is_empty()) {
            settings.namespace = Some(namespace.clone());
        }
        Ok(settings)
    }

    pub fn run_options(&self) -> RunOptions {
        self.timeout
            .map(RunOptions::with_timeout)
            .unwrap_or_default()
    }
}

/// Parse a devfile; YAML parsing also accepts JSON documents
pub fn load_devfile(path: &Path) -> Result<DevfileData> {
    if !path.is_file() {
        return Err(DevrunError::from(ConfigError::NotFound {
            path: path.display().to_string(),
        })
        .into());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read devfile {}", path.display()))?;
    let parse_error = |message: String| {
        DevrunError::from(ConfigError::Parsing {
            message: format!("{}: {}", path.display(), message),
        })
    };
    // Commands and components are single-key maps, which serde_yaml only
    // accepts for enums through an intermediate value
    let document: serde_json::Value =
        serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
    let devfile: DevfileData =
        serde_json::from_value(document).map_err(|e| parse_error(e.to_string()))?;
    debug!(
        "Loaded devfile {} with {} commands",
        path.display(),
        devfile.commands.len()
    );
    Ok(devfile)
}

/// Load the devfile named by the global options
pub fn load_global_devfile(global: &GlobalArgs) -> Result<DevfileData> {
    load_devfile(&global.devfile_path()?)
}

/// Build the adapter selected by the settings and flags
pub fn build_adapter(global: &GlobalArgs) -> Result<ComponentAdapter> {
    let devfile = load_global_devfile(global)?;
    let component_name = global.component_name(&devfile);
    let platform = PlatformContext::from_settings(global.settings()?);
    debug!(
        "Building adapter for '{}' on {}",
        component_name, platform.target
    );

    let adapter = new_component_adapter(
        component_name,
        global.context_dir(),
        Arc::new(devfile),
        platform,
    )?;
    Ok(adapter
        .with_sink(Arc::new(ConsoleSink))
        .with_options(global.run_options()))
}

/// Print a serializable result as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", json)?;
    Ok(())
}

/// Mirrors command output to the console, prefixed with the command id
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn write_line(&self, command_id: &str, stream: OutputStream, line: &str) {
        // Broken pipes are not worth failing the run for
        let _ = match stream {
            OutputStream::Stdout => writeln!(std::io::stdout().lock(), "[{}] {}", command_id, line),
            OutputStream::Stderr => writeln!(std::io::stderr().lock(), "[{}] {}", command_id, line),
        };
    }
}
