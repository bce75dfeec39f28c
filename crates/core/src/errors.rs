//! Error types and handling
//!
//! The error taxonomy is split by domain (resolution, execution, platform,
//! configuration). Each domain enum is wrapped in the main [`DevrunError`] so
//! callers can match on the domain or render the message directly.
//!
//! Resolution errors are always raised before any process is launched.
//! Execution errors preserve partial results (which siblings of a parallel
//! group succeeded) so the caller can render an actionable message.

use thiserror::Error;

/// Errors raised while turning a command id or event into an execution plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The identifier is not defined in the devfile
    #[error("{}", unknown_command_message(.id, .referenced_by))]
    UnknownCommand {
        id: String,
        /// Composite command or event that referenced the missing id
        referenced_by: Option<String>,
    },

    /// A composite command includes itself, directly or transitively
    #[error("Cycle detected in composite command '{id}': {chain}")]
    CyclicComposite { id: String, chain: String },

    /// No unique default command could be selected for a group kind
    #[error("{}", ambiguous_default_message(.kind, .candidates))]
    AmbiguousDefaultCommand {
        kind: String,
        /// Candidate command ids considered (empty when none exist)
        candidates: Vec<String>,
    },

    /// An exec command targets a component that is missing or not a container
    #[error("Command '{command}' targets component '{component}': {reason}")]
    InvalidComponent {
        command: String,
        component: String,
        reason: String,
    },

    /// An environment variable name is not a shell identifier
    #[error("Command '{command}' sets invalid environment variable name '{name}'")]
    InvalidEnvName { command: String, name: String },

    /// Unknown lifecycle event name
    #[error("Unknown event '{name}'. Supported events: preStart, postStart, preStop, postStop")]
    UnknownEvent { name: String },
}

fn unknown_command_message(id: &str, referenced_by: &Option<String>) -> String {
    match referenced_by {
        Some(parent) => format!("Command '{}' referenced by '{}' not found in devfile", id, parent),
        None => format!("Command '{}' not found in devfile", id),
    }
}

fn ambiguous_default_message(kind: &str, candidates: &[String]) -> String {
    if candidates.is_empty() {
        format!("No command of kind '{}' found in devfile", kind)
    } else {
        format!(
            "Cannot select a default '{}' command among [{}]; mark exactly one with isDefault",
            kind,
            candidates.join(", ")
        )
    }
}

/// Errors raised while executing a resolved plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// A command (or a parallel group containing it) failed
    #[error("{}", command_failed_message(.command, .exit_code, .group, .failures, .total))]
    CommandFailed {
        /// Id of the failed command (first observed failure within a group)
        command: String,
        /// Exit code, `None` when the command could not be executed at all
        exit_code: Option<i32>,
        /// Parallel group the failure was collected in
        group: Option<String>,
        /// Number of failed commands in the group (1 outside a group)
        failures: usize,
        /// Number of commands in the group (1 outside a group)
        total: usize,
        /// Ids of sibling commands that completed successfully
        succeeded: Vec<String>,
    },

    /// The caller's deadline passed before a step could be started
    #[error("Deadline exceeded before starting command '{command}'")]
    DeadlineExceeded { command: String },

    /// The caller's deadline passed while waiting on a parallel group
    #[error("Timed out waiting for parallel command '{group}' ({pending} still running)")]
    GroupTimedOut { group: String, pending: usize },
}

fn command_failed_message(
    command: &str,
    exit_code: &Option<i32>,
    group: &Option<String>,
    failures: &usize,
    total: &usize,
) -> String {
    let cause = match exit_code {
        Some(code) => format!("Command '{}' failed with exit code {}", command, code),
        None => format!("Command '{}' could not be executed", command),
    };
    match group {
        Some(group) => format!(
            "Parallel command '{}' failed ({} of {} failed): {}",
            group, failures, total, cause
        ),
        None => cause,
    }
}

impl ExecError {
    /// Build the failure for a single command with a non-zero exit status
    pub fn command_failed(command: impl Into<String>, exit_code: i32) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code: Some(exit_code),
            group: None,
            failures: 1,
            total: 1,
            succeeded: Vec::new(),
        }
    }

    /// Exit code of the (first) failed command, if one is known
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

/// Platform (cluster / local engine) errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The selected target lacks the context it needs (e.g. a namespace)
    #[error("Missing platform context for {target}: {reason}")]
    MissingPlatformContext { target: String, reason: String },

    /// The platform tool is not installed or not accessible
    #[error("{tool} is not installed or not accessible")]
    NotInstalled { tool: String },

    /// Platform CLI invocation error
    #[error("Platform CLI error: {0}")]
    CliError(String),

    /// No running instance backs the given component container
    #[error("No running instance found for container '{container}' of component '{component}'")]
    InstanceNotFound { component: String, container: String },

    /// The component kind cannot be handled by this backend
    #[error("Component '{name}' of kind {kind} is not supported by the {backend} backend")]
    UnsupportedComponent {
        name: String,
        kind: String,
        backend: String,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum DevrunError {
    /// Plan construction errors
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Plan execution errors
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Platform errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal/generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DevrunError {
    /// Whether this error was raised before anything was executed
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Resolve(_)
                | Self::Config(_)
                | Self::Platform(PlatformError::MissingPlatformContext { .. })
        )
    }

    /// Exit code of the failed command, for errors that carry one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exec(e) => e.exit_code(),
            _ => None,
        }
    }
}

/// Convenience type alias for Results with DevrunError
pub type Result<T> = std::result::Result<T, DevrunError>;
