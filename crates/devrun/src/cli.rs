use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use devrun_core::settings::PushTarget;
use std::path::PathBuf;
use std::time::Duration;

use crate::commands::{self, shared::GlobalArgs};

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

impl LogFormat {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// Log level options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Result output format on stdout
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Command output only
    Text,
    /// Command output followed by a JSON run report
    Json,
}

/// Run devfile commands of a component on a local engine or a cluster
#[derive(Parser, Debug)]
#[command(name = "devrun", version, about, long_about = None)]
pub struct Cli {
    /// Devfile to load (default: devfile.yaml, then .devfile.yaml in the context)
    #[arg(long, global = true)]
    pub devfile: Option<PathBuf>,

    /// Component name (default: the devfile metadata name, then the context directory name)
    #[arg(long, global = true)]
    pub component: Option<String>,

    /// Directory holding the component sources
    #[arg(long, global = true)]
    pub context: Option<PathBuf>,

    /// Where the component runs
    #[arg(long, global = true)]
    pub push_target: Option<PushTarget>,

    /// Cluster namespace for the kube target
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// Settings file (TOML)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Output format for run results
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Overall deadline for the invocation, in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command or composite by id
    Run {
        /// Command id
        id: String,
    },
    /// Run the commands bound to a lifecycle event
    Event {
        /// preStart, postStart, preStop or postStop
        name: String,
    },
    /// Run the default command of a group
    Default {
        /// build, run, test or debug
        kind: String,
    },
    /// Print the execution plan of an event or command as JSON
    Plan {
        /// Event name or command id
        target: String,
    },
    /// Sync sources, then run the default build and run commands
    Push {
        /// Directory to sync (default: the context)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Only sync sources
        #[arg(long)]
        no_run: bool,
    },
    /// Provision the component and run its postStart commands
    Start,
    /// Run the preStop commands and tear the component down
    Stop,
}

impl Cli {
    fn global_args(&self) -> GlobalArgs {
        GlobalArgs {
            devfile: self.devfile.clone(),
            component: self.component.clone(),
            context: self.context.clone(),
            push_target: self.push_target,
            namespace: self.namespace.clone(),
            settings: self.settings.clone(),
            timeout: self.timeout.map(Duration::from_secs),
            output: self.output,
        }
    }

    /// Initialize logging, then run the selected subcommand
    pub async fn dispatch(self) -> Result<()> {
        if std::env::var_os("DEVRUN_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            let level = self.log_level.as_str();
            std::env::set_var(
                "RUST_LOG",
                format!("devrun={},devrun_core={}", level, level),
            );
        }
        devrun_core::logging::init(self.log_format.as_ref().map(LogFormat::as_str))?;
        tracing::debug!("CLI initialized with log level: {}", self.log_level.as_str());

        let global = self.global_args();
        match self.command {
            Commands::Run { id } => commands::run::execute_run(&global, &id).await,
            Commands::Event { name } => commands::run::execute_event(&global, &name).await,
            Commands::Default { kind } => commands::run::execute_default(&global, &kind).await,
            Commands::Plan { target } => commands::plan::execute_plan(&global, &target),
            Commands::Push { source, no_run } => {
                commands::lifecycle::execute_push(&global, source, !no_run).await
            }
            Commands::Start => commands::lifecycle::execute_start(&global).await,
            Commands::Stop => commands::lifecycle::execute_stop(&global).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::parse_from([
            "devrun",
            "--push-target",
            "kube",
            "--namespace",
            "dev",
            "run",
            "build",
            "--timeout",
            "30",
        ]);
        assert_eq!(cli.push_target, Some(PushTarget::Kube));
        assert_eq!(cli.namespace.as_deref(), Some("dev"));
        assert_eq!(cli.timeout, Some(30));
        match cli.command {
            Commands::Run { id } => assert_eq!(id, "build"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_push_flags() {
        let cli = Cli::parse_from(["devrun", "push", "--source", "/src", "--no-run"]);
        match cli.command {
            Commands::Push { source, no_run } => {
                assert_eq!(source, Some(PathBuf::from("/src")));
                assert!(no_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_invalid_push_target_is_rejected() {
        assert!(Cli::try_parse_from(["devrun", "--push-target", "vm", "start"]).is_err());
    }

    #[test]
    fn test_global_args_convert_timeout() {
        let cli = Cli::parse_from(["devrun", "--timeout", "5", "stop"]);
        assert_eq!(cli.global_args().timeout, Some(Duration::from_secs(5)));
        assert_eq!(cli.global_args().output, OutputFormat::Text);
    }
}
