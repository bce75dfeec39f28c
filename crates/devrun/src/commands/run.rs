//! Run, event and default command implementations
//!
//! Each subcommand resolves a plan and executes it on the adapter built from
//! the global options; the run report is printed when JSON output is selected.

use anyhow::Result;
use devrun_core::devfile::{EventKind, GroupKind};
use devrun_core::errors::{ConfigError, DevrunError};
use devrun_core::RunReport;
use tracing::{info, instrument};

use super::shared::{build_adapter, print_json, GlobalArgs};
use crate::cli::OutputFormat;

/// Execute `devrun run <id>`
#[instrument(skip(global))]
pub async fn execute_run(global: &GlobalArgs, id: &str) -> Result<()> {
    let adapter = build_adapter(global)?;
    let report = adapter.run_command(id).await?;
    finish(global, &report)
}

/// Execute `devrun event <name>`
#[instrument(skip(global))]
pub async fn execute_event(global: &GlobalArgs, name: &str) -> Result<()> {
    let kind: EventKind = name.parse().map_err(DevrunError::from)?;
    let adapter = build_adapter(global)?;
    let report = adapter.run_event(kind).await?;
    finish(global, &report)
}

/// Execute `devrun default <kind>`
#[instrument(skip(global))]
pub async fn execute_default(global: &GlobalArgs, kind: &str) -> Result<()> {
    let kind: GroupKind = kind
        .parse()
        .map_err(|message| DevrunError::from(ConfigError::Validation { message }))?;
    let adapter = build_adapter(global)?;
    let report = adapter.run_default(kind).await?;
    finish(global, &report)
}

fn finish(global: &GlobalArgs, report: &RunReport) -> Result<()> {
    info!(
        "Finished {}: {} step(s), {} skipped",
        report.target,
        report.executed.len(),
        report.skipped.len()
    );
    if global.output == OutputFormat::Json {
        print_json(report)?;
    }
    Ok(())
}
