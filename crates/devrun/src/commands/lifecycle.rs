//! Push, start and stop command implementations

use anyhow::Result;
use devrun_core::{PushParameters, RunReport};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};

use super::shared::{build_adapter, print_json, GlobalArgs};
use crate::cli::OutputFormat;

/// JSON result of `devrun push`
#[derive(Debug, Serialize)]
pub struct PushOutput {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunReport>,
}

/// Execute `devrun push`
#[instrument(skip(global))]
pub async fn execute_push(
    global: &GlobalArgs,
    source: Option<PathBuf>,
    run_commands: bool,
) -> Result<()> {
    let adapter = build_adapter(global)?;
    let report = adapter
        .push(PushParameters {
            source,
            run_commands,
        })
        .await?;
    info!("Pushed '{}'", adapter.component_name());

    if global.output == OutputFormat::Json {
        print_json(&PushOutput {
            component: adapter.component_name().to_string(),
            build: report.build,
            run: report.run,
        })?;
    }
    Ok(())
}

/// Execute `devrun start`
#[instrument(skip(global))]
pub async fn execute_start(global: &GlobalArgs) -> Result<()> {
    let adapter = build_adapter(global)?;
    let report = adapter.start().await?;
    if global.output == OutputFormat::Json {
        print_json(&report)?;
    }
    Ok(())
}

/// Execute `devrun stop`
#[instrument(skip(global))]
pub async fn execute_stop(global: &GlobalArgs) -> Result<()> {
    let adapter = build_adapter(global)?;
    let report = adapter.stop().await?;
    if global.output == OutputFormat::Json {
        print_json(&report)?;
    }
    Ok(())
}
