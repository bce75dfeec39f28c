//! Plan command implementation
//!
//! Resolves an event name or command id and prints the plan tree as JSON
//! without touching any platform.

use anyhow::Result;
use devrun_core::resolver::CommandResolver;
use tracing::instrument;

use super::shared::{load_global_devfile, print_json, GlobalArgs};

/// Execute `devrun plan <target>`
#[instrument(skip(global))]
pub fn execute_plan(global: &GlobalArgs, target: &str) -> Result<()> {
    let devfile = load_global_devfile(global)?;
    let plan = CommandResolver::new(&devfile)
        .resolve_target(target)
        .map_err(devrun_core::DevrunError::from)?;
    print_json(&plan)
}
