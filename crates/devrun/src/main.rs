use anyhow::Result;
use clap::Parser;
use devrun_core::errors::DevrunError;

mod cli;
mod commands;

/// Exit code for problems found before anything ran (bad flags, devfile, plan)
const CONFIGURATION_EXIT_CODE: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // A failed devfile command hands its own exit code to the caller
            if let Some(devrun_error) = err.downcast_ref::<DevrunError>() {
                eprintln!("Error: {:#}", err);
                if let Some(code) = devrun_error.exit_code().filter(|c| *c != 0) {
                    std::process::exit(code);
                }
                if devrun_error.is_configuration_error() {
                    std::process::exit(CONFIGURATION_EXIT_CODE);
                }
                std::process::exit(1);
            }

            Err(err)
        }
    }
}
