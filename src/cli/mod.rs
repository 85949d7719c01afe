//! Command line interface.
//!
//! Parses arguments, resolves the project directory and dispatches to the
//! build or sync command.

mod args;
pub mod commands;
mod output;

pub use args::{Args, RuntimeConfig};
pub use output::OutputManager;

use crate::error::{CliError, Result};

/// Main CLI entry point
pub async fn run(args: Args) -> Result<i32> {
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;
    let config = RuntimeConfig::from(&args);

    // `.` must resolve to a real directory name for the defaults.
    let project_dir = tokio::fs::canonicalize(&args.project_dir).await?;

    if args.sync {
        commands::sync::execute(&project_dir, &config).await
    } else {
        commands::build::execute(&project_dir, &config).await
    }
}
