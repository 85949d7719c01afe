//! pkgproject - builds macOS installer packages from project directories.
//!
//! Exit code 0 means the package was built (and notarized, if configured)
//! or the sync completed.

use pkgproject::cli::{self, Args};
use std::process;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    // Initialize logging
    let default_filter = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    // Run CLI and get exit code
    let exit_code = match cli::run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}
