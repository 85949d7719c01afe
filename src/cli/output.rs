//! User-facing terminal output.
//!
//! Progress and results go to stdout and are silenced by `--quiet`.
//! Warnings and errors always go to stderr.

use console::style;
use std::io::{self, Write};

/// Writes progress, warnings and errors to the terminal
#[derive(Debug, Clone)]
pub struct OutputManager {
    quiet: bool,
}

impl OutputManager {
    /// Create an output manager
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Whether progress output is suppressed
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Print a progress message
    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(io::stdout(), "{} {}", style("→").cyan(), message)
    }

    /// Print a success message
    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(io::stdout(), "{} {}", style("✓").green().bold(), message)
    }

    /// Print indented detail under the previous message
    pub fn indent(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(io::stdout(), "  {}", message)
    }

    /// Print a warning
    pub fn warn(&self, message: &str) -> io::Result<()> {
        writeln!(
            io::stderr(),
            "{} {}",
            style("warning:").for_stderr().yellow().bold(),
            message
        )
    }

    /// Print an error
    pub fn error(&self, message: &str) -> io::Result<()> {
        writeln!(
            io::stderr(),
            "{} {}",
            style("error:").for_stderr().red().bold(),
            message
        )
    }
}
