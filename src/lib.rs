//! macOS installer package builder library
//!
//! Builds flat installer packages from a project directory, optionally
//! wraps them in distribution packages, signs, notarizes and staples them,
//! and keeps payload metadata that git cannot track in `Bom.txt`.
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;

// Re-export commonly used types
pub use error::{AppError, CliError, Result};
