//! Application error types.
//!
//! [`AppError`] is what the CLI surfaces; it wraps library errors and adds
//! recovery suggestions for the common failures.

use crate::bundler::{self, Stage};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Top-level error
#[derive(Error, Debug)]
pub enum AppError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Packaging errors
    #[error("{0}")]
    Bundler(#[from] bundler::Error),

    /// Notarization errors
    #[error("{0}")]
    Notarization(#[from] bundler::NotarizationError),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Required packaging tools are not installed
    #[error("Required tools not found: {}", tools.join(", "))]
    MissingTools {
        /// Tools that could not be found
        tools: Vec<String>,
    },
}

impl From<bundler::ConfigError> for AppError {
    fn from(error: bundler::ConfigError) -> Self {
        AppError::Bundler(error.into())
    }
}

impl AppError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AppError::Cli(CliError::MissingTools { .. }) => vec![
                "pkgbuild and productbuild ship with macOS; run on a Mac".to_string(),
                "Install the Xcode command line tools with `xcode-select --install`".to_string(),
            ],
            AppError::Cli(CliError::InvalidArguments { .. }) => {
                vec!["Run with --help to see the supported options".to_string()]
            }
            AppError::Bundler(bundler::Error::Config(e)) => vec![format!(
                "Fix `{}` in the project's build-info file",
                e.key
            )],
            AppError::Bundler(bundler::Error::Build {
                stage: Stage::Prepare,
                ..
            }) => vec![
                "Add a payload/ directory or a scripts/preinstall or scripts/postinstall script"
                    .to_string(),
            ],
            AppError::Bundler(bundler::Error::Build {
                stage: Stage::ComponentPackage | Stage::Distribution,
                ..
            }) => vec![
                "Check the signing identity with `security find-identity -v`".to_string(),
                "Re-run with RUST_LOG=debug to see the full command line".to_string(),
            ],
            AppError::Notarization(bundler::NotarizationError::MissingCredentials(_)) => vec![
                "Set password with apple_id and team_id, api_key with api_key_path and api_issuer, or keychain_profile in notarization_info"
                    .to_string(),
            ],
            AppError::Notarization(bundler::NotarizationError::TimedOut {
                submission_id, ..
            }) => vec![
                format!("Check progress with `xcrun notarytool info {submission_id}`"),
                "Raise notarization_info.staple_timeout".to_string(),
            ],
            AppError::Notarization(bundler::NotarizationError::Rejected {
                submission_id, ..
            }) => vec![format!(
                "Inspect the report with `xcrun notarytool log {submission_id}`"
            )],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_point_at_key() {
        let err = AppError::from(bundler::ConfigError::new("ownership", "must be one of ..."));
        assert_eq!(
            err.recovery_suggestions(),
            ["Fix `ownership` in the project's build-info file"]
        );
    }

    #[test]
    fn missing_tools_lists_names() {
        let err = AppError::from(CliError::MissingTools {
            tools: vec!["/usr/bin/pkgbuild".into(), "/usr/bin/productbuild".into()],
        });
        assert_eq!(
            err.to_string(),
            "CLI error: Required tools not found: /usr/bin/pkgbuild, /usr/bin/productbuild"
        );
        assert_eq!(err.recovery_suggestions().len(), 2);
    }
}
