//! Host and external tool detection.
//!
//! `pkgbuild` only understands `--compression` and `--min-os-version` on
//! macOS 12 and later, so the host version is probed once per build.

use super::commands::tools;
use crate::bundler::process::{CommandSpec, ProcessRunner};

/// First macOS major version whose `pkgbuild` accepts `--compression`.
const COMPRESSION_MIN_MAJOR: u32 = 12;

/// Facts about the build host that change the constructed commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInfo {
    /// `sw_vers -productVersion`, when available.
    pub os_version: Option<String>,
}

impl HostInfo {
    /// Host with a known macOS version.
    pub fn with_os_version(version: impl Into<String>) -> Self {
        Self {
            os_version: Some(version.into()),
        }
    }

    /// Queries `sw_vers`. Any failure leaves the version unknown.
    pub async fn detect<R: ProcessRunner>(runner: &R) -> Self {
        let command = CommandSpec::new(tools::SW_VERS).arg("-productVersion");
        match runner.run(&command).await {
            Ok(output) if output.success() => {
                let version = output.stdout.trim().to_string();
                log::debug!("Host macOS version: {}", version);
                Self {
                    os_version: (!version.is_empty()).then_some(version),
                }
            }
            Ok(output) => {
                log::debug!("sw_vers failed: {}", output.diagnostics());
                Self::default()
            }
            Err(e) => {
                log::debug!("sw_vers unavailable: {}", e);
                Self::default()
            }
        }
    }

    /// Major component of the OS version.
    pub fn major_version(&self) -> Option<u32> {
        self.os_version
            .as_deref()
            .and_then(|v| v.split('.').next())
            .and_then(|major| major.trim().parse().ok())
    }

    /// Whether `pkgbuild` accepts `--compression` and `--min-os-version`.
    pub fn supports_compression(&self) -> bool {
        self.major_version()
            .is_some_and(|major| major >= COMPRESSION_MIN_MAJOR)
    }
}

/// Returns the tools from `required` that are not installed.
pub fn missing_tools(required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|tool| match which::which(tool) {
            Ok(path) => {
                log::debug!("Found {} at: {}", tool, path.display());
                false
            }
            Err(e) => {
                log::debug!("{} not available: {}", tool, e);
                true
            }
        })
        .map(|tool| tool.to_string())
        .collect()
}
