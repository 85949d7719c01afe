//! Command line argument parsing and validation.

use crate::bundler::BuildInfoFormat;
use clap::Parser;
use std::path::PathBuf;

/// Builds macOS installer packages from project directories
#[derive(Parser, Debug)]
#[command(
    name = "pkgproject",
    version,
    about = "Builds macOS installer packages from project directories",
    long_about = "Builds a flat installer package from a project directory holding a build-info \
file, a payload/ directory and optional scripts/.

Usage:
  pkgproject MyTool                       build MyTool/build/<name>.pkg
  pkgproject MyTool --export-bom-info     build and record owners/modes in Bom.txt
  pkgproject MyTool --sync                apply Bom.txt to a fresh checkout

Exit code 0 = the package exists under build/ (and, if configured, is notarized)."
)]
pub struct Args {
    /// Package project directory
    #[arg(value_name = "PROJECT_DIR")]
    pub project_dir: PathBuf,

    /// Apply Bom.txt modes, owners and empty directories to payload/ instead of building
    #[arg(long, conflicts_with_all = ["export_bom_info", "skip_notarization", "skip_stapling"])]
    pub sync: bool,

    /// Write the built package's file list to Bom.txt
    #[arg(long)]
    pub export_bom_info: bool,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not notarize even if notarization_info is configured
    #[arg(long)]
    pub skip_notarization: bool,

    /// Notarize but do not staple the ticket
    #[arg(long)]
    pub skip_stapling: bool,

    /// Read build-info.json
    #[arg(long, conflicts_with = "yaml")]
    pub json: bool,

    /// Read build-info.yaml (or .yml)
    #[arg(long)]
    pub yaml: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if !self.project_dir.exists() {
            return Err(format!(
                "Project directory {} does not exist",
                self.project_dir.display()
            ));
        }
        if !self.project_dir.is_dir() {
            return Err(format!(
                "{} is not a directory",
                self.project_dir.display()
            ));
        }
        Ok(())
    }

    /// Build-info format forced on the command line.
    pub fn build_info_format(&self) -> Option<BuildInfoFormat> {
        if self.json {
            Some(BuildInfoFormat::Json)
        } else if self.yaml {
            Some(BuildInfoFormat::Yaml)
        } else {
            None
        }
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
    export_bom_info: bool,
    skip_notarization: bool,
    skip_stapling: bool,
    build_info_format: Option<BuildInfoFormat>,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.quiet),
            export_bom_info: args.export_bom_info,
            skip_notarization: args.skip_notarization,
            skip_stapling: args.skip_stapling,
            build_info_format: args.build_info_format(),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Whether to export Bom.txt after the build
    pub fn export_bom_info(&self) -> bool {
        self.export_bom_info
    }

    /// Whether notarization is disabled
    pub fn skip_notarization(&self) -> bool {
        self.skip_notarization
    }

    /// Whether stapling is disabled
    pub fn skip_stapling(&self) -> bool {
        self.skip_stapling
    }

    /// Forced build-info format
    pub fn build_info_format(&self) -> Option<BuildInfoFormat> {
        self.build_info_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn sync_conflicts_with_build_flags() {
        let err = Args::try_parse_from(["pkgproject", "proj", "--sync", "--export-bom-info"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn format_flags_select_build_info() {
        let args = Args::try_parse_from(["pkgproject", "proj", "--yaml"]).unwrap();
        assert_eq!(args.build_info_format(), Some(BuildInfoFormat::Yaml));
        let args = Args::try_parse_from(["pkgproject", "proj"]).unwrap();
        assert_eq!(args.build_info_format(), None);
        assert!(Args::try_parse_from(["pkgproject", "proj", "--json", "--yaml"]).is_err());
    }

    #[test]
    fn runtime_config_carries_flags() {
        let args =
            Args::try_parse_from(["pkgproject", "proj", "-q", "--skip-stapling"]).unwrap();
        let config = RuntimeConfig::from(&args);
        assert!(config.output().is_quiet());
        assert!(config.skip_stapling());
        assert!(!config.skip_notarization());
    }
}
