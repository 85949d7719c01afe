//! macOS installer package builder.
//!
//! Builds flat installer packages from a project directory:
//!
//! ```text
//! MyTool/
//!   build-info.plist        (or .json / .yaml / .yml)
//!   payload/                files to install
//!   scripts/                preinstall, postinstall, helpers
//!   product-requirements.plist
//!   Bom.txt                 owners, modes and empty directories
//!   build/                  output
//! ```
//!
//! # Pipeline
//!
//! 1. [`load_build_info`] + [`resolve`] produce a [`BuildConfig`]
//! 2. [`PackageAssembler`] runs `pkgbuild` (and `productbuild` for
//!    distribution-style packages) and publishes to `build/`
//! 3. [`export_bom_info`] optionally writes `Bom.txt`
//! 4. [`NotarizationCoordinator`] optionally notarizes and staples
//!
//! `--sync` runs only [`sync_from_bom_info`].
//!
//! Every external tool goes through a [`ProcessRunner`], so the whole
//! pipeline runs against a scripted runner in tests.

#![warn(missing_docs)]

pub(crate) mod builder;
mod error;
pub(crate) mod platform;
pub(crate) mod process;
mod settings;
pub(crate) mod utils;

pub use builder::{
    AssembledPackage, HostInfo, PackageAssembler, calculate_sha256, missing_tools, signing_args,
    tools,
};
pub use error::{ConfigError, Context, Error, ErrorExt, NotarizationError, Result, Stage, StapleError};
#[cfg(unix)]
pub use platform::macos::bom::{SyncReport, SyncWarning, sync_from_bom_info};
pub use platform::macos::{
    bom::{BomEntry, EntryKind, export_bom_info},
    notarization::{
        Clock, NotarizationCoordinator, NotarizationState, NotarizationSubmission, NotaryAuth,
        SubmissionStatus, TokioClock,
    },
};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, SystemRunner};
pub use settings::{
    BOM_TEXT_FILE, BUILD_INFO_FILE, BuildConfig, BuildInfoFormat, Compression,
    DEFAULT_STAPLE_TIMEOUT, NotarizationInfo, Ownership, PayloadState, PostinstallAction,
    ProjectLayout, REQUIREMENTS_PLIST, RawSettings, SigningInfo, find_build_info,
    load_build_info, read_build_info, resolve,
};

use std::path::PathBuf;

/// Outcome of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Published package.
    pub output_package_path: PathBuf,
    /// False when notarization was attempted and failed.
    pub succeeded: bool,
    /// Where notarization ended.
    pub notarization_state: NotarizationState,
    /// `Bom.txt`, when exported.
    pub bom_export_path: Option<PathBuf>,
    /// Hex SHA-256 of the published package.
    pub checksum: String,
}
