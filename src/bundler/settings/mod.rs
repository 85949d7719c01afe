//! Build configuration and project layout.
//!
//! - [`loader`] finds and parses `build-info.{plist,json,yaml,yml}`
//! - [`resolver`] merges the parsed mapping over the defaults
//! - [`core`] holds the resolved, fully typed [`BuildConfig`]
//! - [`project`] knows where payload, scripts and outputs live

mod core;
mod loader;
mod project;
mod resolver;

pub use self::core::{
    BuildConfig, Compression, DEFAULT_STAPLE_TIMEOUT, NotarizationInfo, Ownership,
    PostinstallAction, SigningInfo,
};
pub use loader::{BUILD_INFO_FILE, BuildInfoFormat, find_build_info, load_build_info, read_build_info};
pub use project::{BOM_TEXT_FILE, PayloadState, ProjectLayout, REQUIREMENTS_PLIST};
pub use resolver::{RawSettings, resolve};
