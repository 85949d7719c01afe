//! Package assembly and coordination.
//!
//! This module turns a resolved [`BuildConfig`](crate::bundler::BuildConfig)
//! into a published installer package.
//!
//! # Overview
//!
//! The assembler:
//! 1. Inspects the project layout (payload, scripts)
//! 2. Optionally disables bundle relocation via `pkgbuild --analyze`
//! 3. Builds the component package with `pkgbuild`
//! 4. Optionally wraps it with `productbuild` into a distribution package
//! 5. Moves the result under `build/` and checksums it
//!
//! # Module Organization
//!
//! - [`checksum`] - SHA256 checksum of the published package
//! - [`commands`] - Pure construction of every tool invocation
//! - [`orchestrator`] - [`PackageAssembler`] and the build sequence
//! - [`signing`] - Signing flags for the final builder
//! - [`tool_detection`] - Host version and tool availability

mod checksum;
pub mod commands;
mod orchestrator;
mod signing;
mod tool_detection;

pub use checksum::calculate_sha256;
pub use commands::tools;
pub use orchestrator::{AssembledPackage, PackageAssembler};
pub use signing::signing_args;
pub use tool_detection::{HostInfo, missing_tools};
