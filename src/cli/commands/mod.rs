//! Command execution.
//!
//! Only these functions turn outcomes into exit codes.

pub mod build;
pub mod sync;

pub use build::{BuildOptions, build_project};
