//! Platform-specific services.

pub mod macos;
