//! Error types for the packaging pipeline.
//!
//! Every layer below the CLI returns [`Error`]. Notarization and Bom sync
//! failures have their own types because the pipeline treats them with
//! different severity: a rejected notarization does not unpublish a package,
//! and a failed staple or a missing payload file is only a warning.

use std::{fmt::Display, io, path::PathBuf, time::Duration};

/// Result type for packaging operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of the packaging pipeline an external tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Validating the project layout and scratch area.
    Prepare,
    /// `pkgbuild --analyze` for bundle relocation.
    Analyze,
    /// Component package creation with `pkgbuild`.
    ComponentPackage,
    /// `productbuild --synthesize`.
    Synthesize,
    /// Distribution package creation with `productbuild`.
    Distribution,
    /// Moving the finished package under `build/`.
    Publish,
    /// `pkgutil --bom` extraction.
    BomExtract,
    /// `lsbom` listing.
    BomList,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Analyze => "analyze",
            Stage::ComponentPackage => "component package",
            Stage::Synthesize => "synthesize distribution",
            Stage::Distribution => "distribution package",
            Stage::Publish => "publish",
            Stage::BomExtract => "bom extract",
            Stage::BomList => "bom list",
        };
        f.write_str(name)
    }
}

/// A build-info value that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("build-info key `{key}` {reason}")]
pub struct ConfigError {
    /// Dotted key path, e.g. `signing_info.identity`.
    pub key: String,
    /// What was wrong with the value.
    pub reason: String,
}

impl ConfigError {
    pub(crate) fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of the notarization phase.
///
/// None of these remove the already published package.
#[derive(Debug, thiserror::Error)]
pub enum NotarizationError {
    /// Neither a password nor a keychain profile is usable.
    #[error("notarization_info lacks credentials: {0}")]
    MissingCredentials(String),

    /// `notarytool submit` failed.
    #[error("notarization upload failed: {0}")]
    Submission(String),

    /// notarytool answered with something we could not parse.
    #[error("unexpected notarytool output: {0}")]
    UnexpectedOutput(String),

    /// The service refused the package.
    #[error("notarization {status} for submission {submission_id}: {detail}")]
    Rejected {
        /// Submission the service refused.
        submission_id: String,
        /// Status reported by the service (`Invalid` or `Rejected`).
        status: String,
        /// Service diagnostics, verbatim.
        detail: String,
    },

    /// The submission was still in progress when the timeout expired.
    #[error(
        "timed out after {}s waiting for submission {submission_id}; staple it manually once it is accepted",
        .waited.as_secs()
    )]
    TimedOut {
        /// Submission that may still complete on the service side.
        submission_id: String,
        /// Accumulated wait.
        waited: Duration,
    },

    /// The process could not be launched at all.
    #[error(transparent)]
    Process(#[from] Box<Error>),
}

/// `stapler` failure. The package is notarized but not self-contained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stapling failed: {output}")]
pub struct StapleError {
    /// Captured stapler diagnostics.
    pub output: String,
}

/// Errors returned by the packaging library.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error with extra context.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// File system error tied to a path.
    #[error("{context} {path}: {error}")]
    Fs {
        /// What we were doing.
        context: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        error: io::Error,
    },

    /// An external tool could not be started.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Program that failed to launch.
        command: String,
        /// Underlying error.
        error: io::Error,
    },

    /// An external tool exited unsuccessfully.
    #[error("{stage} failed: {output}")]
    Build {
        /// Pipeline stage.
        stage: Stage,
        /// Captured diagnostics.
        output: String,
    },

    /// Unusable build-info value.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The user interrupted a running stage.
    #[error("interrupted")]
    Interrupted,

    /// IO error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Plist error.
    #[error("{0}")]
    Plist(#[from] plist::Error),

    /// JSON error.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Directory walk error.
    #[error("{0}")]
    WalkDir(#[from] walkdir::Error),

    /// Anything else.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Shorthand for a failed pipeline stage.
    pub fn build(stage: Stage, output: impl Into<String>) -> Self {
        Self::Build {
            stage,
            output: output.into(),
        }
    }
}

/// Adds context to results and options.
pub trait Context<T> {
    /// Wraps the error with additional context.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Wraps the error with lazily evaluated context.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Attaches a path to IO errors.
pub trait ErrorExt<T> {
    /// Converts an IO error into [`Error::Fs`].
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}
