//! `pkgproject <dir>`: build, optionally export Bom.txt, optionally notarize.

use crate::{
    bundler::{
        self, BuildInfoFormat, BuildResult, Clock, HostInfo, NotarizationCoordinator,
        NotarizationState, PackageAssembler, ProcessRunner, ProjectLayout, SystemRunner,
        TokioClock, export_bom_info, load_build_info, missing_tools, resolve, tools,
    },
    cli::{OutputManager, RuntimeConfig},
    error::{AppError, CliError, Result},
};
use anyhow::Context as _;
use std::path::Path;

/// What to do around the package build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Write Bom.txt from the built package.
    pub export_bom_info: bool,
    /// Never notarize.
    pub skip_notarization: bool,
    /// Notarize without stapling.
    pub skip_stapling: bool,
    /// Only consider this build-info format.
    pub build_info_format: Option<BuildInfoFormat>,
}

impl From<&RuntimeConfig> for BuildOptions {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            export_bom_info: config.export_bom_info(),
            skip_notarization: config.skip_notarization(),
            skip_stapling: config.skip_stapling(),
            build_info_format: config.build_info_format(),
        }
    }
}

/// Runs a build on the host and returns the exit code.
///
/// Ctrl-C aborts the running stage; the scratch area is dropped and the
/// in-flight tool is killed.
pub async fn execute(project_dir: &Path, config: &RuntimeConfig) -> Result<i32> {
    let missing = missing_tools(&[tools::PKGBUILD]);
    if !missing.is_empty() {
        return Err(CliError::MissingTools { tools: missing }.into());
    }

    let layout = ProjectLayout::new(project_dir);
    let runner = SystemRunner;
    let host = HostInfo::detect(&runner).await;
    let options = BuildOptions::from(config);

    let result = tokio::select! {
        result = build_project(&runner, &TokioClock, &layout, host, &options, config.output()) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            return Err(bundler::Error::Interrupted.into());
        }
    };

    Ok(if result.succeeded { 0 } else { 1 })
}

/// The build pipeline: resolve settings, assemble, export, notarize.
///
/// A notarization failure leaves the package published and is reported
/// through [`BuildResult::succeeded`]; every earlier failure is an error.
pub async fn build_project<R: ProcessRunner, C: Clock>(
    runner: &R,
    clock: &C,
    layout: &ProjectLayout,
    host: HostInfo,
    options: &BuildOptions,
    output: &OutputManager,
) -> Result<BuildResult> {
    let raw = match load_build_info(layout.root(), options.build_info_format)? {
        Some((path, raw)) => {
            log::debug!("Using build info from {}", path.display());
            Some(raw)
        }
        None => {
            output.warn("no build-info file found; using default settings")?;
            None
        }
    };
    let config = resolve(raw.as_ref(), &layout.project_name())?;

    output.progress(&format!(
        "Building {} ({} {})",
        config.output_name(),
        config.identifier,
        config.version
    ))?;
    let package = PackageAssembler::new(runner, layout, &config, host)
        .assemble()
        .await?;
    output.success(&format!("Created {}", package.path.display()))?;
    output.indent(&format!("SHA256: {}", package.checksum))?;

    let bom_export_path = if options.export_bom_info {
        let path = export_bom_info(runner, &package.path, layout).await?;
        output.success(&format!("Exported bom info to {}", path.display()))?;
        Some(path)
    } else {
        None
    };

    let mut succeeded = true;
    let notarization_state = match config.notarization() {
        Some(_) if options.skip_notarization => {
            log::info!("Skipping notarization");
            NotarizationState::NotStarted
        }
        None => NotarizationState::NotStarted,
        Some(info) => {
            output.progress("Notarizing package")?;
            let result = NotarizationCoordinator::new(runner, clock, info)
                .skip_stapling(options.skip_stapling)
                .run(&package.path)
                .await;
            match result {
                Ok(state) => {
                    report_notarized(&state, output)?;
                    state
                }
                Err(error) => {
                    succeeded = false;
                    let state = NotarizationState::from_failure(&error);
                    let error = AppError::from(error);
                    output.error(&error.to_string())?;
                    for suggestion in error.recovery_suggestions() {
                        output.indent(&suggestion)?;
                    }
                    state
                }
            }
        }
    };

    Ok(BuildResult {
        output_package_path: package.path,
        succeeded,
        notarization_state,
        bom_export_path,
        checksum: package.checksum,
    })
}

fn report_notarized(state: &NotarizationState, output: &OutputManager) -> Result<()> {
    match state {
        NotarizationState::Stapled(_) => output.success("Notarized and stapled")?,
        NotarizationState::StapleFailed { error, .. } => {
            output.success("Notarized")?;
            output.warn(&format!("{error}; the package is usable but not self-contained"))?;
        }
        other => output.success(&format!("Notarization {}", other.name()))?,
    }
    Ok(())
}
