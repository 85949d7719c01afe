//! `pkgproject <dir> --sync`: apply Bom.txt to the payload.

use crate::{
    bundler::{Ownership, ProjectLayout, load_build_info, resolve},
    cli::RuntimeConfig,
    error::Result,
};
use std::path::Path;

/// Runs a sync and returns the exit code.
///
/// Warnings (missing files, untracked items, ownership) never fail the run.
#[cfg(unix)]
pub async fn execute(project_dir: &Path, config: &RuntimeConfig) -> Result<i32> {
    use crate::bundler::{sync_from_bom_info, utils::running_as_root};
    use anyhow::Context as _;

    let layout = ProjectLayout::new(project_dir);
    let output = config.output();
    if let Some(hint) = ownership_hint(configured_ownership(&layout, config), running_as_root()) {
        output.warn(&hint)?;
    }
    output.progress(&format!(
        "Syncing {} from {}",
        layout.payload_dir().display(),
        layout.bom_file().display()
    ))?;

    let report = tokio::task::spawn_blocking(move || sync_from_bom_info(&layout))
        .await
        .context("sync task failed")??;

    for warning in &report.warnings {
        output.warn(&warning.to_string())?;
    }
    if report.changes == 0 {
        output.success("Sync successful: no changes needed")?;
    } else {
        output.success(&format!("Sync successful: {} change(s)", report.changes))?;
    }
    Ok(0)
}

/// Ownership mode from the project's build-info, if it can be read.
///
/// Sync does not need build-info, so any problem only disables the hint.
fn configured_ownership(layout: &ProjectLayout, config: &RuntimeConfig) -> Option<Ownership> {
    let raw = match load_build_info(layout.root(), config.build_info_format()) {
        Ok(found) => found.map(|(_, raw)| raw),
        Err(e) => {
            log::debug!("not checking ownership: {}", e);
            return None;
        }
    };
    match resolve(raw.as_ref(), &layout.project_name()) {
        Ok(resolved) => Some(resolved.ownership),
        Err(e) => {
            log::debug!("not checking ownership: {}", e);
            None
        }
    }
}

/// Warning shown before a sync that cannot restore owners.
fn ownership_hint(ownership: Option<Ownership>, as_root: bool) -> Option<String> {
    let ownership = ownership?;
    (ownership.preserves_ownership() && !as_root).then(|| {
        format!(
            "build-info ownership is '{}' but sync is not running as root; owner and group will not be restored",
            ownership.as_str()
        )
    })
}

/// Runs a sync and returns the exit code.
#[cfg(not(unix))]
pub async fn execute(_project_dir: &Path, _config: &RuntimeConfig) -> Result<i32> {
    Err(crate::error::CliError::InvalidArguments {
        reason: "--sync needs a Unix file system".to_string(),
    }
    .into())
}
