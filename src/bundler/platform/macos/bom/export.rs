//! Writing `Bom.txt` from a built package.

use super::entry::{parse_listing, render_listing};
use crate::bundler::{
    builder::tools,
    error::{Error, ErrorExt, Result, Stage},
    process::{CommandSpec, ProcessRunner},
    settings::ProjectLayout,
};
use std::path::{Path, PathBuf};

/// `pkgutil --bom`, which extracts the package's Bom files and prints
/// their paths.
pub fn bom_extract_command(package: &Path) -> CommandSpec {
    CommandSpec::new(tools::PKGUTIL)
        .arg("--bom")
        .path_arg(package)
}

/// `lsbom` on an extracted Bom file.
pub fn bom_list_command(bom: &Path) -> CommandSpec {
    CommandSpec::new(tools::LSBOM).path_arg(bom)
}

/// Exports the manifest of `package` to the project's `Bom.txt`.
///
/// The file is overwritten unconditionally. Returns its path.
pub async fn export_bom_info<R: ProcessRunner>(
    runner: &R,
    package: &Path,
    layout: &ProjectLayout,
) -> Result<PathBuf> {
    log::info!("Extracting bom file from {}", package.display());
    let output = runner.run(&bom_extract_command(package)).await?;
    if !output.success() {
        return Err(Error::build(Stage::BomExtract, output.diagnostics()));
    }
    let extracted: Vec<PathBuf> = output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect();

    let result = list_first(runner, &extracted).await;

    for bom in &extracted {
        if let Err(e) = tokio::fs::remove_file(bom).await {
            log::debug!("could not remove {}: {}", bom.display(), e);
        }
    }

    let listing = result?;
    let entries = parse_listing(&listing)?;
    let destination = layout.bom_file();
    log::info!("Exporting bom info to {}", destination.display());
    tokio::fs::write(&destination, render_listing(entries))
        .await
        .fs_context("writing bom info", &destination)?;
    Ok(destination)
}

async fn list_first<R: ProcessRunner>(runner: &R, extracted: &[PathBuf]) -> Result<String> {
    let Some(bom) = extracted.first() else {
        return Err(Error::build(
            Stage::BomExtract,
            "pkgutil did not report any bom file",
        ));
    };
    if extracted.len() > 1 {
        log::debug!(
            "package has {} bom files; exporting {}",
            extracted.len(),
            bom.display()
        );
    }

    let output = runner.run(&bom_list_command(bom)).await?;
    if !output.success() {
        return Err(Error::build(Stage::BomList, output.diagnostics()));
    }
    Ok(output.stdout)
}
