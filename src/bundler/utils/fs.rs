//! File system helpers for the build and publish steps.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{io, path::Path};
use tokio::fs;

/// Creates a directory and its parents.
///
/// Fails when `path` exists but is not a directory.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::GenericError(format!(
            "{} exists and is not a directory",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(path)
            .await
            .fs_context("creating directory", path),
        Err(e) => Err(Error::Fs {
            context: "inspecting",
            path: path.to_path_buf(),
            error: e,
        }),
    }
}

/// Moves a file onto `to`, replacing any existing file atomically.
///
/// `to` is never observed partially written: when `rename` cannot be used,
/// the content is copied to a temporary sibling of `to` and renamed over it.
pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        return Err(Error::GenericError(format!(
            "{} is not a file",
            from.display()
        )));
    }

    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) => {
            log::debug!(
                "rename {} -> {} failed ({}), staging a copy instead",
                from.display(),
                to.display(),
                e
            );
            let parent = to
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let staged = tempfile::NamedTempFile::new_in(parent).fs_context("staging in", parent)?;
            fs::copy(from, staged.path())
                .await
                .fs_context("copying to", staged.path())?;
            staged
                .persist(to)
                .map_err(|e| e.error)
                .fs_context("replacing", to)?;
            fs::remove_file(from).await.fs_context("removing", from)
        }
    }
}
