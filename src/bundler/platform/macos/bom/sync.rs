//! Replaying `Bom.txt` onto a checked-out payload.
//!
//! Version control keeps file content but loses modes, owners and empty
//! directories. Sync restores those from the listing. It never deletes
//! anything and never writes file content.

use super::entry::{BomEntry, EntryKind, PERMISSION_MASK, parse_listing};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    settings::ProjectLayout,
    utils::running_as_root,
};
use std::{
    collections::HashSet,
    fmt, fs, io,
    os::unix::fs::{MetadataExt, PermissionsExt, lchown},
    path::{Path, PathBuf},
};

/// Non-fatal finding of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    /// A file listed in `Bom.txt` is not in the payload.
    MissingFile(PathBuf),
    /// An AppleDouble file is listed; its attributes may not survive
    /// version control or `pkgbuild`.
    ExtendedAttributes(PathBuf),
    /// Owner or group could not be set.
    OwnershipNotApplied {
        /// Affected path.
        path: PathBuf,
        /// Why.
        reason: String,
    },
    /// A payload item that `Bom.txt` does not list.
    Untracked(PathBuf),
    /// Part of the payload could not be scanned for untracked items.
    Unreadable {
        /// Item the scan failed on.
        path: PathBuf,
        /// Why.
        reason: String,
    },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::MissingFile(path) => {
                write!(f, "file {} is missing in payload", path.display())
            }
            SyncWarning::ExtendedAttributes(path) => write!(
                f,
                "{} holds extended attributes or a resource fork; git and pkgbuild may not preserve them",
                path.display()
            ),
            SyncWarning::OwnershipNotApplied { path, reason } => {
                write!(f, "owner/group of {} not changed: {}", path.display(), reason)
            }
            SyncWarning::Untracked(path) => {
                write!(f, "{} is not listed in Bom.txt", path.display())
            }
            SyncWarning::Unreadable { path, reason } => {
                write!(f, "could not scan {}: {}", path.display(), reason)
            }
        }
    }
}

/// What a sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Modes set, owners changed and directories created.
    pub changes: usize,
    /// Findings that did not stop the run.
    pub warnings: Vec<SyncWarning>,
}

/// Applies `Bom.txt` to the project's payload directory.
///
/// Blocking; callers on the async runtime should use `spawn_blocking`.
pub fn sync_from_bom_info(layout: &ProjectLayout) -> Result<SyncReport> {
    let bom_file = layout.bom_file();
    if !bom_file.is_file() {
        return Err(Error::GenericError(format!(
            "can't sync with bom info: no {} found in {}",
            super::BOM_TEXT_FILE,
            layout.root().display()
        )));
    }
    let text = fs::read_to_string(&bom_file).fs_context("reading bom info", &bom_file)?;
    let entries = parse_listing(&text)?;

    let payload = layout.payload_dir();
    let mut sync = Synchronizer {
        payload: &payload,
        as_root: running_as_root(),
        report: SyncReport::default(),
        ownership_skipped: 0,
    };
    for entry in &entries {
        sync.apply(entry)?;
    }
    if sync.ownership_skipped > 0 {
        sync.report.warnings.push(SyncWarning::OwnershipNotApplied {
            path: payload.clone(),
            reason: format!(
                "{} item(s) differ; run as root to sync owner and group",
                sync.ownership_skipped
            ),
        });
    }

    let tracked: HashSet<&str> = entries.iter().map(BomEntry::relative_path).collect();
    sync.report_untracked(&tracked);

    let report = sync.report;
    if report.changes == 0 {
        log::info!("Sync successful: no changes needed.");
    } else {
        log::info!("Sync successful: {} change(s).", report.changes);
    }
    Ok(report)
}

struct Synchronizer<'a> {
    payload: &'a Path,
    as_root: bool,
    report: SyncReport,
    ownership_skipped: usize,
}

impl Synchronizer<'_> {
    fn apply(&mut self, entry: &BomEntry) -> Result<()> {
        let path = self.payload.join(entry.relative_path());

        if entry.is_apple_double() {
            let warning = SyncWarning::ExtendedAttributes(path);
            log::debug!("{}", warning);
            self.report.warnings.push(warning);
            return Ok(());
        }

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return self.create_missing(entry, path);
            }
            Err(e) => return Err(e).fs_context("inspecting", path),
        };

        if entry.kind() != EntryKind::Symlink
            && metadata.mode() & PERMISSION_MASK != entry.permissions()
        {
            log::info!(
                "Changing mode of {} to {:o}",
                path.display(),
                entry.permissions()
            );
            fs::set_permissions(&path, fs::Permissions::from_mode(entry.permissions()))
                .fs_context("changing mode of", &path)?;
            self.report.changes += 1;
        }

        if metadata.uid() != entry.uid || metadata.gid() != entry.gid {
            self.apply_owner(entry, &path);
        }
        Ok(())
    }

    fn create_missing(&mut self, entry: &BomEntry, path: PathBuf) -> Result<()> {
        if entry.kind() != EntryKind::Directory {
            let warning = SyncWarning::MissingFile(path);
            log::debug!("{}", warning);
            self.report.warnings.push(warning);
            return Ok(());
        }

        log::info!(
            "Creating {} with mode {:o}",
            path.display(),
            entry.permissions()
        );
        fs::create_dir_all(&path).fs_context("creating directory", &path)?;
        // Explicit chmod: the umask applies to mkdir.
        fs::set_permissions(&path, fs::Permissions::from_mode(entry.permissions()))
            .fs_context("changing mode of", &path)?;
        self.report.changes += 1;

        let metadata = fs::symlink_metadata(&path).fs_context("inspecting", &path)?;
        if metadata.uid() != entry.uid || metadata.gid() != entry.gid {
            self.apply_owner(entry, &path);
        }
        Ok(())
    }

    fn apply_owner(&mut self, entry: &BomEntry, path: &Path) {
        if !self.as_root {
            self.ownership_skipped += 1;
            return;
        }
        log::info!(
            "Changing user/group of {} to {}/{}",
            path.display(),
            entry.uid,
            entry.gid
        );
        match lchown(path, Some(entry.uid), Some(entry.gid)) {
            Ok(()) => self.report.changes += 1,
            Err(e) => {
                let warning = SyncWarning::OwnershipNotApplied {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                };
                log::debug!("{}", warning);
                self.report.warnings.push(warning);
            }
        }
    }

    fn report_untracked(&mut self, tracked: &HashSet<&str>) {
        if !self.payload.is_dir() {
            return;
        }
        for item in walkdir::WalkDir::new(self.payload).follow_links(false) {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    let warning = SyncWarning::Unreadable {
                        path: e.path().unwrap_or(self.payload).to_path_buf(),
                        reason: e.to_string(),
                    };
                    log::debug!("{}", warning);
                    self.report.warnings.push(warning);
                    continue;
                }
            };
            let Ok(relative) = item.path().strip_prefix(self.payload) else {
                continue;
            };
            let relative = relative.to_string_lossy();
            if !tracked.contains(relative.as_ref()) {
                let warning = SyncWarning::Untracked(item.path().to_path_buf());
                log::debug!("{}", warning);
                self.report.warnings.push(warning);
            }
        }
    }
}
