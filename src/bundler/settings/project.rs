//! On-disk layout of a package project.

use crate::bundler::error::{ErrorExt, Result};
use std::path::{Path, PathBuf};

/// Bom listing kept at the project root.
pub const BOM_TEXT_FILE: &str = "Bom.txt";

/// Optional pre-install requirements for distribution packages.
pub const REQUIREMENTS_PLIST: &str = "product-requirements.plist";

/// Scripts `pkgbuild` runs around the payload install.
pub const INSTALL_SCRIPTS: [&str; 2] = ["preinstall", "postinstall"];

const DS_STORE: &str = ".DS_Store";

/// What the `payload/` directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadState {
    /// No payload directory: the package installs nothing and leaves no receipt.
    Absent,
    /// Directory exists but is empty: the package only leaves a receipt.
    Empty,
    /// Regular payload.
    Populated,
}

/// Paths of a package project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name used for defaults, without trailing separators.
    pub fn project_name(&self) -> String {
        self.root
            .components()
            .next_back()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `payload/`
    pub fn payload_dir(&self) -> PathBuf {
        self.root.join("payload")
    }

    /// `scripts/`
    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    /// `build/`
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// `Bom.txt`
    pub fn bom_file(&self) -> PathBuf {
        self.root.join(BOM_TEXT_FILE)
    }

    /// `product-requirements.plist`
    pub fn requirements_plist(&self) -> PathBuf {
        self.root.join(REQUIREMENTS_PLIST)
    }

    /// Classifies the payload directory.
    pub async fn payload_state(&self) -> Result<PayloadState> {
        let payload = self.payload_dir();
        if !payload.is_dir() {
            return Ok(PayloadState::Absent);
        }
        let mut entries = tokio::fs::read_dir(&payload)
            .await
            .fs_context("reading payload directory", &payload)?;
        let first = entries
            .next_entry()
            .await
            .fs_context("reading payload directory", &payload)?;
        Ok(if first.is_some() {
            PayloadState::Populated
        } else {
            PayloadState::Empty
        })
    }

    /// Returns the scripts directory when it holds an install script.
    ///
    /// A stray `.DS_Store` is removed and install scripts without owner
    /// read/execute permission are made `0755`.
    pub async fn prepare_scripts(&self) -> Result<Option<PathBuf>> {
        let scripts = self.scripts_dir();
        if !scripts.is_dir() {
            return Ok(None);
        }

        let ds_store = scripts.join(DS_STORE);
        if ds_store.exists() {
            log::info!("Removing .DS_Store file from the scripts folder");
            tokio::fs::remove_file(&ds_store)
                .await
                .fs_context("removing .DS_Store", &ds_store)?;
        }

        let mut has_install_script = false;
        for name in INSTALL_SCRIPTS {
            let script = scripts.join(name);
            if !script.is_file() {
                continue;
            }
            has_install_script = true;
            make_executable(&script).await?;
        }

        if has_install_script {
            Ok(Some(scripts))
        } else {
            log::debug!(
                "{} has no preinstall or postinstall script; not including it",
                scripts.display()
            );
            Ok(None)
        }
    }
}

#[cfg(unix)]
async fn make_executable(script: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = tokio::fs::metadata(script)
        .await
        .fs_context("reading script metadata", script)?;
    if metadata.permissions().mode() & 0o500 != 0o500 {
        log::info!(
            "Making {} script executable",
            script.file_name().unwrap_or_default().to_string_lossy()
        );
        tokio::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755))
            .await
            .fs_context("making script executable", script)?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_script: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn payload_state_distinguishes_absent_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        assert_eq!(layout.payload_state().await.unwrap(), PayloadState::Absent);

        std::fs::create_dir(layout.payload_dir()).unwrap();
        assert_eq!(layout.payload_state().await.unwrap(), PayloadState::Empty);

        std::fs::write(layout.payload_dir().join("file"), "x").unwrap();
        assert_eq!(layout.payload_state().await.unwrap(), PayloadState::Populated);
    }

    #[tokio::test]
    async fn scripts_are_included_only_with_install_script() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        assert_eq!(layout.prepare_scripts().await.unwrap(), None);

        std::fs::create_dir(layout.scripts_dir()).unwrap();
        std::fs::write(layout.scripts_dir().join("helper.sh"), "#!/bin/sh\n").unwrap();
        assert_eq!(layout.prepare_scripts().await.unwrap(), None);

        let postinstall = layout.scripts_dir().join("postinstall");
        std::fs::write(&postinstall, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&postinstall, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::write(layout.scripts_dir().join(".DS_Store"), "junk").unwrap();

        let scripts = layout.prepare_scripts().await.unwrap();
        assert_eq!(scripts, Some(layout.scripts_dir()));
        assert!(!layout.scripts_dir().join(".DS_Store").exists());
        let mode = std::fs::metadata(&postinstall).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn project_name_ignores_trailing_slash() {
        let layout = ProjectLayout::new("/tmp/projects/My Tool/");
        assert_eq!(layout.project_name(), "My Tool");
        assert_eq!(layout.bom_file(), Path::new("/tmp/projects/My Tool/Bom.txt"));
    }
}
