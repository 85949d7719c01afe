//! Bom metadata export and replay.
//!
//! Git does not track owners, most mode bits, or empty directories. A build
//! with `--export-bom-info` records them from the package manifest into
//! `Bom.txt`; `--sync` applies that file to a fresh checkout.

use crate::bundler::settings::BOM_TEXT_FILE;

mod entry;
mod export;
#[cfg(unix)]
mod sync;

pub use entry::{BomEntry, EntryKind};
pub use export::export_bom_info;
#[cfg(unix)]
pub use sync::{SyncReport, SyncWarning, sync_from_bom_info};

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bundler::{
        process::{ProcessOutput, testing::ScriptedRunner},
        settings::ProjectLayout,
        utils::running_as_root,
    };
    use std::{
        fs,
        os::unix::fs::{MetadataExt, PermissionsExt},
        path::Path,
    };

    #[tokio::test]
    async fn exported_listing_restores_a_fresh_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        let (uid, gid) = (users::get_effective_uid(), users::get_effective_gid());
        // As root the file gets a foreign owner so chown is observable.
        let (file_uid, file_gid) = if running_as_root() { (1, 1) } else { (uid, gid) };

        let extracted = dir.path().join("Bom");
        let extracted_for_runner = extracted.clone();
        let listing = format!(
            "./tool\t100644\t{file_uid}/{file_gid}\t3\t891568578\n./Empty\t40750\t{uid}/{gid}\n.\t40755\t{uid}/{gid}\n"
        );
        let runner = ScriptedRunner::new(move |cmd| {
            if cmd.name() == "pkgutil" {
                fs::write(&extracted_for_runner, "bom").unwrap();
                ProcessOutput::ok(extracted_for_runner.display().to_string())
            } else {
                ProcessOutput::ok(listing.clone())
            }
        });
        export_bom_info(&runner, Path::new("/p/build/Tool-1.0.pkg"), &layout)
            .await
            .unwrap();

        // A checkout holds file content only.
        let payload = layout.payload_dir();
        fs::create_dir(&payload).unwrap();
        fs::set_permissions(&payload, fs::Permissions::from_mode(0o755)).unwrap();
        let tool = payload.join("tool");
        fs::write(&tool, "abc").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o600)).unwrap();

        let report = sync_from_bom_info(&layout).unwrap();

        let empty = fs::metadata(payload.join("Empty")).unwrap();
        assert!(empty.is_dir());
        assert_eq!(empty.mode() & 0o7777, 0o750);
        let meta = fs::metadata(&tool).unwrap();
        assert_eq!(meta.mode() & 0o7777, 0o644);
        assert_eq!((meta.uid(), meta.gid()), (file_uid, file_gid));
        assert_eq!(fs::read_to_string(&tool).unwrap(), "abc");
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);

        assert_eq!(sync_from_bom_info(&layout).unwrap().changes, 0);
    }
}
