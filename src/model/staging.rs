use crate::error::Result;
use crate::fsutil;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Scratch directory holding one freshly fetched snapshot.
///
/// The directory name is unique per process and call, and the directory is
/// deleted when the session is dropped, whether or not the run succeeded.
pub struct StagingSession {
    dir: TempDir,
}

impl StagingSession {
    pub fn create(scratch_dir: &Path) -> Result<Self> {
        fs::create_dir_all(scratch_dir)?;
        let dir = tempfile::Builder::new()
            .prefix("modelstage-staging-")
            .tempdir_in(scratch_dir)?;

        tracing::debug!("Created staging directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the staging directory, surfacing any cleanup error.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!("Removed staging directory {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub moved: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Merge a staged snapshot into the store.
///
/// Files missing from the store are moved in. An existing file is replaced by
/// its staged counterpart when sizes differ, or always when `overwrite` is
/// set; replacement renames a fully staged file over the old one. Symlinks and
/// kind mismatches in the store are left alone. A failing entry is logged and
/// counted without stopping the merge.
pub fn merge_into(snapshot_root: &Path, store_root: &Path, overwrite: bool) -> Result<MergeReport> {
    let mut report = MergeReport::default();

    if !snapshot_root.is_dir() {
        tracing::warn!(
            "Fetched snapshot has no {} directory, nothing to merge",
            snapshot_root.display()
        );
        return Ok(report);
    }

    fs::create_dir_all(store_root)?;
    merge_dir(snapshot_root, store_root, overwrite, &mut report)?;

    tracing::info!(
        "Merged snapshot into {}: {} moved, {} replaced, {} skipped, {} failed",
        store_root.display(),
        report.moved,
        report.replaced,
        report.skipped,
        report.failed
    );
    Ok(report)
}

fn merge_dir(src: &Path, dst: &Path, overwrite: bool, report: &mut MergeReport) -> Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Could not read staged entry in {}: {}", src.display(), e);
                report.failed += 1;
                continue;
            }
        };
        let dst_path = dst.join(entry.file_name());

        if let Err(e) = merge_entry(&entry, &dst_path, overwrite, report) {
            tracing::warn!("Could not merge {}: {}", dst_path.display(), e);
            report.failed += 1;
        }
    }
    Ok(())
}

fn merge_entry(
    entry: &fs::DirEntry,
    dst_path: &Path,
    overwrite: bool,
    report: &mut MergeReport,
) -> Result<()> {
    let src_path = entry.path();
    let src_is_dir = entry.file_type()?.is_dir();

    match fs::symlink_metadata(dst_path).ok() {
        None => {
            fsutil::move_path(&src_path, dst_path)?;
            report.moved += 1;
        }
        Some(meta) if meta.file_type().is_symlink() => {
            tracing::debug!("Not replacing symlink {}", dst_path.display());
            report.skipped += 1;
        }
        Some(meta) if meta.is_dir() && src_is_dir => {
            merge_dir(&src_path, dst_path, overwrite, report)?;
        }
        Some(meta) if meta.is_file() && !src_is_dir => {
            let staged_len = fs::metadata(&src_path)?.len();
            if overwrite || staged_len != meta.len() {
                fsutil::move_path(&src_path, dst_path)?;
                report.replaced += 1;
            } else {
                report.skipped += 1;
            }
        }
        Some(_) => {
            tracing::warn!(
                "{} differs in kind from the staged entry, leaving it",
                dst_path.display()
            );
            report.skipped += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_is_removed_on_drop() {
        let scratch = tempfile::TempDir::new().unwrap();
        let path = {
            let session = StagingSession::create(scratch.path()).unwrap();
            fs::write(session.path().join("partial.bin"), "x").unwrap();
            session.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_sessions_are_unique() {
        let scratch = tempfile::TempDir::new().unwrap();
        let a = StagingSession::create(scratch.path()).unwrap();
        let b = StagingSession::create(scratch.path()).unwrap();
        assert_ne!(a.path(), b.path());

        let path = a.path().to_path_buf();
        a.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_merge_fills_missing_and_replaces_placeholders() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let staged = temp_dir.path().join("staged");
        let store = temp_dir.path().join("store");

        fs::create_dir_all(staged.join("Layout/LayoutLMv3")).unwrap();
        fs::write(staged.join("Layout/LayoutLMv3/model_final.pth"), "full weights").unwrap();
        fs::write(staged.join("Layout/LayoutLMv3/config.json"), "{}").unwrap();
        fs::create_dir_all(staged.join("MFD/YOLO")).unwrap();
        fs::write(staged.join("MFD/YOLO/yolo_v8_ft.pt"), "weights").unwrap();

        fs::create_dir_all(store.join("Layout/LayoutLMv3")).unwrap();
        fs::write(store.join("Layout/LayoutLMv3/model_final.pth"), "stub").unwrap();
        fs::write(store.join("Layout/LayoutLMv3/config.json"), "[]").unwrap();

        let report = merge_into(&staged, &store, false).unwrap();

        assert_eq!(
            fs::read_to_string(store.join("Layout/LayoutLMv3/model_final.pth")).unwrap(),
            "full weights"
        );
        // same size, kept as is
        assert_eq!(
            fs::read_to_string(store.join("Layout/LayoutLMv3/config.json")).unwrap(),
            "[]"
        );
        assert!(store.join("MFD/YOLO/yolo_v8_ft.pt").exists());
        assert_eq!(
            report,
            MergeReport {
                moved: 1,
                replaced: 1,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn test_merge_overwrite_replaces_everything() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let staged = temp_dir.path().join("staged");
        let store = temp_dir.path().join("store");
        fs::create_dir_all(&staged).unwrap();
        fs::create_dir_all(&store).unwrap();
        fs::write(staged.join("config.json"), "{}").unwrap();
        fs::write(store.join("config.json"), "[]").unwrap();

        let report = merge_into(&staged, &store, true).unwrap();
        assert_eq!(report.replaced, 1);
        assert_eq!(fs::read_to_string(store.join("config.json")).unwrap(), "{}");
    }

    #[test]
    fn test_merge_missing_snapshot_is_noop() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let report = merge_into(
            &temp_dir.path().join("missing"),
            &temp_dir.path().join("store"),
            false,
        )
        .unwrap();
        assert_eq!(report, MergeReport::default());
        assert!(!temp_dir.path().join("store").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_entry_does_not_stop_merge() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let staged = temp_dir.path().join("staged");
        let store = temp_dir.path().join("store");

        // a dangling staged link cannot be sized against the existing file
        fs::create_dir_all(staged.join("Layout")).unwrap();
        std::os::unix::fs::symlink(staged.join("gone"), staged.join("Layout/model_final.pth"))
            .unwrap();
        fs::create_dir_all(staged.join("MFD/YOLO")).unwrap();
        fs::write(staged.join("MFD/YOLO/yolo_v8_ft.pt"), "weights").unwrap();
        fs::create_dir_all(store.join("Layout")).unwrap();
        fs::write(store.join("Layout/model_final.pth"), "good weights").unwrap();

        let report = merge_into(&staged, &store, false).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.moved, 1);
        assert!(store.join("MFD/YOLO/yolo_v8_ft.pt").exists());
        assert_eq!(
            fs::read_to_string(store.join("Layout/model_final.pth")).unwrap(),
            "good weights"
        );
    }

    /// Staging on a different filesystem than the store, when the host has one.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_cross_device_replacement_renames_over_file() {
        use std::os::unix::fs::MetadataExt;

        let shm = Path::new("/dev/shm");
        if !shm.is_dir() {
            return;
        }
        let scratch = match tempfile::TempDir::new_in(shm) {
            Ok(dir) => dir,
            Err(_) => return,
        };
        let store_dir = tempfile::TempDir::new().unwrap();
        let store = store_dir.path();
        let dev = |p: &Path| fs::metadata(p).unwrap().dev();
        if dev(scratch.path()) == dev(store) {
            return;
        }

        fs::write(scratch.path().join("model_final.pth"), "full weights").unwrap();
        fs::write(store.join("model_final.pth"), "stub").unwrap();
        let inode_before = fs::metadata(store.join("model_final.pth")).unwrap().ino();

        let report = merge_into(scratch.path(), store, false).unwrap();

        assert_eq!(report.replaced, 1);
        let after = fs::metadata(store.join("model_final.pth")).unwrap();
        assert_ne!(after.ino(), inode_before);
        assert_eq!(
            fs::read_to_string(store.join("model_final.pth")).unwrap(),
            "full weights"
        );
        assert!(!scratch.path().join("model_final.pth").exists());
    }
}
