use crate::error::Error;
use crate::fsutil;
use crate::model::ComponentSpec;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ReconcileOutcome {
    AlreadyCanonical,
    Reconciled { files: usize },
    NoMarker,
    Failed(Error),
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<(&'static str, ReconcileOutcome)>,
}

impl ReconcileReport {
    pub fn reconciled(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ReconcileOutcome::Reconciled { .. }))
            .map(|(name, _)| *name)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &Error)> + '_ {
        self.outcomes.iter().filter_map(|(name, o)| match o {
            ReconcileOutcome::Failed(e) => Some((*name, e)),
            _ => None,
        })
    }
}

/// Moves flat upstream layouts (`top/marker`) into the canonical nested
/// layout (`top/nested/marker`).
pub struct LayoutReconciler;

impl LayoutReconciler {
    pub fn reconcile<'a>(
        root: &Path,
        components: impl IntoIterator<Item = &'a ComponentSpec>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for spec in components {
            let outcome = Self::reconcile_one(root, spec);
            match &outcome {
                ReconcileOutcome::Reconciled { files } => tracing::info!(
                    "Moved {} file(s) of '{}' into {}",
                    files,
                    spec.name,
                    spec.artifact_dir().display()
                ),
                ReconcileOutcome::Failed(e) => tracing::warn!("{}", e),
                _ => {}
            }
            report.outcomes.push((spec.name, outcome));
        }

        report
    }

    pub fn reconcile_one(root: &Path, spec: &ComponentSpec) -> ReconcileOutcome {
        // symlink_metadata: a dangling symlink still occupies the canonical slot
        if fs::symlink_metadata(root.join(spec.canonical_relative_path())).is_ok() {
            return ReconcileOutcome::AlreadyCanonical;
        }

        let flat_marker = root.join(spec.flat_marker_path());
        match fs::symlink_metadata(&flat_marker) {
            Ok(metadata) if metadata.is_file() => {}
            _ => return ReconcileOutcome::NoMarker,
        }

        match Self::nest_flat_files(&root.join(spec.top_dir), &root.join(spec.artifact_dir())) {
            Ok(files) => ReconcileOutcome::Reconciled { files },
            Err(source) => ReconcileOutcome::Failed(Error::StructuralMoveFailed {
                component: spec.name.to_string(),
                source,
            }),
        }
    }

    /// Move every regular file of `top` into `nested`. On failure the files
    /// already moved are put back so the component is left as it was found.
    fn nest_flat_files(top: &Path, nested: &Path) -> io::Result<usize> {
        let mut files = Vec::new();
        for entry in fs::read_dir(top)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.file_name());
            }
        }
        files.sort();

        let created_nested = !nested.exists();
        fs::create_dir_all(nested)?;

        let mut moved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
        for name in &files {
            let src = top.join(name);
            let dst = nested.join(name);
            let result = if dst.exists() {
                Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", dst.display()),
                ))
            } else {
                fsutil::move_path(&src, &dst)
            };

            if let Err(e) = result {
                Self::roll_back(&moved, nested, created_nested);
                return Err(e);
            }
            moved.push((src, dst));
        }

        Ok(moved.len())
    }

    fn roll_back(moved: &[(PathBuf, PathBuf)], nested: &Path, created_nested: bool) {
        for (src, dst) in moved.iter().rev() {
            if let Err(e) = fsutil::move_path(dst, src) {
                tracing::error!(
                    "Could not restore {} to {}: {}",
                    dst.display(),
                    src.display(),
                    e
                );
            }
        }
        if created_nested && fsutil::dir_is_empty(nested).unwrap_or(false) {
            if let Err(e) = fs::remove_dir(nested) {
                tracing::warn!("Could not remove {}: {}", nested.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::SystemTime;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    const LAYOUT: ComponentSpec = ComponentSpec {
        name: "layout",
        top_dir: "Layout",
        nested_dir: "LayoutLMv3",
        marker: "model_final.pth",
        required: true,
        min_size_bytes: None,
        feature: None,
    };

    const MFD: ComponentSpec = ComponentSpec {
        name: "formula_detection",
        top_dir: "MFD",
        nested_dir: "YOLO",
        marker: "yolo_v8_ft.pt",
        required: true,
        min_size_bytes: None,
        feature: None,
    };

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, (bool, SystemTime)> {
        WalkDir::new(root)
            .into_iter()
            .map(|e| e.unwrap())
            .map(|e| {
                let metadata = e.metadata().unwrap();
                (
                    e.path().strip_prefix(root).unwrap().to_path_buf(),
                    (metadata.is_dir(), metadata.modified().unwrap()),
                )
            })
            .collect()
    }

    #[test]
    fn test_flat_layout_is_nested() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Layout")).unwrap();
        fs::write(root.join("Layout/model_final.pth"), "weights").unwrap();
        fs::write(root.join("Layout/config.json"), "{}").unwrap();

        let report = LayoutReconciler::reconcile(root, [&LAYOUT]);
        assert!(matches!(
            report.outcomes[0].1,
            ReconcileOutcome::Reconciled { files: 2 }
        ));
        assert!(root.join("Layout/LayoutLMv3/model_final.pth").exists());
        assert!(root.join("Layout/LayoutLMv3/config.json").exists());
        assert!(!root.join("Layout/model_final.pth").exists());
    }

    #[test]
    fn test_canonical_tree_is_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Layout/LayoutLMv3")).unwrap();
        fs::write(root.join("Layout/LayoutLMv3/model_final.pth"), "weights").unwrap();
        // a stray flat copy must not be pulled in once the canonical file exists
        fs::write(root.join("Layout/model_final.pth"), "stale").unwrap();

        let before = snapshot(root);
        let report = LayoutReconciler::reconcile(root, [&LAYOUT]);
        let after = snapshot(root);

        assert!(matches!(report.outcomes[0].1, ReconcileOutcome::AlreadyCanonical));
        assert_eq!(before, after);
        assert_eq!(
            fs::read_to_string(root.join("Layout/LayoutLMv3/model_final.pth")).unwrap(),
            "weights"
        );
    }

    #[test]
    fn test_second_pass_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("MFD")).unwrap();
        fs::write(root.join("MFD/yolo_v8_ft.pt"), "weights").unwrap();

        LayoutReconciler::reconcile(root, [&MFD]);
        let before = snapshot(root);
        let report = LayoutReconciler::reconcile(root, [&MFD]);

        assert_eq!(report.reconciled().count(), 0);
        assert_eq!(before, snapshot(root));
    }

    #[test]
    fn test_no_marker() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Layout")).unwrap();
        fs::write(root.join("Layout/readme.md"), "docs").unwrap();

        let report = LayoutReconciler::reconcile(root, [&LAYOUT]);
        assert!(matches!(report.outcomes[0].1, ReconcileOutcome::NoMarker));
        assert!(root.join("Layout/readme.md").exists());
        assert!(!root.join("Layout/LayoutLMv3").exists());
    }

    #[test]
    fn test_failure_rolls_back_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        // config.json collides inside the nested dir, model_final.pth sorts after it
        fs::create_dir_all(root.join("Layout/LayoutLMv3")).unwrap();
        fs::write(root.join("Layout/LayoutLMv3/config.json"), "existing").unwrap();
        fs::write(root.join("Layout/a_tokenizer.json"), "tok").unwrap();
        fs::write(root.join("Layout/config.json"), "{}").unwrap();
        fs::write(root.join("Layout/model_final.pth"), "weights").unwrap();

        fs::create_dir_all(root.join("MFD")).unwrap();
        fs::write(root.join("MFD/yolo_v8_ft.pt"), "weights").unwrap();

        let report = LayoutReconciler::reconcile(root, [&LAYOUT, &MFD]);

        let failures: Vec<&str> = report.failures().map(|(name, _)| name).collect();
        assert_eq!(failures, vec!["layout"]);
        assert!(matches!(
            report.failures().next().unwrap().1,
            Error::StructuralMoveFailed { .. }
        ));

        // layout left exactly as found
        assert!(root.join("Layout/a_tokenizer.json").exists());
        assert!(root.join("Layout/model_final.pth").exists());
        assert!(!root.join("Layout/LayoutLMv3/a_tokenizer.json").exists());
        assert_eq!(
            fs::read_to_string(root.join("Layout/LayoutLMv3/config.json")).unwrap(),
            "existing"
        );

        // the independent component was still reconciled
        assert!(root.join("MFD/YOLO/yolo_v8_ft.pt").exists());
    }
}
