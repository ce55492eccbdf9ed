use crate::model::ComponentSpec;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentPresence {
    pub name: &'static str,
    pub present: bool,
    /// Byte size of the canonical file; `None` when absent or not a regular file.
    pub size_bytes: Option<u64>,
}

/// Read-only view of which canonical component paths exist under a store root.
pub struct LayoutInspector;

impl LayoutInspector {
    pub fn inspect<'a>(
        root: &Path,
        components: impl IntoIterator<Item = &'a ComponentSpec>,
    ) -> Vec<ComponentPresence> {
        components
            .into_iter()
            .map(|spec| Self::inspect_one(root, spec))
            .collect()
    }

    pub fn inspect_one(root: &Path, spec: &ComponentSpec) -> ComponentPresence {
        // fs::metadata follows symlinks, so an aliased file counts as present
        match fs::metadata(root.join(spec.canonical_relative_path())) {
            Ok(metadata) => ComponentPresence {
                name: spec.name,
                present: true,
                size_bytes: metadata.is_file().then(|| metadata.len()),
            },
            Err(_) => ComponentPresence {
                name: spec.name,
                present: false,
                size_bytes: None,
            },
        }
    }

    /// A store root that is missing or has no entries at all.
    pub fn store_is_empty(root: &Path) -> bool {
        crate::fsutil::dir_is_empty(root).unwrap_or(false)
    }
}
