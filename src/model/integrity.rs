//! Size-based integrity checks for model weights.
//!
//! A present file is not necessarily a usable one: interrupted downloads and
//! git-lfs pointer stubs leave small files behind under the right name. Each
//! component declares a minimum byte size and anything below it is rejected.
//!
//! This is a heuristic, not a guarantee. The registry publishes no checksums
//! for these artifacts, so a truncated file that still exceeds the threshold
//! passes. Treat `Complete` as "plausibly the real weights".

use crate::error::Error;
use crate::model::{AliasSpec, ComponentSpec};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    Complete { size: u64 },
    TooSmall { size: u64, min: u64 },
    Missing,
}

impl IntegrityStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, IntegrityStatus::Complete { .. })
    }

    /// Error form of a failing status, `None` when complete.
    pub fn to_error(self, spec: &ComponentSpec) -> Option<Error> {
        match self {
            IntegrityStatus::Complete { .. } => None,
            IntegrityStatus::TooSmall { size, min } => Some(Error::IntegrityTooSmall {
                component: spec.name.to_string(),
                size,
                min,
            }),
            IntegrityStatus::Missing => Some(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is missing", spec.canonical_relative_path().display()),
            ))),
        }
    }
}

pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Threshold applied to a component; a zero-byte file never passes.
    pub fn threshold(spec: &ComponentSpec) -> u64 {
        spec.min_size_bytes.unwrap_or(1).max(1)
    }

    pub fn verify(root: &Path, spec: &ComponentSpec) -> IntegrityStatus {
        let path = root.join(spec.canonical_relative_path());
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return IntegrityStatus::Missing,
        };

        let size = metadata.len();
        let min = Self::threshold(spec);
        if size >= min {
            IntegrityStatus::Complete { size }
        } else {
            IntegrityStatus::TooSmall { size, min }
        }
    }

    /// Whether the alias path resolves, through any symlink, to a directory.
    pub fn alias_resolves(root: &Path, alias: &AliasSpec) -> bool {
        fs::canonicalize(root.join(alias.alias))
            .map(|resolved| resolved.is_dir())
            .unwrap_or(false)
    }
}
