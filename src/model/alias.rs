use crate::error::Error;
use crate::fsutil;
use crate::model::{AliasSpec, Catalog};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum AliasOutcome {
    Linked,
    Copied,
    Unchanged,
    /// A real directory or file already occupies the alias path.
    SkippedOccupied,
    SkippedMissingTarget,
    Failed(Error),
}

#[derive(Debug, Default)]
pub struct AliasReport {
    pub outcomes: Vec<(&'static str, AliasOutcome)>,
}

impl AliasReport {
    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &Error)> + '_ {
        self.outcomes.iter().filter_map(|(alias, o)| match o {
            AliasOutcome::Failed(e) => Some((*alias, e)),
            _ => None,
        })
    }
}

/// Makes historical model directory names resolve to the canonical artifact
/// directory of a component.
pub struct AliasResolver;

impl AliasResolver {
    pub fn resolve(root: &Path, catalog: &Catalog) -> AliasReport {
        let mut report = AliasReport::default();

        for alias in &catalog.aliases {
            let Some(component) = catalog.component(alias.target) else {
                report.outcomes.push((
                    alias.alias,
                    AliasOutcome::Failed(Error::ConfigError(format!(
                        "unknown alias target '{}'",
                        alias.target
                    ))),
                ));
                continue;
            };

            let outcome = Self::resolve_one(
                root,
                alias,
                &root.join(component.artifact_dir()),
                fsutil::symlink_dir,
            );
            match &outcome {
                AliasOutcome::Linked => tracing::info!("Linked {} -> {}", alias.alias, alias.target),
                AliasOutcome::Copied => tracing::info!(
                    "Symlinks unavailable, copied {} into {}",
                    alias.target,
                    alias.alias
                ),
                AliasOutcome::SkippedOccupied => tracing::info!(
                    "Leaving {} alone: a real directory is already there",
                    alias.alias
                ),
                AliasOutcome::SkippedMissingTarget => {
                    tracing::debug!("Alias {} skipped, {} not present", alias.alias, alias.target)
                }
                AliasOutcome::Failed(e) => tracing::warn!("{}", e),
                AliasOutcome::Unchanged => {}
            }
            report.outcomes.push((alias.alias, outcome));
        }

        report
    }

    fn resolve_one(
        root: &Path,
        alias: &AliasSpec,
        target: &Path,
        link: impl Fn(&Path, &Path) -> io::Result<()>,
    ) -> AliasOutcome {
        let alias_path = root.join(alias.alias);
        let canonical_target = fs::canonicalize(target).ok();

        if let Ok(metadata) = fs::symlink_metadata(&alias_path) {
            if metadata.file_type().is_symlink() {
                let current = fs::read_link(&alias_path).ok();
                if current.is_some() && current == canonical_target {
                    return AliasOutcome::Unchanged;
                }
                if let Err(e) = fsutil::remove_symlink(&alias_path) {
                    return Self::failed(alias, format!("could not remove stale link: {e}"));
                }
            } else if metadata.is_dir() {
                match fsutil::dir_is_empty(&alias_path) {
                    Ok(true) => {
                        if let Err(e) = fs::remove_dir(&alias_path) {
                            return Self::failed(alias, format!("could not remove empty dir: {e}"));
                        }
                    }
                    _ => return AliasOutcome::SkippedOccupied,
                }
            } else {
                return AliasOutcome::SkippedOccupied;
            }
        }

        let Some(target) = canonical_target.filter(|t| t.is_dir()) else {
            return AliasOutcome::SkippedMissingTarget;
        };

        if let Some(parent) = alias_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return Self::failed(alias, e.to_string());
            }
        }

        match link(&target, &alias_path) {
            Ok(()) => AliasOutcome::Linked,
            Err(link_err) => {
                tracing::debug!("symlink {} failed: {}", alias_path.display(), link_err);
                match fsutil::copy_dir_all(&target, &alias_path) {
                    Ok(()) => AliasOutcome::Copied,
                    Err(copy_err) => {
                        // leave nothing half-copied behind
                        if let Err(e) = fs::remove_dir_all(&alias_path) {
                            tracing::debug!("cleanup of {} failed: {}", alias_path.display(), e);
                        }
                        Self::failed(
                            alias,
                            format!("symlink failed ({link_err}), copy failed ({copy_err})"),
                        )
                    }
                }
            }
        }
    }

    fn failed(alias: &AliasSpec, reason: String) -> AliasOutcome {
        AliasOutcome::Failed(Error::AliasCreationFailed {
            alias: alias.alias.to_string(),
            reason,
        })
    }

    /// Absolute path an alias is expected to resolve to, when its target exists.
    pub fn expected_target(root: &Path, catalog: &Catalog, alias: &AliasSpec) -> Option<PathBuf> {
        let component = catalog.component(alias.target)?;
        fs::canonicalize(root.join(component.artifact_dir())).ok()
    }
}
