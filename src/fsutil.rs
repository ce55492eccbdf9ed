//! Filesystem helpers shared by the staging merge, reconciler and alias resolver.

use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Move `src` to `dst`, falling back to copy + delete when a rename is not
/// possible (e.g. across filesystems).
///
/// The fallback copies into a temporary sibling of `dst` and renames it into
/// place, so an existing `dst` is either fully replaced or left untouched.
pub fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            let metadata = fs::symlink_metadata(src)?;
            tracing::debug!(
                "rename {} -> {} failed ({}), copying instead",
                src.display(),
                dst.display(),
                rename_err
            );
            if metadata.is_dir() {
                copy_dir_then_rename(src, dst)?;
                fs::remove_dir_all(src)
            } else {
                copy_then_rename(src, dst)?;
                fs::remove_file(src)
            }
        }
    }
}

fn parent_of(path: &Path) -> io::Result<&Path> {
    path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })
}

/// Copy `src` next to `dst` and atomically rename the copy over `dst`.
pub fn copy_then_rename(src: &Path, dst: &Path) -> io::Result<()> {
    let staged = tempfile::Builder::new()
        .prefix(".modelstage-")
        .tempfile_in(parent_of(dst)?)?;
    fs::copy(src, staged.path())?;
    staged.persist(dst).map_err(|e| e.error)?;
    Ok(())
}

fn copy_dir_then_rename(src: &Path, dst: &Path) -> io::Result<()> {
    let staged = tempfile::Builder::new()
        .prefix(".modelstage-")
        .tempdir_in(parent_of(dst)?)?;
    let copy = staged.path().join("tree");
    copy_dir_all(src, &copy)?;
    fs::rename(&copy, dst)
}

/// Hard-link `src` to `dst`, copying when a link cannot be made.
pub fn link_or_copy(src: &Path, dst: &Path) -> io::Result<()> {
    if let Err(e) = fs::hard_link(src, dst) {
        tracing::debug!("hard link {} failed ({}), copying", dst.display(), e);
        fs::copy(src, dst)?;
    }
    Ok(())
}

/// Recursively copy a directory tree, following symlinks inside it.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// True when `path` is missing or a directory without entries.
pub fn dir_is_empty(path: &Path) -> io::Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// Remove a symlink regardless of whether it points at a file or a directory.
pub fn remove_symlink(path: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if fs::remove_dir(path).is_ok() {
            return Ok(());
        }
    }
    fs::remove_file(path)
}

/// Create a directory symlink at `link` pointing to `target`.
pub fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(target, link)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (target, link);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symlinks are not supported on this platform",
        ))
    }
}
