//! File move that refuses to follow symbolic links at either end.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::domain::MoveError;

/// `EXDEV`: rename across filesystems.
const CROSS_DEVICE_LINK: i32 = 18;

/// Absolute, normalised form of `path`.
///
/// Expands a leading `~`, resolves relative segments and every symlink in
/// the parent directory chain. The final component is left as is so a
/// symlinked file stays visible to the caller's checks.
pub fn canonical_path(path: &Path) -> PathBuf {
    let expanded = expand_home(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    };
    let normalized = normalize(&absolute);

    if let (Some(parent), Some(name)) = (normalized.parent(), normalized.file_name()) {
        if let Ok(parent) = fs::canonicalize(parent) {
            return parent.join(name);
        }
    }
    normalized
}

fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Move `source` to `destination`, keeping the file name when the
/// destination is a directory.
///
/// Fails when the source is not a regular file, or when the source, the
/// destination or the final target is a symbolic link.
pub fn move_file(source: &Path, destination: &Path) -> Result<PathBuf, MoveError> {
    let source = canonical_path(source);
    let destination = canonical_path(destination);
    debug!(src = %source.display(), dst = %destination.display(), "checking move paths");

    if !source.is_file() {
        return Err(MoveError::NotRegularFile(source));
    }
    if is_symlink(&source) {
        return Err(MoveError::SourceSymlink(source));
    }
    if is_symlink(&destination) {
        return Err(MoveError::DestinationSymlink(destination));
    }

    let target = if destination.is_dir() {
        let name: OsString = source.file_name().map(OsString::from).unwrap_or_default();
        destination.join(name)
    } else {
        destination
    };
    if is_symlink(&target) {
        return Err(MoveError::DestinationSymlink(target));
    }

    let failed = |source_path: &Path, target: &Path, e: io::Error| MoveError::Failed {
        from: source_path.to_path_buf(),
        to: target.to_path_buf(),
        source: e,
    };

    if target == source {
        return Err(failed(
            &source,
            &target,
            io::Error::new(io::ErrorKind::InvalidInput, "source and destination are the same file"),
        ));
    }

    match fs::rename(&source, &target) {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_LINK) => {
            debug!("cross-device move, copying instead");
            copy_then_remove(&source, &target).map_err(|e| failed(&source, &target, e))?;
        }
        Err(e) => return Err(failed(&source, &target, e)),
    }

    debug!(target = %target.display(), "file moved");
    Ok(target)
}

/// Copy `source` to `target`, then delete `source`. A failed copy leaves no
/// partial `target` behind.
fn copy_then_remove(source: &Path, target: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(source, target) {
        if let Err(cleanup) = fs::remove_file(target) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                debug!(error = %cleanup, target = %target.display(), "could not remove partial copy");
            }
        }
        return Err(e);
    }
    fs::remove_file(source)
}
