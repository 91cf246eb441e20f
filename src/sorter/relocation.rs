//! Destination resolution and file moves.
//!
//! Collisions are resolved by appending `_1`, `_2`, ... before the extension. The final
//! placement never replaces an existing file: a destination that is taken between
//! resolution and the move is reported as [`RelocationError::DestinationTaken`] and the
//! caller resolves again.

use crate::config::is_safe_folder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// After this many numbered candidates a UUID suffix is used instead
const MAX_NUMBERED_CANDIDATES: u32 = 10_000;

/// Why a relocation failed
#[derive(Debug, Error)]
pub enum RelocationError {
    #[error("source vanished: {0}")]
    SourceVanished(PathBuf),
    #[error("permission denied for {path}: {source}")]
    PermissionDenied { path: PathBuf, source: io::Error },
    #[error("disk full while writing {0}")]
    DiskFull(PathBuf),
    #[error("destination already exists: {0}")]
    DestinationTaken(PathBuf),
    #[error("invalid destination folder: {0:?}")]
    InvalidDestination(String),
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl RelocationError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => RelocationError::SourceVanished(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => RelocationError::PermissionDenied {
                path: path.to_path_buf(),
                source,
            },
            io::ErrorKind::StorageFull => RelocationError::DiskFull(path.to_path_buf()),
            _ => RelocationError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Result of a successful move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationOutcome {
    pub final_path: PathBuf,
    /// False only when a cross-volume copy succeeded but the source could not be deleted
    pub source_removed: bool,
}

/// `root/folder/name`, creating the folder and avoiding existing files
pub fn resolve(root: &Path, folder: &str, name: &str) -> Result<PathBuf, RelocationError> {
    if !is_safe_folder(folder) {
        return Err(RelocationError::InvalidDestination(folder.to_string()));
    }
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(RelocationError::InvalidDestination(name.to_string()));
    }

    let dir = root.join(folder.trim());
    fs::create_dir_all(&dir).map_err(|e| RelocationError::from_io(&dir, e))?;

    Ok(unique_path(&dir, name))
}

/// First of `name`, `stem_1.ext`, `stem_2.ext`, ... that does not exist in `dir`
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !exists(&candidate) {
        return candidate;
    }

    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for counter in 1..=MAX_NUMBERED_CANDIDATES {
        let candidate = dir.join(format!("{}_{}{}", stem, counter, ext));
        if !exists(&candidate) {
            return candidate;
        }
    }

    dir.join(format!("{}_{}{}", stem, uuid::Uuid::new_v4(), ext))
}

/// Exists, counting dangling symlinks
fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Move `source` to `destination` without replacing an existing file.
///
/// A hard link is tried first since it fails on an existing destination. Filesystems
/// without hard links fall back to rename, and only a cross-volume rename falls back
/// to copy + delete.
pub fn relocate(source: &Path, destination: &Path) -> Result<RelocationOutcome, RelocationError> {
    if !exists(source) {
        return Err(RelocationError::SourceVanished(source.to_path_buf()));
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| RelocationError::from_io(parent, e))?;
    }

    match fs::hard_link(source, destination) {
        Ok(()) => return unlink_source(source, destination),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(RelocationError::DestinationTaken(destination.to_path_buf()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RelocationError::SourceVanished(source.to_path_buf()))
        }
        Err(e) => {
            tracing::debug!(source = %source.display(), error = %e, "Hard link unavailable, renaming");
        }
    }

    if exists(destination) {
        return Err(RelocationError::DestinationTaken(destination.to_path_buf()));
    }

    match fs::rename(source, destination) {
        Ok(()) => Ok(RelocationOutcome {
            final_path: destination.to_path_buf(),
            source_removed: true,
        }),
        Err(e) if needs_copy(&e) => {
            tracing::debug!(source = %source.display(), error = %e, "Rename crosses volumes, copying");
            copy_then_remove(source, destination)
        }
        Err(e) => Err(RelocationError::from_io(source, e)),
    }
}

/// Only a cross-volume rename is retried as a copy
fn needs_copy(rename_err: &io::Error) -> bool {
    rename_err.kind() == io::ErrorKind::CrossesDevices
}

/// Second half of a link-based move. If the source can't be removed the new link is
/// dropped again so no duplicate is left behind.
fn unlink_source(source: &Path, destination: &Path) -> Result<RelocationOutcome, RelocationError> {
    match fs::remove_file(source) {
        Ok(()) => Ok(RelocationOutcome {
            final_path: destination.to_path_buf(),
            source_removed: true,
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RelocationOutcome {
            final_path: destination.to_path_buf(),
            source_removed: true,
        }),
        Err(e) => {
            let _ = fs::remove_file(destination);
            Err(RelocationError::from_io(source, e))
        }
    }
}

fn copy_then_remove(source: &Path, destination: &Path) -> Result<RelocationOutcome, RelocationError> {
    let mut reader = fs::File::open(source).map_err(|e| RelocationError::from_io(source, e))?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => RelocationError::DestinationTaken(destination.to_path_buf()),
            _ => RelocationError::from_io(destination, e),
        })?;

    if let Err(e) = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all()) {
        drop(writer);
        // Don't leave a partial file behind
        let _ = fs::remove_file(destination);
        return Err(RelocationError::from_io(destination, e));
    }
    drop(writer);

    if let Ok(meta) = fs::metadata(source) {
        let _ = fs::set_permissions(destination, meta.permissions());
    }

    let source_removed = match fs::remove_file(source) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(source = %source.display(), error = %e, "Copied but could not remove source");
            false
        }
    };

    Ok(RelocationOutcome {
        final_path: destination.to_path_buf(),
        source_removed,
    })
}

/// Async wrapper running the move on the blocking pool
pub async fn relocate_async(source: &Path, destination: &Path) -> Result<RelocationOutcome, RelocationError> {
    let source_owned = source.to_path_buf();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || relocate(&source_owned, &destination))
        .await
        .map_err(|e| RelocationError::Io {
            path: source.to_path_buf(),
            source: io::Error::other(format!("Task failed: {}", e)),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_creates_folder() {
        let root = tempdir().unwrap();
        let path = resolve(root.path(), "Financial/Invoices", "a.pdf").unwrap();
        assert_eq!(path, root.path().join("Financial/Invoices/a.pdf"));
        assert!(root.path().join("Financial/Invoices").is_dir());
    }

    #[test]
    fn test_repeated_resolution_yields_numbered_names() {
        let root = tempdir().unwrap();
        let mut names = Vec::new();
        for _ in 0..4 {
            let path = resolve(root.path(), "Others", "notes.txt").unwrap();
            fs::write(&path, "x").unwrap();
            names.push(path.file_name().unwrap().to_string_lossy().to_string());
        }
        assert_eq!(names, ["notes.txt", "notes_1.txt", "notes_2.txt", "notes_3.txt"]);
    }

    #[test]
    fn test_resolution_is_stable_without_writes() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("Others")).unwrap();
        fs::write(root.path().join("Others/notes.txt"), "x").unwrap();

        let a = resolve(root.path(), "Others", "notes.txt").unwrap();
        let b = resolve(root.path(), "Others", "notes.txt").unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with("notes_1.txt"));
    }

    #[test]
    fn test_no_extension_collision() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("Makefile"), "x").unwrap();
        assert_eq!(unique_path(root.path(), "Makefile"), root.path().join("Makefile_1"));
    }

    #[test]
    fn test_rejects_escaping_folder() {
        let root = tempdir().unwrap();
        assert!(matches!(
            resolve(root.path(), "../outside", "a.txt"),
            Err(RelocationError::InvalidDestination(_))
        ));
        assert!(matches!(
            resolve(root.path(), "Others", "../a.txt"),
            Err(RelocationError::InvalidDestination(_))
        ));
    }

    #[test]
    fn test_relocate_moves_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("in.txt");
        let dest = dir.path().join("out/in.txt");
        fs::write(&source, "content").unwrap();

        let outcome = relocate(&source, &dest).unwrap();
        assert!(outcome.source_removed);
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "content");
    }

    #[test]
    fn test_relocate_missing_source() {
        let dir = tempdir().unwrap();
        let result = relocate(&dir.path().join("gone.txt"), &dir.path().join("x.txt"));
        assert!(matches!(result, Err(RelocationError::SourceVanished(_))));
    }

    #[test]
    fn test_relocate_never_replaces_existing_destination() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("in/notes.txt");
        let dest = dir.path().join("out/notes.txt");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&source, "new").unwrap();
        fs::write(&dest, "old").unwrap();

        let result = relocate(&source, &dest);
        assert!(matches!(result, Err(RelocationError::DestinationTaken(p)) if p == dest));
        assert_eq!(fs::read_to_string(&source).unwrap(), "new");
        assert_eq!(fs::read_to_string(&dest).unwrap(), "old");
    }

    #[test]
    fn test_copy_never_replaces_existing_destination() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        let dest = dir.path().join("b.txt");
        fs::write(&source, "new").unwrap();
        fs::write(&dest, "old").unwrap();

        let result = copy_then_remove(&source, &dest);
        assert!(matches!(result, Err(RelocationError::DestinationTaken(_))));
        assert_eq!(fs::read_to_string(&source).unwrap(), "new");
        assert_eq!(fs::read_to_string(&dest).unwrap(), "old");
    }

    #[test]
    fn test_copy_fallback_moves_content() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        let dest = dir.path().join("b.txt");
        fs::write(&source, "content").unwrap();

        let outcome = copy_then_remove(&source, &dest).unwrap();
        assert!(outcome.source_removed);
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "content");
    }

    #[test]
    fn test_only_cross_volume_renames_copy() {
        assert!(needs_copy(&io::Error::from(io::ErrorKind::CrossesDevices)));
        assert!(!needs_copy(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!needs_copy(&io::Error::from(io::ErrorKind::Other)));
    }

    #[tokio::test]
    async fn test_relocate_async() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.bin");
        fs::write(&source, [1u8, 2, 3]).unwrap();

        let outcome = relocate_async(&source, &dir.path().join("b.bin")).await.unwrap();
        assert_eq!(outcome.final_path, dir.path().join("b.bin"));
        assert!(!source.exists());
    }
}
