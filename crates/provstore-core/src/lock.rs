//! # Scoped File Locks
//!
//! Exclusive OS-level locks (`flock` on Unix, `LockFileEx` on Windows) whose
//! release is tied to a guard's lifetime. Dropping the guard unlocks on every
//! exit path, including early returns through `?`.

use crate::ProvstoreError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum number of times a marker lock is re-acquired after losing a race
/// with a concurrent release.
const MAX_MARKER_RETRIES: usize = 64;

/// An exclusive lock held on an open file.
///
/// When built with [`FileLockGuard::marker`], the guard also owns a companion
/// `.lock` file that is removed before the lock is released.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    marker: Option<PathBuf>,
}

impl FileLockGuard {
    /// Open (creating if needed) `path` for read/write and lock it exclusively.
    pub fn open(path: &Path) -> Result<Self, ProvstoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file, marker: None })
    }

    /// Lock `<target>.lock`, a marker file that exists only while held.
    ///
    /// Waiters can wake up holding a lock on a marker that was already
    /// unlinked by the previous owner; the inode check catches that and the
    /// acquisition is retried against the fresh file.
    pub fn marker(target: &Path) -> Result<Self, ProvstoreError> {
        let marker = lock_path_for(target);
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)?;
        }

        for attempt in 0..MAX_MARKER_RETRIES {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&marker)?;
            file.lock_exclusive()?;

            if same_file(&file, &marker) {
                return Ok(Self {
                    file,
                    marker: Some(marker),
                });
            }
            debug!(path = %marker.display(), attempt, "Lock marker replaced while waiting, retrying");
            let _ = FileExt::unlock(&file);
        }

        Err(ProvstoreError::IoError(format!(
            "could not acquire lock marker {}",
            marker.display()
        )))
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Some(marker) = self.marker.take() {
            let _ = fs::remove_file(&marker);
        }
        let _ = FileExt::unlock(&self.file);
    }
}

/// Path of the `.lock` marker guarding `target`.
#[must_use]
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

#[cfg(unix)]
fn same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(on_disk)) => held.ino() == on_disk.ino() && held.dev() == on_disk.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn marker_is_removed_on_drop() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("br").join("1000.json");
        let marker = lock_path_for(&target);
        {
            let _guard = FileLockGuard::marker(&target).expect("lock");
            assert!(marker.exists());
        }
        assert!(!marker.exists());
    }

    #[test]
    fn lock_path_appends_suffix() {
        let path = lock_path_for(Path::new("/tmp/out/2000.nq"));
        assert_eq!(path, PathBuf::from("/tmp/out/2000.nq.lock"));
    }

    #[test]
    fn open_creates_parents() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a").join("b").join("counter.txt");
        let guard = FileLockGuard::open(&path).expect("open");
        assert!(path.exists());
        drop(guard);
    }
}
