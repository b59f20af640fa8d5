//! Per-file advisory locks for database files.
//!
//! Every database file `<dir>/<name>` has a sidecar lock file at
//! `<dir>/.locks/<name>.lock`. The sidecar outlives the database file, so a
//! writer can delete or replace the database while holding the lock and a
//! reader blocked on the same sidecar never sees a half-written file.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::trace;

pub const LOCK_DIR_NAME: &str = ".locks";

#[must_use]
pub fn lock_path_for(db_file: &Path) -> PathBuf {
    let parent = db_file.parent().unwrap_or_else(|| Path::new("."));
    let mut name = db_file
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    parent.join(LOCK_DIR_NAME).join(name)
}

/// Exclusive lock on one database file, released on drop.
#[derive(Debug)]
pub struct DbFileLock {
    file: File,
    path: PathBuf,
}

impl DbFileLock {
    /// Block until the lock for `db_file` is held.
    ///
    /// # Errors
    /// Returns an error if the sidecar cannot be created or locked.
    pub fn acquire(db_file: &Path) -> io::Result<Self> {
        let (file, path) = open_lock_file(db_file)?;
        FileExt::lock_exclusive(&file)?;
        trace!("Acquired lock {}", path.display());
        Ok(Self { file, path })
    }

    /// Take the lock only if nobody else holds it.
    ///
    /// # Errors
    /// Returns an error if the sidecar cannot be opened or locking fails for
    /// a reason other than contention.
    pub fn try_acquire(db_file: &Path) -> io::Result<Option<Self>> {
        let (file, path) = open_lock_file(db_file)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) if error.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DbFileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        trace!("Released lock {}", self.path.display());
    }
}

fn open_lock_file(db_file: &Path) -> io::Result<(File, PathBuf)> {
    let path = lock_path_for(db_file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)?;
    Ok((file, path))
}

/// Read a database file while holding its lock. A missing file yields
/// `Ok(None)`.
///
/// # Errors
/// Returns an error if the lock cannot be taken or the file cannot be read.
pub fn read_locked(db_file: &Path) -> io::Result<Option<Vec<u8>>> {
    let _lock = DbFileLock::acquire(db_file)?;
    match std::fs::read(db_file) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Delete a database file while holding its lock. Returns whether a file was
/// removed.
///
/// # Errors
/// Returns an error if the lock cannot be taken or removal fails.
pub fn remove_locked(db_file: &Path) -> io::Result<bool> {
    let _lock = DbFileLock::acquire(db_file)?;
    match std::fs::remove_file(db_file) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Atomically move `source` over `db_file` while holding the lock of
/// `db_file`. Both paths must live on the same filesystem.
///
/// # Errors
/// Returns an error if the lock cannot be taken or the rename fails.
pub fn replace_locked(source: &Path, db_file: &Path) -> io::Result<()> {
    let _lock = DbFileLock::acquire(db_file)?;
    std::fs::rename(source, db_file)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::Path;
    use std::time::Duration;

    use super::{DbFileLock, lock_path_for, read_locked, remove_locked, replace_locked};

    #[test]
    fn lock_path_lives_in_hidden_sidecar_dir() {
        assert_eq!(
            lock_path_for(Path::new("/var/db/apps.db")),
            Path::new("/var/db/.locks/apps.db.lock")
        );
    }

    #[test]
    fn try_acquire_reports_contention() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let db = temp.path().join("apps.db");

        let held = DbFileLock::acquire(&db).expect("first lock");
        assert!(
            DbFileLock::try_acquire(&db)
                .expect("try_acquire should not error")
                .is_none()
        );

        drop(held);
        assert!(
            DbFileLock::try_acquire(&db)
                .expect("try_acquire should not error")
                .is_some()
        );
    }

    #[test]
    fn repeated_lock_cycles_do_not_deadlock() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let db = temp.path().join("apps.db");

        for round in 0..5 {
            std::fs::write(&db, format!("round {round}")).expect("write db");
            assert!(remove_locked(&db).expect("remove under lock"));
        }
        assert!(!remove_locked(&db).expect("missing file is not an error"));
    }

    #[test]
    fn reader_never_observes_a_partial_write() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let db = temp.path().join("apps.db");
        std::fs::write(&db, b"old-content").expect("seed db");

        let guard = DbFileLock::acquire(&db).expect("writer lock");
        let reader_path = db.clone();
        let reader = std::thread::spawn(move || read_locked(&reader_path));

        let mut file = std::fs::File::create(&db).expect("truncate db");
        file.write_all(b"new-").expect("first half");
        std::thread::sleep(Duration::from_millis(50));
        file.write_all(b"content").expect("second half");
        file.sync_all().expect("sync");
        drop(file);
        drop(guard);

        let seen = reader
            .join()
            .expect("reader thread should not panic")
            .expect("read should succeed");
        assert_eq!(seen.as_deref(), Some(&b"new-content"[..]));
    }

    #[test]
    fn replace_locked_swaps_file_contents() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let db = temp.path().join("apps.db");
        let incoming = temp.path().join("incoming.db.tmp");
        std::fs::write(&db, b"old").expect("seed db");
        std::fs::write(&incoming, b"new").expect("seed incoming");

        replace_locked(&incoming, &db).expect("replace under lock");

        assert_eq!(std::fs::read(&db).expect("read db"), b"new");
        assert!(!incoming.exists());
    }
}
