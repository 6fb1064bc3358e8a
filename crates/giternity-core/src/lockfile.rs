use anyhow::Context;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive advisory lock held for the duration of a non-dry run.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// `Ok(None)` when another process holds the lock.
    pub fn acquire(path: &Path) -> anyhow::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create lockfile directory")?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("open lockfile {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                file.set_len(0).context("truncate lockfile")?;
                file.seek(SeekFrom::Start(0)).context("rewind lockfile")?;
                writeln!(file, "{}", std::process::id()).context("write lockfile pid")?;
                debug!(path = %path.display(), "acquired run lock");
                Ok(Some(Self {
                    path: path.to_path_buf(),
                    file,
                }))
            }
            Err(err) if is_lock_held(&err) => Ok(None),
            Err(err) => Err(err).context("lock file exclusively"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_lock_held(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    // ERROR_LOCK_VIOLATION on Windows.
    matches!(err.raw_os_error(), Some(33))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("git").join(".giternity.lock");
        let first = RunLock::acquire(&lock_path).unwrap();
        assert!(first.is_some());
        assert!(RunLock::acquire(&lock_path).unwrap().is_none());
        drop(first);
        assert!(RunLock::acquire(&lock_path).unwrap().is_some());
    }

    #[test]
    fn records_holder_pid() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("run.lock");
        let lock = RunLock::acquire(&lock_path).unwrap().unwrap();
        assert_eq!(lock.path(), lock_path);
        let contents = fs::read_to_string(&lock_path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }
}
