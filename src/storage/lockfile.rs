//! Process lock file
//!
//! Only one controller may drive a heat pump and own the data directory.
//! The lock holds the owner's PID; a lock whose PID is no longer a running
//! heatwise process is treated as stale and replaced.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".heatwise.lock";

    /// Acquire the lock inside `data_dir`, creating the directory if needed.
    ///
    /// Fails if another live instance holds it.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::holder_pid(&lock_path) {
                Ok(Some(pid)) => {
                    bail!(
                        "Another heatwise instance is already running (PID: {})\n\
                         If it is not, remove the stale lock file: rm {:?}",
                        pid,
                        lock_path
                    );
                }
                Ok(None) => {
                    tracing::info!(path = ?lock_path, "Removing stale lock file");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable lock file, replacing it");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        fs::write(&lock_path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write lock file: {:?}", lock_path))?;
        tracing::debug!(pid, path = ?lock_path, "Acquired process lock");

        Ok(Self { lock_path, owned: true })
    }

    /// PID of a live holder, `None` when the lock is stale.
    fn holder_pid(lock_path: &Path) -> Result<Option<u32>> {
        let contents = fs::read_to_string(lock_path).context("Failed to read lock file")?;
        let pid: u32 = contents
            .trim()
            .parse()
            .context("Failed to parse PID from lock file")?;
        Ok(Self::is_process_running(pid).then_some(pid))
    }

    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("heatwise"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        true
    }

    /// Release the lock (also done on drop).
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!(error = %e, "Failed to remove lock file");
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_writes_pid() {
        let temp_dir = tempdir().unwrap();
        let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
        let pid: u32 = fs::read_to_string(lock.path()).unwrap().trim().parse().unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = tempdir().unwrap();
        let lock_path = {
            let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
            lock.path().to_path_buf()
        };
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_stale_lock_replaced() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join(ProcessLock::LOCK_FILE_NAME), "999999999\n").unwrap();
        let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
        assert!(lock.path().exists());
    }
}
