//! Exclusive dataset locks held for the lifetime of a reader.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::{PipelineError, PipelineResult};

/// An exclusive lock on a dataset, held as a `<dataset>.lock` file.
///
/// The lock file is removed when the guard is dropped, whether the holder
/// finished, failed or was cancelled.
#[derive(Debug)]
pub struct DatasetLock {
    lock_path: PathBuf,
}

impl DatasetLock {
    /// Acquires the lock for `dataset`.
    ///
    /// # Errors
    /// Returns [`PipelineError::Lock`] if another holder owns the lock or the
    /// lock file cannot be created.
    pub async fn acquire(dataset: &Path, holder: &str) -> PipelineResult<Self> {
        let lock_path = lock_path_for(dataset);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await
            .map_err(|e| PipelineError::Lock {
                path: lock_path.clone(),
                message: if e.kind() == std::io::ErrorKind::AlreadyExists {
                    "dataset is locked by another holder".to_string()
                } else {
                    e.to_string()
                },
            })?;

        // From here on the guard owns the file and removes it on any exit
        let lock = Self { lock_path };
        let owner = format!("{} {}\n", std::process::id(), holder);
        file.write_all(owner.as_bytes()).await?;
        file.flush().await?;

        debug!("Acquired dataset lock {:?} for {}", lock.lock_path, holder);
        Ok(lock)
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => debug!("Released dataset lock {:?}", self.lock_path),
            Err(e) => warn!("Failed to release dataset lock {:?}: {}", self.lock_path, e),
        }
    }
}

fn lock_path_for(dataset: &Path) -> PathBuf {
    let mut name = OsString::from(dataset.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}
