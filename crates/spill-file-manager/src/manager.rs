//! Core spill directory implementation.

use crate::{
    error::{Result, SpillFileError},
    policy::RetentionPolicy,
    security::{set_secure_permissions, validate_file_name},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{Metadata, TryLockError},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{fs, sync::RwLock};

/// Prefix of the per-process namespaces created under the spill root.
pub const NAMESPACE_PREFIX: &str = "spill-";

const LEASE_FILE_NAME: &str = ".lease";

static NAMESPACE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Information about a spill file owned by this directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpillFileInfo {
    pub name: String,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Statistics about owned spill files.
#[derive(Debug, Serialize)]
pub struct DirectoryStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub base_directory: PathBuf,
}

/// A sandboxed directory holding spill files.
///
/// Each directory writes into its own namespace below the shared root and
/// holds an exclusive lock on that namespace while any clone is alive, so
/// several processes can share one root without sweeping each other's runs.
/// Every file written through the directory is registered as owned until it
/// is removed. Cloning is cheap and clones share the registry.
#[derive(Clone, Debug)]
pub struct SpillDirectory {
    root_dir: PathBuf,
    base_dir: PathBuf,
    file_registry: Arc<RwLock<HashMap<String, SpillFileInfo>>>,
    retention_policy: RetentionPolicy,
    _lease: Arc<NamespaceLease>,
}

impl SpillDirectory {
    /// Create a new builder for configuring the directory.
    #[must_use]
    pub fn builder() -> SpillDirectoryBuilder {
        SpillDirectoryBuilder::new()
    }

    /// Namespace directory the spill files of this instance live in.
    pub fn base_directory(&self) -> &Path {
        &self.base_dir
    }

    /// Shared root holding the namespaces of every process.
    pub fn root_directory(&self) -> &Path {
        &self.root_dir
    }

    /// Writes `contents` to a new spill file, replacing nothing.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The name is invalid or already owned
    /// - The underlying write operation fails
    pub async fn write<N: AsRef<str>, C: AsRef<[u8]>>(&self, name: N, contents: C) -> Result<u64> {
        let name = name.as_ref();
        let file_path = self.path_for(name)?;

        if self.file_registry.read().await.contains_key(name) {
            return Err(SpillFileError::InvalidName {
                name: name.to_string(),
                reason: "a spill file with this name already exists".to_string(),
            });
        }

        let contents = contents.as_ref();
        fs::write(&file_path, contents).await?;

        let size_bytes = contents.len() as u64;
        let file_info = SpillFileInfo {
            name: name.to_string(),
            file_path,
            created_at: Utc::now(),
            size_bytes,
        };

        self.file_registry
            .write()
            .await
            .insert(name.to_string(), file_info);

        tracing::trace!("Wrote spill file {} ({} bytes)", name, size_bytes);
        Ok(size_bytes)
    }

    /// Creates a new, empty spill file for sequential writing.
    ///
    /// The file is owned from the moment it exists, so a caller that fails
    /// halfway can still remove it. Call [`record_size`](Self::record_size)
    /// once writing is complete.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or already owned, or if the
    /// file cannot be created.
    pub async fn create<N: AsRef<str>>(&self, name: N) -> Result<fs::File> {
        let name = name.as_ref();
        let file_path = self.path_for(name)?;

        let mut registry = self.file_registry.write().await;
        if registry.contains_key(name) {
            return Err(SpillFileError::InvalidName {
                name: name.to_string(),
                reason: "a spill file with this name already exists".to_string(),
            });
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await?;
        registry.insert(
            name.to_string(),
            SpillFileInfo {
                name: name.to_string(),
                file_path,
                created_at: Utc::now(),
                size_bytes: 0,
            },
        );
        Ok(file)
    }

    /// Updates the recorded size of an owned spill file.
    pub async fn record_size<N: AsRef<str>>(&self, name: N, size_bytes: u64) -> Result<()> {
        let name = name.as_ref();
        match self.file_registry.write().await.get_mut(name) {
            Some(info) => {
                info.size_bytes = size_bytes;
                tracing::trace!("Spill file {} complete ({} bytes)", name, size_bytes);
                Ok(())
            }
            None => Err(SpillFileError::FileNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Opens an owned spill file for sequential reading.
    ///
    /// # Errors
    /// Returns [`SpillFileError::FileNotFound`] if the file is not owned by this
    /// directory, or an I/O error if it cannot be opened.
    pub async fn open<N: AsRef<str>>(&self, name: N) -> Result<fs::File> {
        let name = name.as_ref();
        let file_path = self.owned_path(name).await?;

        let file = fs::File::open(&file_path).await?;
        Ok(file)
    }

    /// Removes an owned spill file from disk and from the registry.
    ///
    /// # Errors
    /// Returns [`SpillFileError::FileNotFound`] if the file is not owned, or an
    /// I/O error if removal fails. A file that vanished from disk is treated as
    /// removed.
    pub async fn remove_file<N: AsRef<str>>(&self, name: N) -> Result<()> {
        let name = name.as_ref();
        let file_path = self.owned_path(name).await?;

        match fs::remove_file(&file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Spill file {} already gone from disk", name);
            }
            Err(e) => return Err(e.into()),
        }

        self.file_registry.write().await.remove(name);
        Ok(())
    }

    /// Whether a spill file is currently owned by this directory.
    pub async fn exists<N: AsRef<str>>(&self, name: N) -> bool {
        self.file_registry.read().await.contains_key(name.as_ref())
    }

    /// Registry entry for an owned spill file.
    pub async fn file_info<N: AsRef<str>>(&self, name: N) -> Option<SpillFileInfo> {
        self.file_registry.read().await.get(name.as_ref()).cloned()
    }

    pub async fn stats(&self) -> DirectoryStats {
        let registry = self.file_registry.read().await;
        DirectoryStats {
            total_files: registry.len(),
            total_size_bytes: registry.values().map(|info| info.size_bytes).sum(),
            base_directory: self.base_dir.clone(),
        }
    }

    /// Removes what earlier processes left behind under the shared root.
    /// Returns the number of files removed.
    ///
    /// Namespaces still locked by a live directory are never touched, no
    /// matter how old their files are. An abandoned namespace is removed once
    /// its newest entry is older than the retention policy allows, as is any
    /// loose file directly under the root.
    ///
    /// # Errors
    /// Returns an error if the root cannot be listed. Failures removing
    /// individual entries are logged and skipped.
    pub async fn sweep_stale(&self) -> Result<usize> {
        if !self.retention_policy.enabled {
            return Ok(0);
        }

        let now = Utc::now();
        let mut entries = fs::read_dir(&self.root_dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path == self.base_dir {
                continue;
            }

            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                if !self.retention_policy.is_stale(modified_at(&metadata), now) {
                    continue;
                }
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("Failed to sweep stale spill file {:?}: {}", path, e),
                }
            } else if metadata.is_dir() && is_namespace(&path) {
                match self.sweep_namespace(&path, modified_at(&metadata), now).await {
                    Ok(files) => removed += files,
                    Err(e) => tracing::warn!("Failed to inspect spill namespace {:?}: {}", path, e),
                }
            }
        }

        if removed > 0 {
            tracing::info!("Swept {} stale spill files from {:?}", removed, self.root_dir);
        }
        Ok(removed)
    }

    async fn sweep_namespace(&self, path: &Path, modified: DateTime<Utc>, now: DateTime<Utc>) -> Result<usize> {
        let namespace = path.to_path_buf();
        let leased = tokio::task::spawn_blocking(move || namespace_is_leased(&namespace))
            .await
            .map_err(std::io::Error::other)??;
        if leased {
            tracing::debug!("Spill namespace {:?} is held by a live process, skipping", path);
            return Ok(0);
        }

        let mut newest = modified;
        let mut files = 0;
        let mut entries = fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            newest = newest.max(modified_at(&metadata));
            if metadata.is_file() && entry.file_name() != LEASE_FILE_NAME {
                files += 1;
            }
        }
        if !self.retention_policy.is_stale(newest, now) {
            return Ok(0);
        }

        match fs::remove_dir_all(path).await {
            Ok(()) => {
                tracing::debug!("Removed abandoned spill namespace {:?} ({} files)", path, files);
                Ok(files)
            }
            Err(e) => {
                tracing::warn!("Failed to sweep spill namespace {:?}: {}", path, e);
                Ok(0)
            }
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        Ok(self.base_dir.join(name))
    }

    async fn owned_path(&self, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        self.file_registry
            .read()
            .await
            .get(name)
            .map(|info| info.file_path.clone())
            .ok_or_else(|| SpillFileError::FileNotFound {
                name: name.to_string(),
            })
    }
}

fn modified_at(metadata: &Metadata) -> DateTime<Utc> {
    DateTime::from(metadata.modified().unwrap_or(std::time::UNIX_EPOCH))
}

fn is_namespace(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(NAMESPACE_PREFIX))
}

/// Whether another open handle holds the lock of the namespace at `path`.
fn namespace_is_leased(path: &Path) -> std::io::Result<bool> {
    let file = match std::fs::OpenOptions::new()
        .write(true)
        .open(path.join(LEASE_FILE_NAME))
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    match file.try_lock() {
        Ok(()) => Ok(false),
        Err(TryLockError::WouldBlock) => Ok(true),
        Err(TryLockError::Error(e)) => Err(e),
    }
}

/// Exclusive lock on a namespace directory.
///
/// Dropping the lease unlocks the namespace and removes it if no spill files
/// remain inside.
#[derive(Debug)]
struct NamespaceLease {
    namespace_dir: PathBuf,
    lock_file: std::fs::File,
}

impl NamespaceLease {
    fn acquire(namespace_dir: PathBuf) -> std::io::Result<Self> {
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(namespace_dir.join(LEASE_FILE_NAME))?;
        lock_file.lock()?;
        Ok(Self {
            namespace_dir,
            lock_file,
        })
    }
}

impl Drop for NamespaceLease {
    fn drop(&mut self) {
        if let Err(e) = self.lock_file.unlock() {
            tracing::warn!("Failed to unlock spill namespace {:?}: {}", self.namespace_dir, e);
        }
        let _ = std::fs::remove_file(self.namespace_dir.join(LEASE_FILE_NAME));
        if let Err(e) = std::fs::remove_dir(&self.namespace_dir) {
            tracing::debug!("Spill namespace {:?} kept: {}", self.namespace_dir, e);
        }
    }
}

/// Builder for creating a configured `SpillDirectory`.
pub struct SpillDirectoryBuilder {
    base_directory: Option<PathBuf>,
    retention_policy: RetentionPolicy,
}

impl SpillDirectoryBuilder {
    fn new() -> Self {
        Self {
            base_directory: None,
            retention_policy: RetentionPolicy::default(),
        }
    }

    /// Set the shared root under which this directory creates its namespace.
    #[must_use]
    pub fn base_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    /// Set the retention policy used by [`SpillDirectory::sweep_stale`].
    #[must_use]
    pub fn retention_policy(mut self, policy: RetentionPolicy) -> Self {
        self.retention_policy = policy;
        self
    }

    /// Build the `SpillDirectory`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Base directory is not set
    /// - Base directory cannot be created or secured
    pub async fn build(self) -> Result<SpillDirectory> {
        let root_dir = self
            .base_directory
            .ok_or_else(|| SpillFileError::Configuration {
                message: "Base directory is required".to_string(),
            })?;

        fs::create_dir_all(&root_dir)
            .await
            .map_err(|e| SpillFileError::DirectoryCreation {
                path: root_dir.clone(),
                source: e,
            })?;
        set_secure_permissions(&root_dir).await?;

        let namespace = format!(
            "{}{}-{}-{}",
            NAMESPACE_PREFIX,
            std::process::id(),
            Utc::now().format("%Y%m%d%H%M%S"),
            NAMESPACE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let base_dir = root_dir.join(namespace);
        fs::create_dir(&base_dir)
            .await
            .map_err(|e| SpillFileError::DirectoryCreation {
                path: base_dir.clone(),
                source: e,
            })?;
        set_secure_permissions(&base_dir).await?;

        let lease_dir = base_dir.clone();
        let lease = tokio::task::spawn_blocking(move || NamespaceLease::acquire(lease_dir))
            .await
            .map_err(std::io::Error::other)??;

        let directory = SpillDirectory {
            root_dir,
            base_dir,
            file_registry: Arc::new(RwLock::new(HashMap::new())),
            retention_policy: self.retention_policy,
            _lease: Arc::new(lease),
        };

        tracing::debug!(
            "SpillDirectory initialized - namespace: {:?}, retention: {:?}, sweep_enabled: {}",
            directory.base_dir,
            directory.retention_policy.retention_duration,
            directory.retention_policy.enabled
        );

        Ok(directory)
    }
}
