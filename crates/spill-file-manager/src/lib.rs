//! # Spill File Manager
//!
//! A sandboxed directory for short-lived spill files.
//!
//! Spill files are written once, read sequentially and removed by their
//! owner. Each [`SpillDirectory`] writes into a private, locked namespace
//! below a shared root, tracks which files it owns and refuses names that
//! could escape the sandbox. Namespaces abandoned by earlier processes are
//! swept according to a [`RetentionPolicy`]; locked ones are left alone.
//!
//! ## Basic Usage
//!
//! ```rust
//! use spill_file_manager::{RetentionPolicy, SpillDirectory};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = SpillDirectory::builder()
//!     .base_directory("/var/tmp/conduit")
//!     .retention_policy(RetentionPolicy::new().remove_after(Duration::from_secs(3600)))
//!     .build()
//!     .await?;
//!
//! directory.sweep_stale().await?;
//! directory.write("run_0000.jsonl", "{\"id\":1}\n").await?;
//! let file = directory.open("run_0000.jsonl").await?;
//! # drop(file);
//! directory.remove_file("run_0000.jsonl").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;
pub mod policy;
pub mod security;

pub use error::{Result, SpillFileError};
pub use manager::{DirectoryStats, NAMESPACE_PREFIX, SpillDirectory, SpillDirectoryBuilder, SpillFileInfo};
pub use policy::RetentionPolicy;
