//! Name validation and directory permissions for the spill sandbox.

use crate::error::{Result, SpillFileError};
use std::path::Path;

/// Sets owner-only permissions on a directory (Unix only).
pub async fn set_secure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|_e| SpillFileError::Permission {
                operation: "set secure permissions".to_string(),
                path: path.to_path_buf(),
            })?;
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(SpillFileError::Permission {
                operation: "verify directory".to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    Ok(())
}

/// Validates a spill file name.
///
/// Spill files live directly in the sandbox root, so a valid name is a single
/// path component without separators, parent references or null bytes.
pub fn validate_file_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(SpillFileError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return reject("name cannot be empty");
    }
    if name.contains('\0') {
        return reject("name contains null bytes");
    }
    if name.contains('/') || name.contains('\\') {
        return reject("name contains a path separator");
    }
    if name == "." || name == ".." {
        return reject("name refers to a directory");
    }
    if name.starts_with('.') {
        return reject("hidden names are reserved");
    }

    Ok(())
}
