//! Runtime directory management.
//!
//! Each declared `runtime_directory` entry is created under the
//! configured root (default `/run`) before the process starts and
//! removed after it stops. Creation is idempotent.

use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{DomainError, ProcessDefinition, Result};

pub fn create_runtime_directories(root: &Path, definition: &ProcessDefinition) -> Result<()> {
    for dir in &definition.runtime_directory {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).map_err(|e| {
            DomainError::RuntimeDirectoryError(format!(
                "failed to create {}: {e}",
                path.display()
            ))
        })?;
        set_permissions(&path)?;
        #[cfg(target_os = "linux")]
        if definition.user.is_some() || definition.group.is_some() {
            chown_for(&path, definition)?;
        }
        debug!(process = %definition.name(), dir = %path.display(), "runtime directory ready");
    }
    Ok(())
}

/// Best effort removal after stop. A directory that will not delete is
/// logged, not fatal.
pub fn cleanup_runtime_directories(root: &Path, definition: &ProcessDefinition) {
    for dir in &definition.runtime_directory {
        let path = root.join(dir);
        if let Err(e) = std::fs::remove_dir_all(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    process = %definition.name(),
                    dir = %path.display(),
                    error = %e,
                    "failed to remove runtime directory"
                );
            }
        }
    }
}

fn set_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        DomainError::RuntimeDirectoryError(format!(
            "failed to set permissions on {}: {e}",
            path.display()
        ))
    })
}

#[cfg(target_os = "linux")]
fn chown_for(path: &Path, definition: &ProcessDefinition) -> Result<()> {
    let uid = match &definition.user {
        Some(user) => Some(crate::spawn::lookup_uid(user)?),
        None => None,
    };
    let gid = match &definition.group {
        Some(group) => Some(crate::spawn::lookup_gid(group)?),
        None => None,
    };
    let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| {
        DomainError::RuntimeDirectoryError(format!("path {} contains a NUL byte", path.display()))
    })?;
    let rc = unsafe {
        libc::chown(
            c_path.as_ptr(),
            uid.unwrap_or(u32::MAX),
            gid.unwrap_or(u32::MAX),
        )
    };
    if rc != 0 {
        return Err(DomainError::RuntimeDirectoryError(format!(
            "failed to chown {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}
