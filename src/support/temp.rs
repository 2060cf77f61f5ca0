/*!
 * Private Temp Folder
 *
 * One randomly named folder under the system temp directory per process,
 * created on first use and removed by `cleanup_temp_folder`.
 */

use super::random::rand_str;
use crate::core::errors::{IpcError, IpcResult};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, warn};

static TEMP_FOLDER: Lazy<Mutex<Option<TempDir>>> = Lazy::new(|| Mutex::new(None));

const CREATE_ATTEMPTS: usize = 32;

/// Path of the process-wide temp folder, creating it if needed
pub fn temp_folder() -> IpcResult<PathBuf> {
    let mut folder = TEMP_FOLDER.lock();
    if let Some(dir) = folder.as_ref() {
        return Ok(dir.path().to_path_buf());
    }

    let base = std::env::temp_dir();
    let mut last_error = None;
    for _ in 0..CREATE_ATTEMPTS {
        match tempfile::Builder::new()
            .prefix(&format!("{}.", rand_str(false)))
            .rand_bytes(4)
            .tempdir_in(&base)
        {
            Ok(dir) => {
                let path = dir.path().to_path_buf();
                debug!(path = %path.display(), "temp folder created");
                *folder = Some(dir);
                return Ok(path);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(IpcError::os(
        "create temp folder",
        &base.display().to_string(),
        last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string()),
    ))
}

/// Remove the temp folder and its contents; the next `temp_folder` call
/// creates a new one
pub fn cleanup_temp_folder() {
    if let Some(dir) = TEMP_FOLDER.lock().take() {
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(path = %path.display(), error = %e, "not all temporary files could be removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_temp_folder_is_stable_until_cleanup() {
        let first = temp_folder().unwrap();
        assert!(first.is_dir());
        assert_eq!(temp_folder().unwrap(), first);

        std::fs::write(first.join("scratch.txt"), b"x").unwrap();
        cleanup_temp_folder();
        assert!(!first.exists());

        let second = temp_folder().unwrap();
        assert_ne!(second, first);
        cleanup_temp_folder();
    }
}
