//! Atomic-write primitive: temp-file-plus-rename for all mutable state.
//!
//! Tolerates crash-partial writes (the rename is the only visible mutation)
//! but not concurrent writers — callers must serialize access, per the
//! single-proposal-per-invocation model (spec.md §5).

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::GateError;

/// Write `contents` to `path` via a sibling temp file and an atomic rename.
/// Creates the parent directory if it doesn't exist. Best-effort removes
/// the temp file if the rename fails.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), GateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling_tmp_path(path);
    std::fs::write(&tmp_path, contents)?;

    match std::fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(GateError::from(e))
        }
    }
}

/// Read-then-atomic-write: load the current bytes at `path` (empty if
/// missing), hand them to `mutate`, then atomically persist the result.
pub fn atomic_update<F>(path: &Path, mutate: F) -> Result<(), GateError>
where
    F: FnOnce(Vec<u8>) -> Result<Vec<u8>, GateError>,
{
    let current = if path.exists() {
        std::fs::read(path)?
    } else {
        Vec::new()
    };
    let next = mutate(current)?;
    atomic_write(path, &next)
}

fn sibling_tmp_path(path: &Path) -> std::path::PathBuf {
    let epoch_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let rand_suffix: u32 = rand::random();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    let tmp_name = format!(".tmp-{file_name}-{epoch_nanos}-{rand_suffix:08x}");
    path.with_file_name(tmp_name)
}
