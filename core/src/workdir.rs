//! Ephemeral working directories for a server under test

use crate::{HarnessError, Result};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};

/// A freshly created directory under the system temp root
///
/// Removing it consumes the value, so a directory is removed at most once.
/// A `WorkDir` dropped without [`WorkDir::remove`] is still cleaned up
/// best-effort.
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Path of the directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Recursively remove the directory
    pub async fn remove(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        debug!("Removing work dir {}", path.display());

        let result = tokio::task::spawn_blocking(move || self.dir.close())
            .await
            .map_err(|e| HarnessError::Process(format!("Work dir removal task failed: {}", e)))?;

        result.map_err(|e| {
            warn!("Failed to remove work dir {}: {}", path.display(), e);
            HarnessError::Io(e)
        })
    }
}

/// Create a uniquely named directory in the system temp root
///
/// Uniqueness comes from the OS's atomic create; `prefix` is a fixed name
/// prefix that makes leftovers easy to spot.
pub async fn provision_workdir(prefix: &str) -> Result<WorkDir> {
    let prefix = prefix.to_string();
    let dir = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new().prefix(&prefix).tempdir()
    })
    .await
    .map_err(|e| HarnessError::Process(format!("Work dir creation task failed: {}", e)))??;

    debug!("Provisioned work dir {}", dir.path().display());
    Ok(WorkDir { dir })
}
