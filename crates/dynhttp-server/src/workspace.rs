//! Per-instance workspace directories.

use std::io;
use std::path::{Path, PathBuf};

use dynhttp_config::{LifecycleError, LifecycleResult};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Allocates `pid_<hash>` directories under a fixed root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stable directory name for a configuration PID: the first 8 bytes of
    /// its SHA-256, hex encoded.
    pub fn instance_key(pid: &str) -> String {
        let digest = Sha256::digest(pid.as_bytes());
        format!("pid_{}", hex::encode(&digest[..8]))
    }

    /// Where the workspace for `pid` lives, whether or not it exists.
    pub fn path_for(&self, pid: &str) -> PathBuf {
        self.root.join(Self::instance_key(pid))
    }

    /// Create the workspace for `pid`. An existing empty directory is
    /// reused; a non-empty one is refused.
    pub fn allocate(&self, pid: &str) -> LifecycleResult<PathBuf> {
        let path = self.path_for(pid);

        std::fs::create_dir_all(&self.root)
            .map_err(|e| LifecycleError::resource_io(&self.root, "cannot create workspace root", e))?;

        match std::fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !path.is_dir() {
                    return Err(LifecycleError::resource(&path, "exists and is not a directory"));
                }
                let mut entries = std::fs::read_dir(&path)
                    .map_err(|e| LifecycleError::resource_io(&path, "cannot be inspected", e))?;
                if entries.next().is_some() {
                    return Err(LifecycleError::resource(&path, "already exists and is not empty"));
                }
                debug!("Reusing empty workspace {}", path.display());
            }
            Err(e) => return Err(LifecycleError::resource_io(&path, "cannot be created", e)),
        }

        Ok(path)
    }

    /// Delete a workspace tree. A tree that is already gone is not an error.
    pub fn release(&self, path: &Path) -> LifecycleResult<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LifecycleError::resource_io(path, "cannot be deleted", e)),
        }
    }
}
