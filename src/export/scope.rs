use crate::error::{ArtifactContext, Result};
use crate::subform::accumulator::sanitize_name;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A per-request directory for temporary export artifacts
///
/// The directory is created on acquire and removed, with everything in it,
/// when the scope is dropped, whether the export succeeded or not. Paths
/// handed out by an export stay valid only while the scope is alive.
#[derive(Debug)]
pub struct ExportScope {
    id: String,
    dir: PathBuf,
}

impl ExportScope {
    /// Acquire the scope `id` under `root`; fails if it is already in use
    pub fn acquire(root: &Path, id: &str) -> Result<Self> {
        std::fs::create_dir_all(root).artifact(root)?;

        let id = sanitize_name(id);
        let dir = root.join(&id);
        std::fs::create_dir(&dir).artifact(&dir)?;
        debug!(scope = %id, dir = %dir.display(), "acquired export scope");

        Ok(ExportScope { id, dir })
    }

    /// Acquire a scope with a fresh random id
    pub fn fresh(root: &Path) -> Result<Self> {
        ExportScope::acquire(root, &uuid::Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an artifact inside the scope
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for ExportScope {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(scope = %self.id, "released export scope"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(scope = %self.id, error = %e, "failed to clean up export scope"),
        }
    }
}
