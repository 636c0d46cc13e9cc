//! Job-scoped scratch directories.
//!
//! Frame extraction writes into a per-job directory that must be released
//! on both success and failure paths; leaking it leaks disk across worker
//! processes sharing a host. The guard removes the directory on Drop, so
//! every exit path of an orchestration run cleans up.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use tracevault_core::error::Result;

/// RAII guard for a per-job scratch directory.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a unique scratch directory under `base` for one job.
    pub fn create(base: &Path, job_id: Uuid) -> Result<Self> {
        let path = base.join(job_id.to_string());
        std::fs::create_dir_all(&path)?;
        debug!(path = %path.display(), "Created job scratch directory");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            // Nothing sane to do from Drop; the watchful operator sees it.
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
        } else {
            debug!(path = %self.path.display(), "Removed job scratch directory");
        }
    }
}
