use std::{io, path::Path};

use tempfile::TempDir;

const PREFIX: &str = "pullcheck-";

/// A job-scoped temporary directory.
///
/// Call [`Workspace::destroy`] when the job is done. If the job future is
/// dropped instead (lease expiry, panic), the directory is still removed
/// when the workspace goes out of scope.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a uniquely named directory under `root`, or under the system
    /// temp directory when `root` is `None`.
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix(PREFIX).tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix(PREFIX).tempdir()?,
        };
        tracing::debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path { self.dir.path() }

    /// Remove the workspace recursively, off the async runtime.
    pub async fn destroy(self) {
        let path = self.dir.path().to_path_buf();
        match tokio::task::spawn_blocking(move || self.dir.close()).await {
            Ok(Ok(())) => tracing::debug!("Removed workspace {}", path.display()),
            Ok(Err(e)) => tracing::error!("Failed to remove workspace {}: {}", path.display(), e),
            Err(e) => tracing::error!("Workspace cleanup task for {} failed: {}", path.display(), e),
        }
    }
}
