//! Workspace lifecycle management
//!
//! Every execution gets its own scratch directory holding the source file
//! and any build artifacts. The directory is removed when the workspace is
//! dropped, whichever way the execution ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

use crate::sandbox::SandboxError;

/// Scratch directory for one execution
///
/// # Cleanup
///
/// The directory is deleted on drop. Call [`close()`](Self::close) to
/// remove it eagerly and observe removal errors.
#[derive(Debug)]
pub struct Workspace {
    /// Temporary directory, removed on drop
    dir: TempDir,

    /// Pool permit (if acquired from a pool)
    _permit: Option<OwnedSemaphorePermit>,
}

impl Workspace {
    /// Create a fresh workspace under `root`
    #[instrument]
    pub fn create(root: &Path) -> Result<Self, SandboxError> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix("sandrun-")
            .tempdir_in(root)?;

        debug!(path = %dir.path().display(), "workspace created");

        Ok(Self {
            dir,
            _permit: None,
        })
    }

    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get the host path to a file inside the workspace
    ///
    /// Returns an error if the path contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        if name.contains("..") || name.starts_with('/') {
            return Err(SandboxError::InvalidPath(format!(
                "path traversal not allowed: {}",
                name
            )));
        }
        Ok(self.dir.path().join(name))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), SandboxError> {
        let path = self.file_path(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    /// Read a file from the workspace
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, SandboxError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, SandboxError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    /// Remove the workspace now
    #[instrument(skip(self), fields(path = %self.dir.path().display()))]
    pub fn close(self) -> Result<(), SandboxError> {
        let Self { dir, _permit } = self;
        if let Err(e) = dir.close() {
            warn!(error = %e, "failed to remove workspace");
            return Err(e.into());
        }
        debug!("workspace removed");
        Ok(())
    }

    /// Remove the workspace on the blocking thread pool.
    ///
    /// The pool permit is released only once the directory is gone.
    pub async fn remove(self) -> Result<(), SandboxError> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(|e| SandboxError::Io(std::io::Error::other(e)))?
    }

    /// Attach a pool permit to this workspace
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }
}

/// Bounds the number of executions in flight
///
/// Each acquired [`Workspace`] holds a permit until it is dropped.
#[derive(Debug)]
pub struct WorkspacePool {
    /// Parent directory for workspaces
    root: PathBuf,

    /// Number of concurrent workspaces allowed
    capacity: usize,

    /// How long to wait for a free slot
    queue_timeout: Duration,

    /// Semaphore to limit concurrent workspaces
    semaphore: Arc<Semaphore>,
}

impl WorkspacePool {
    /// Create a new workspace pool
    pub fn new(root: impl Into<PathBuf>, capacity: usize, queue_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            capacity,
            queue_timeout,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Acquire a workspace from the pool
    ///
    /// Waits at most the queue timeout for a free slot.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Workspace, SandboxError> {
        let permit = tokio::time::timeout(
            self.queue_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| SandboxError::PoolExhausted)?
        .map_err(|_| SandboxError::PoolExhausted)?;

        debug!(available = self.available(), "acquired workspace slot");

        let root = self.root.clone();
        let workspace = tokio::task::spawn_blocking(move || Workspace::create(&root))
            .await
            .map_err(|e| SandboxError::Io(std::io::Error::other(e)))??;
        Ok(workspace.with_permit(permit))
    }

    /// Get the number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the total number of slots in the pool
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_validation() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();

        // Valid paths should work
        assert!(workspace.file_path("main.cpp").is_ok());
        assert!(workspace.file_path("Main.java").is_ok());

        // Path traversal should be rejected
        assert!(workspace.file_path("../escape").is_err());
        assert!(workspace.file_path("foo/../bar").is_err());
        assert!(workspace.file_path("/absolute/path").is_err());
    }

    #[tokio::test]
    async fn test_workspace_file_operations() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();

        workspace
            .write_file("test.txt", b"hello world")
            .await
            .unwrap();
        assert!(workspace.file_exists("test.txt").await.unwrap());
        assert!(!workspace.file_exists("missing.txt").await.unwrap());

        let content = workspace.read_file("test.txt").await.unwrap();
        assert_eq!(content, b"hello world");
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let workspace = Workspace::create(root.path()).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_close() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.exists());
        workspace.close().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_workspace_remove_with_many_files() {
        let root = tempfile::tempdir().unwrap();
        let pool = WorkspacePool::new(root.path(), 1, Duration::from_millis(50));
        let workspace = pool.acquire().await.unwrap();
        let path = workspace.path().to_path_buf();

        let nested = path.join("out");
        std::fs::create_dir(&nested).unwrap();
        for i in 0..200 {
            std::fs::write(nested.join(format!("file{i}")), b"x").unwrap();
        }

        workspace.remove().await.unwrap();
        assert!(!path.exists());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_workspaces_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(root.path()).unwrap();
        let b = Workspace::create(root.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_pool_releases_permit_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let pool = WorkspacePool::new(root.path(), 2, Duration::from_millis(50));
        assert_eq!(pool.capacity(), 2);

        let first = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 1);
        drop(first);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_pool_exhausted_after_queue_timeout() {
        let root = tempfile::tempdir().unwrap();
        let pool = WorkspacePool::new(root.path(), 1, Duration::from_millis(20));

        let _held = pool.acquire().await.unwrap();
        match pool.acquire().await {
            Err(SandboxError::PoolExhausted) => {}
            other => panic!("expected PoolExhausted, got {other:?}"),
        }
    }
}
