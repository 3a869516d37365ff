//! Ephemeral per-invocation workspaces
//!
//! Creates, fills and removes the directory each invocation runs in.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::runtime::RuntimeAdapter;
use crate::types::InvocationRequest;

/// File the serialized event is written to
pub const EVENT_FILE: &str = "event.json";

/// Prefix of every workspace directory name
const DIR_PREFIX: &str = "fn-";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace root {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create workspace {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("failed to serialize event: {0}")]
    Event(#[from] serde_json::Error),
}

/// A directory owned by exactly one invocation.
///
/// # Cleanup
///
/// Call [`reap()`](Self::reap) when the invocation is done. If a workspace is
/// dropped without being reaped (for example because the invocation future
/// was aborted) the directory is removed synchronously in `Drop`.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    reaped: bool,
}

impl Workspace {
    /// Create a fresh workspace under `root`.
    ///
    /// The directory is created with `create_dir`, so an existing directory
    /// is an error rather than being reused.
    #[instrument]
    pub async fn create(root: &Path) -> Result<Self, WorkspaceError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| WorkspaceError::CreateRoot {
                path: root.to_path_buf(),
                source,
            })?;

        let id = Uuid::new_v4();
        let path = root.join(format!("{DIR_PREFIX}{}", id.simple()));

        tokio::fs::create_dir(&path)
            .await
            .map_err(|source| WorkspaceError::CreateDir {
                path: path.clone(),
                source,
            })?;

        debug!(?path, "workspace created");

        Ok(Self {
            id,
            path,
            reaped: false,
        })
    }

    /// Get the workspace ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the name is absolute or tries to leave the workspace.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') || name.contains('\\')
        {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.path.join(name))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| WorkspaceError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    /// Write the user source, the runner script and the event
    pub async fn write_artifacts(
        &self,
        request: &InvocationRequest,
        adapter: &dyn RuntimeAdapter,
    ) -> Result<(), WorkspaceError> {
        let event = serde_json::to_vec(request.event())?;
        let runner = adapter.render_runner(request.handler_name());

        self.write_file(&adapter.source_file_name(), request.code().as_bytes())
            .await?;
        self.write_file(adapter.runner_file_name(), runner.as_bytes())
            .await?;
        self.write_file(EVENT_FILE, &event).await?;
        Ok(())
    }

    /// Remove the workspace directory.
    ///
    /// A directory that is already gone counts as removed. Other failures are
    /// logged and swallowed; the directory is not retried.
    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn reap(mut self) {
        self.reaped = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "workspace removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove workspace"),
        }
    }

    /// Check if the workspace has been reaped
    pub fn is_reaped(&self) -> bool {
        self.reaped
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }

        warn!(
            id = %self.id,
            path = %self.path.display(),
            "workspace dropped without reap, removing synchronously"
        );
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "drop cleanup failed"),
        }
    }
}
