//! Workspace port for per-instance configuration folders.

use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// File name of the rendered stack environment.
pub const ENV_FILE_NAME: &str = ".env";

/// File name of the rendered compose override.
pub const OVERRIDE_FILE_NAME: &str = "docker-compose.override.yml";

/// File name of the upstream environment template inside a stack template.
pub const ENV_TEMPLATE_FILE_NAME: &str = ".env.example";

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// A file written into an instance folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceArtifact {
    /// File name relative to the instance folder.
    pub file_name: &'static str,
    /// Complete file contents.
    pub contents: String,
}

impl WorkspaceArtifact {
    /// Creates an artifact.
    #[must_use]
    pub fn new(file_name: &'static str, contents: impl Into<String>) -> Self {
        Self {
            file_name,
            contents: contents.into(),
        }
    }
}

/// Filesystem contract for instance folders.
///
/// Every path handed to a workspace is an absolute instance folder path as
/// stored in the registry.
pub trait InstanceWorkspace: Send + Sync {
    /// Creates a new, empty instance folder.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::AlreadyExists`] when the folder exists and
    /// [`WorkspaceError::OutsideRoot`] when it lies outside the workspace.
    fn create_instance_dir(&self, folder: &Utf8Path) -> WorkspaceResult<()>;

    /// Writes `artifacts` into an existing instance folder, replacing files
    /// of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when a file cannot be written.
    fn write_artifacts(
        &self,
        folder: &Utf8Path,
        artifacts: &[WorkspaceArtifact],
    ) -> WorkspaceResult<()>;

    /// Copies the contents of the stack template directory `template` into
    /// an existing instance folder.
    ///
    /// Subdirectories are copied recursively. A top-level `.env` in the
    /// template is skipped, since every instance renders its own.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when the template cannot be read or a
    /// file cannot be copied.
    fn copy_template(&self, template: &Utf8Path, folder: &Utf8Path) -> WorkspaceResult<()>;

    /// Reads `file_name` from an instance folder, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when the file exists but cannot be
    /// read.
    fn read_file(&self, folder: &Utf8Path, file_name: &str) -> WorkspaceResult<Option<String>>;

    /// Removes an instance folder and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::OutsideRoot`] or
    /// [`WorkspaceError::NotAnInstanceFolder`] when the path is not a
    /// removable instance folder, and [`WorkspaceError::Io`] on failure.
    fn remove_instance_dir(&self, folder: &Utf8Path) -> WorkspaceResult<()>;

    /// Returns whether the instance folder exists.
    fn exists(&self, folder: &Utf8Path) -> bool;
}

/// Errors returned by workspace implementations.
#[derive(Debug, Clone, Error)]
pub enum WorkspaceError {
    /// A filesystem operation failed.
    #[error("filesystem operation failed at {path}: {source}")]
    Io {
        /// Location of the failed operation.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The instance folder already exists.
    #[error("instance folder {0} already exists")]
    AlreadyExists(Utf8PathBuf),

    /// The path is not below the workspace root.
    #[error("{path} is outside the workspace root {root}")]
    OutsideRoot {
        /// Offending path.
        path: Utf8PathBuf,
        /// Workspace root.
        root: Utf8PathBuf,
    },

    /// The final path component does not name an instance folder.
    #[error("refusing to remove {0}: not an instance folder")]
    NotAnInstanceFolder(Utf8PathBuf),
}

impl WorkspaceError {
    /// Wraps an I/O failure at `path`.
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
