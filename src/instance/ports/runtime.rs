//! Runtime port for the container stack of an instance.

use crate::instance::domain::{ContainerStatus, InstanceRecord};
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for stack runtime operations.
pub type StackRuntimeResult<T> = Result<T, StackRuntimeError>;

/// Default number of log lines returned by [`StackRuntime::logs`].
const DEFAULT_TAIL: u32 = 100;

/// Options for a log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    /// Restrict output to one compose service.
    pub service: Option<String>,
    /// Number of trailing lines per container.
    pub tail: u32,
}

impl Default for LogRequest {
    fn default() -> Self {
        Self {
            service: None,
            tail: DEFAULT_TAIL,
        }
    }
}

/// Process-runner contract for the containers of an instance.
///
/// Container state is observed through this port and never stored.
pub trait StackRuntime: Send + Sync {
    /// Starts the stack in the background and returns the runner output.
    ///
    /// # Errors
    ///
    /// Returns [`StackRuntimeError`] when the runner fails.
    fn start(&self, record: &InstanceRecord) -> StackRuntimeResult<String>;

    /// Stops the stack and removes its containers.
    ///
    /// # Errors
    ///
    /// Returns [`StackRuntimeError`] when the runner fails.
    fn stop(&self, record: &InstanceRecord) -> StackRuntimeResult<String>;

    /// Reports the observed container state.
    ///
    /// # Errors
    ///
    /// Returns [`StackRuntimeError`] when the runner cannot be queried.
    fn status(&self, record: &InstanceRecord) -> StackRuntimeResult<ContainerStatus>;

    /// Returns recent log output.
    ///
    /// # Errors
    ///
    /// Returns [`StackRuntimeError`] when the runner fails.
    fn logs(&self, record: &InstanceRecord, request: &LogRequest) -> StackRuntimeResult<String>;
}

/// Errors returned by stack runtime adapters.
#[derive(Debug, Clone, Error)]
pub enum StackRuntimeError {
    /// The runner process could not be spawned.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The runner exited unsuccessfully.
    #[error("`{command}` {}: {stderr}", describe_exit(.exit_code))]
    CommandFailed {
        /// Rendered command line.
        command: String,
        /// Exit code, absent when killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The instance folder does not exist.
    #[error("instance folder {0} does not exist")]
    MissingFolder(Utf8PathBuf),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(
        || "was terminated by a signal".to_owned(),
        |code| format!("exited with status {code}"),
    )
}

impl StackRuntimeError {
    /// Wraps a spawn failure of `program`.
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source: Arc::new(source),
        }
    }
}
