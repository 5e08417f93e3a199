//! Observed container state of an instance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container state reported by the stack runtime.
///
/// This is observed, never stored: the registry does not own it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// At least one container of the instance is running.
    Running,
    /// Containers exist but none is running.
    Stopped,
    /// The instance is provisioned but has no containers.
    Configured,
    /// The runtime could not be queried.
    Unknown,
}

impl ContainerStatus {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Configured => "configured",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
