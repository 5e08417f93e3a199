//! Error types for instance domain validation and allocation.

use super::{InstanceId, StackService};
use thiserror::Error;

/// Errors returned while constructing or allocating instance domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InstanceDomainError {
    /// The instance identifier is outside the accepted range.
    #[error("invalid instance id {value}: {reason}")]
    InvalidInstanceId {
        /// Raw identifier as supplied by the caller.
        value: i64,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// A candidate port is already owned by another registered instance.
    #[error("port {port} for {service} is already allocated to instance {conflicting_instance}")]
    PortConflict {
        /// The contested port number.
        port: u16,
        /// Service the candidate port was computed for.
        service: StackService,
        /// Registered instance that already owns the port.
        conflicting_instance: InstanceId,
    },

    /// A tag is empty after trimming.
    #[error("instance tags must not be empty")]
    EmptyTag,

    /// An external service name contains characters compose rejects.
    #[error("service name '{0}' must be non-empty and contain only [a-z0-9_-]")]
    InvalidServiceName(String),
}

/// Error returned while parsing a service name from persistence or input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown stack service: {0}")]
pub struct ParseStackServiceError(pub String);
