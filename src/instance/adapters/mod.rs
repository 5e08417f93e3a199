//! Adapter implementations for instance provisioning ports.

pub mod memory;

mod docker;
mod entropy;
mod json_registry;
mod workspace;

pub use docker::{DEFAULT_COMPOSE_PROGRAM, DockerComposeRuntime};
pub use entropy::OsEntropy;
pub use json_registry::{JsonFileRegistry, REGISTRY_FILE_NAME};
pub use workspace::DirectoryWorkspace;
