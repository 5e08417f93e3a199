//! Port contracts for instance provisioning.

mod registry;
mod runtime;
mod workspace;

#[cfg(test)]
pub use registry::MockRegistryStore;
pub use registry::{RegistryStore, RegistryStoreError, RegistryStoreResult};
pub use runtime::{LogRequest, StackRuntime, StackRuntimeError, StackRuntimeResult};
pub use workspace::{
    ENV_FILE_NAME, ENV_TEMPLATE_FILE_NAME, InstanceWorkspace, OVERRIDE_FILE_NAME,
    WorkspaceArtifact, WorkspaceError, WorkspaceResult,
};
