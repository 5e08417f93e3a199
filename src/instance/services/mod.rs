//! Application services for instance provisioning.

mod lifecycle;

pub use lifecycle::{
    CreateInstanceRequest, CredentialIssuer, DeletedInstance, FileCleanup,
    InstanceProvisioningService, ProvisioningConfig, ProvisioningError, ProvisioningResult,
    UpdateInstanceRequest,
};
