//! Domain model for provisioned backend instances.
//!
//! The instance domain models identifiers, deterministic port allocation,
//! generated credentials, the registry record, and everything derived from
//! a record: the stack environment, compose documents, and connection
//! exports. Filesystem, registry persistence, and container runtime access
//! remain outside this boundary.

mod compose;
mod credentials;
mod environment;
mod error;
mod export;
mod ids;
mod ports;
mod record;
mod status;

#[cfg(test)]
pub(crate) mod test_support;

pub use compose::{ComposeDocument, STACK_CONTAINERS};
pub use credentials::{
    ApiTokens, CredentialError, EntropySource, InstanceCredentials, SigningSecret, TOKEN_ISSUER,
    TokenClaims, TokenRole, mint_tokens, validate_token,
};
pub use environment::{
    DEFAULT_PUBLIC_HOST, EnvironmentSynthesizer, StackEnvironment, dotenv_lines, keys,
};
pub use error::{InstanceDomainError, ParseStackServiceError};
pub use export::{
    ConnectionInfo, ExportError, ExportFormat, InstanceListing, ParseExportFormatError,
    format_connection, format_connections, format_listing,
};
pub use ids::InstanceId;
pub use ports::{PORT_STRIDE, PortSet, StackService, allocate};
pub use record::{
    InstanceMetadataPatch, InstanceRecord, NewInstance, database_name, default_description,
    default_name, folder_name, network_name, normalize_tags, project_name,
};
pub use status::ContainerStatus;

#[cfg(test)]
pub(crate) use environment::parse_dotenv;
