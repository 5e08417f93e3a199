//! Service layer for instance provisioning and registry orchestration.
//!
//! Every operation loads the registry first, works on the in-memory copy,
//! and saves the full registry back. Creation writes the instance folder
//! before the registry so a registered instance always has its files; a
//! failure after the folder was created removes it again.

use crate::instance::{
    domain::{
        ComposeDocument, ConnectionInfo, ContainerStatus, CredentialError, DEFAULT_PUBLIC_HOST,
        EntropySource, EnvironmentSynthesizer, ExportError, InstanceCredentials,
        InstanceDomainError, InstanceId, InstanceListing, InstanceMetadataPatch, InstanceRecord,
        NewInstance, allocate, default_description, default_name, folder_name, normalize_tags,
    },
    ports::{
        ENV_FILE_NAME, ENV_TEMPLATE_FILE_NAME, InstanceWorkspace, LogRequest, OVERRIDE_FILE_NAME,
        RegistryStore, RegistryStoreError, StackRuntime, StackRuntimeError, WorkspaceArtifact,
        WorkspaceError,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Settings shared by every provisioning operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Directory holding the registry and the instance folders.
    pub base_dir: Utf8PathBuf,
    /// Host used in generated URLs.
    pub public_host: String,
    /// Directory holding the upstream Supabase docker setup copied into
    /// every new instance folder.
    pub stack_template: Option<Utf8PathBuf>,
}

impl ProvisioningConfig {
    /// Creates a configuration rooted at `base_dir` addressing `localhost`.
    #[must_use]
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            public_host: DEFAULT_PUBLIC_HOST.to_owned(),
            stack_template: None,
        }
    }

    /// Sets the host used in generated URLs.
    #[must_use]
    pub fn with_public_host(mut self, public_host: impl Into<String>) -> Self {
        self.public_host = public_host.into();
        self
    }

    /// Sets the stack template directory copied into new instance folders.
    #[must_use]
    pub fn with_stack_template(mut self, stack_template: impl Into<Utf8PathBuf>) -> Self {
        self.stack_template = Some(stack_template.into());
        self
    }
}

/// Request payload for creating an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateInstanceRequest {
    /// Requested identifier; the smallest free one when absent.
    pub instance_id: Option<i64>,
    /// Human label.
    pub name: Option<String>,
    /// Free text.
    pub description: Option<String>,
    /// Tags, normalized before storage.
    pub tags: Vec<String>,
}

impl CreateInstanceRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a specific identifier.
    #[must_use]
    pub const fn with_instance_id(mut self, instance_id: i64) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Request payload for changing instance metadata.
///
/// `None` fields are left unchanged; `Some(vec![])` clears the tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateInstanceRequest {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement tags.
    pub tags: Option<Vec<String>>,
}

/// Outcome of removing an instance folder during deletion.
#[derive(Debug, Clone)]
pub enum FileCleanup {
    /// Removal was not requested.
    Skipped,
    /// The folder was removed.
    Removed,
    /// Removal failed; the registry entry is gone regardless.
    Failed(WorkspaceError),
}

/// Result of deleting an instance.
#[derive(Debug, Clone)]
pub struct DeletedInstance {
    /// The record that was removed from the registry.
    pub record: InstanceRecord,
    /// What happened to the instance folder.
    pub cleanup: FileCleanup,
}

/// Service-level errors for provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Domain validation or allocation failed.
    #[error(transparent)]
    Domain(#[from] InstanceDomainError),

    /// An instance with the identifier is already registered.
    #[error("instance {0} already exists")]
    DuplicateInstance(InstanceId),

    /// No instance with the identifier is registered.
    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),

    /// Credentials could not be generated or failed their self-check.
    #[error("credential generation failed: {0}")]
    CredentialGenerationFailed(#[source] CredentialError),

    /// Registry persistence failed.
    #[error(transparent)]
    Registry(#[from] RegistryStoreError),

    /// Instance folder operation failed.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// The stack runtime failed.
    #[error(transparent)]
    Runtime(#[from] StackRuntimeError),

    /// Rendering an export or compose document failed.
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Result type for provisioning service operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

/// Produces the credentials of a new instance from an entropy source.
pub type CredentialIssuer<E> =
    fn(&E, DateTime<Utc>) -> Result<InstanceCredentials, CredentialError>;

fn issue_credentials<E: EntropySource>(
    entropy: &E,
    issued_at: DateTime<Utc>,
) -> Result<InstanceCredentials, CredentialError> {
    InstanceCredentials::generate(entropy, issued_at)
}

/// Instance provisioning orchestration service.
#[derive(Clone)]
pub struct InstanceProvisioningService<S, W, R, E, C>
where
    S: RegistryStore,
    W: InstanceWorkspace,
    R: StackRuntime,
    E: EntropySource,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    workspace: Arc<W>,
    runtime: Arc<R>,
    entropy: Arc<E>,
    clock: Arc<C>,
    config: ProvisioningConfig,
    synthesizer: EnvironmentSynthesizer,
    issuer: CredentialIssuer<E>,
}

impl<S, W, R, E, C> InstanceProvisioningService<S, W, R, E, C>
where
    S: RegistryStore,
    W: InstanceWorkspace,
    R: StackRuntime,
    E: EntropySource,
    C: Clock + Send + Sync,
{
    /// Creates a new provisioning service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        workspace: Arc<W>,
        runtime: Arc<R>,
        entropy: Arc<E>,
        clock: Arc<C>,
        config: ProvisioningConfig,
    ) -> Self {
        let synthesizer = EnvironmentSynthesizer::new(config.public_host.clone());
        Self {
            store,
            workspace,
            runtime,
            entropy,
            clock,
            config,
            synthesizer,
            issuer: issue_credentials::<E>,
        }
    }

    /// Replaces the function that issues credentials for new instances.
    #[cfg(test)]
    #[must_use]
    pub(crate) const fn with_credential_issuer(mut self, issuer: CredentialIssuer<E>) -> Self {
        self.issuer = issuer;
        self
    }

    /// Returns the service configuration.
    #[must_use]
    pub const fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Returns the environment synthesizer used for rendering.
    #[must_use]
    pub const fn synthesizer(&self) -> &EnvironmentSynthesizer {
        &self.synthesizer
    }

    fn find_or_error(
        records: &[InstanceRecord],
        instance_id: InstanceId,
    ) -> ProvisioningResult<usize> {
        records
            .iter()
            .position(|record| record.instance_id() == instance_id)
            .ok_or(ProvisioningError::InstanceNotFound(instance_id))
    }

    /// Provisions a new instance.
    ///
    /// Ports are allocated, credentials generated and self-checked, the
    /// instance folder populated from the stack template when one is
    /// configured, the instance files written, and the registry saved last.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::DuplicateInstance`] when the identifier
    /// is taken, domain errors for invalid identifiers, tags, or port
    /// conflicts, [`ProvisioningError::CredentialGenerationFailed`] when
    /// credentials cannot be produced, and workspace or registry errors.
    /// Nothing is left behind on failure.
    pub fn create(&self, request: CreateInstanceRequest) -> ProvisioningResult<InstanceRecord> {
        let mut records = self.store.load()?;
        let instance_id = match request.instance_id {
            Some(raw) => InstanceId::new(raw)?,
            None => InstanceId::next_free(records.iter().map(InstanceRecord::instance_id)),
        };
        if records
            .iter()
            .any(|record| record.instance_id() == instance_id)
        {
            return Err(ProvisioningError::DuplicateInstance(instance_id));
        }

        let tags = normalize_tags(request.tags)?;
        let ports = allocate(instance_id, &records)?;
        let credentials = self.generate_credentials()?;
        let name = request.name.as_deref().and_then(non_blank);
        let folder_path = self
            .config
            .base_dir
            .join(folder_name(instance_id, name.as_deref()));

        let record = InstanceRecord::new(
            NewInstance {
                instance_id,
                name,
                description: request.description.as_deref().and_then(non_blank),
                tags,
                folder_path,
                ports,
                credentials,
            },
            &*self.clock,
        );

        self.workspace.create_instance_dir(record.folder_path())?;
        if let Err(err) = self.populate_folder(&record) {
            self.discard_folder(record.folder_path());
            return Err(err);
        }

        records.push(record.clone());
        if let Err(err) = self.store.save(&records) {
            self.discard_folder(record.folder_path());
            return Err(err.into());
        }

        info!(
            instance_id = %instance_id,
            path = %record.folder_path(),
            "created instance"
        );
        Ok(record)
    }

    fn generate_credentials(&self) -> ProvisioningResult<InstanceCredentials> {
        let credentials = (self.issuer)(&*self.entropy, self.clock.utc())
            .map_err(ProvisioningError::CredentialGenerationFailed)?;
        credentials
            .verify()
            .map_err(ProvisioningError::CredentialGenerationFailed)?;
        Ok(credentials)
    }

    fn populate_folder(&self, record: &InstanceRecord) -> ProvisioningResult<()> {
        if let Some(template) = &self.config.stack_template {
            self.workspace
                .copy_template(template, record.folder_path())?;
            debug!(
                instance_id = %record.instance_id(),
                template = %template,
                "copied stack template"
            );
        }
        self.write_artifacts(record)
    }

    fn discard_folder(&self, folder: &Utf8Path) {
        if let Err(err) = self.workspace.remove_instance_dir(folder) {
            warn!(
                path = %folder,
                error = %err,
                "failed to remove partially created instance folder"
            );
        }
    }

    /// Renders the files written into an instance folder.
    ///
    /// With an `env_template`, the rendered values replace its assignments
    /// and every other line of it is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Export`] when the compose override
    /// cannot be serialized.
    pub fn render_artifacts(
        &self,
        record: &InstanceRecord,
        env_template: Option<&str>,
    ) -> ProvisioningResult<Vec<WorkspaceArtifact>> {
        let environment = self.synthesizer.render(record);
        let dotenv = env_template.map_or_else(
            || environment.to_dotenv(),
            |template| environment.overlay(template),
        );
        let compose_override = ComposeDocument::instance_override(record).to_yaml()?;
        Ok(vec![
            WorkspaceArtifact::new(ENV_FILE_NAME, dotenv),
            WorkspaceArtifact::new(OVERRIDE_FILE_NAME, compose_override),
        ])
    }

    fn write_artifacts(&self, record: &InstanceRecord) -> ProvisioningResult<()> {
        let env_template = self
            .workspace
            .read_file(record.folder_path(), ENV_TEMPLATE_FILE_NAME)?;
        let artifacts = self.render_artifacts(record, env_template.as_deref())?;
        self.workspace
            .write_artifacts(record.folder_path(), &artifacts)?;
        Ok(())
    }

    /// Changes the name, description, or tags of an instance.
    ///
    /// A blank name or description restores its default.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered, domain errors for invalid tags, and registry errors.
    pub fn update(
        &self,
        instance_id: InstanceId,
        request: UpdateInstanceRequest,
    ) -> ProvisioningResult<InstanceRecord> {
        let mut records = self.store.load()?;
        let index = Self::find_or_error(&records, instance_id)?;
        let patch = InstanceMetadataPatch {
            name: request
                .name
                .as_deref()
                .map(|name| non_blank(name).unwrap_or_else(|| default_name(instance_id))),
            description: request.description.as_deref().map(|description| {
                non_blank(description).unwrap_or_else(|| default_description(instance_id))
            }),
            tags: request.tags.map(normalize_tags).transpose()?,
        };

        let updated = records
            .get_mut(index)
            .map(|record| {
                record.apply_metadata(patch, &*self.clock);
                record.clone()
            })
            .ok_or(ProvisioningError::InstanceNotFound(instance_id))?;
        self.store.save(&records)?;

        info!(instance_id = %instance_id, "updated instance metadata");
        Ok(updated)
    }

    /// Removes an instance from the registry and optionally its folder.
    ///
    /// The registry is saved before the folder is touched; a failed folder
    /// removal is reported in the outcome and never restores the entry.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered and registry errors when saving fails.
    pub fn delete(
        &self,
        instance_id: InstanceId,
        remove_files: bool,
    ) -> ProvisioningResult<DeletedInstance> {
        let mut records = self.store.load()?;
        let index = Self::find_or_error(&records, instance_id)?;
        let record = records.remove(index);
        self.store.save(&records)?;
        info!(instance_id = %instance_id, "deleted instance from registry");

        let cleanup = if remove_files {
            match self.workspace.remove_instance_dir(record.folder_path()) {
                Ok(()) => FileCleanup::Removed,
                Err(err) => {
                    warn!(
                        instance_id = %instance_id,
                        path = %record.folder_path(),
                        error = %err,
                        "failed to remove instance folder"
                    );
                    FileCleanup::Failed(err)
                }
            }
        } else {
            FileCleanup::Skipped
        };

        Ok(DeletedInstance { record, cleanup })
    }

    /// Returns the record of one instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered and registry errors when loading fails.
    pub fn get(&self, instance_id: InstanceId) -> ProvisioningResult<InstanceRecord> {
        let mut records = self.store.load()?;
        let index = Self::find_or_error(&records, instance_id)?;
        Ok(records.swap_remove(index))
    }

    /// Returns every registered instance, sorted by identifier.
    ///
    /// # Errors
    ///
    /// Returns registry errors when loading fails.
    pub fn list(&self) -> ProvisioningResult<Vec<InstanceRecord>> {
        let mut records = self.store.load()?;
        records.sort_by_key(InstanceRecord::instance_id);
        Ok(records)
    }

    /// Reports the observed container state of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered and runtime errors when the runner fails.
    pub fn status(&self, instance_id: InstanceId) -> ProvisioningResult<ContainerStatus> {
        let record = self.get(instance_id)?;
        Ok(self.runtime.status(&record)?)
    }

    /// Lists every instance with its connection details and observed state.
    ///
    /// Instances whose state cannot be queried are reported as
    /// [`ContainerStatus::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns registry errors when loading fails.
    pub fn listing(&self) -> ProvisioningResult<Vec<InstanceListing>> {
        Ok(self
            .list()?
            .iter()
            .map(|record| {
                let status = self.runtime.status(record).unwrap_or_else(|err| {
                    debug!(
                        instance_id = %record.instance_id(),
                        error = %err,
                        "container status unavailable"
                    );
                    ContainerStatus::Unknown
                });
                InstanceListing {
                    info: ConnectionInfo::new(record, &self.synthesizer),
                    status,
                }
            })
            .collect())
    }

    /// Starts the containers of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered and runtime errors when the runner fails.
    pub fn start(&self, instance_id: InstanceId) -> ProvisioningResult<String> {
        let record = self.get(instance_id)?;
        let output = self.runtime.start(&record)?;
        info!(instance_id = %instance_id, "started instance");
        Ok(output)
    }

    /// Stops the containers of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered and runtime errors when the runner fails.
    pub fn stop(&self, instance_id: InstanceId) -> ProvisioningResult<String> {
        let record = self.get(instance_id)?;
        let output = self.runtime.stop(&record)?;
        info!(instance_id = %instance_id, "stopped instance");
        Ok(output)
    }

    /// Returns recent container logs of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered and runtime errors when the runner fails.
    pub fn logs(
        &self,
        instance_id: InstanceId,
        request: &LogRequest,
    ) -> ProvisioningResult<String> {
        let record = self.get(instance_id)?;
        Ok(self.runtime.logs(&record, request)?)
    }

    /// Returns the connection details of one instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered and registry errors when loading fails.
    pub fn connection_info(&self, instance_id: InstanceId) -> ProvisioningResult<ConnectionInfo> {
        let record = self.get(instance_id)?;
        Ok(ConnectionInfo::new(&record, &self.synthesizer))
    }

    /// Returns the connection details of every instance.
    ///
    /// # Errors
    ///
    /// Returns registry errors when loading fails.
    pub fn connection_infos(&self) -> ProvisioningResult<Vec<ConnectionInfo>> {
        Ok(self
            .list()?
            .iter()
            .map(|record| ConnectionInfo::new(record, &self.synthesizer))
            .collect())
    }

    /// Renders a compose file for an external service that joins the
    /// network of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered, domain errors for invalid service names, and export
    /// errors when serialization fails.
    pub fn external_service_template(
        &self,
        instance_id: InstanceId,
        service_name: &str,
    ) -> ProvisioningResult<String> {
        let record = self.get(instance_id)?;
        let document = ComposeDocument::external_service(&record, service_name, &self.synthesizer)?;
        Ok(document.to_yaml()?)
    }

    /// Rewrites the files of an instance folder from its stored record.
    ///
    /// No secrets are regenerated. A missing folder is recreated.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::InstanceNotFound`] when the instance is
    /// not registered and workspace errors when writing fails.
    pub fn refresh_artifacts(&self, instance_id: InstanceId) -> ProvisioningResult<InstanceRecord> {
        let record = self.get(instance_id)?;
        if !self.workspace.exists(record.folder_path()) {
            self.workspace.create_instance_dir(record.folder_path())?;
        }
        self.write_artifacts(&record)?;
        info!(
            instance_id = %instance_id,
            path = %record.folder_path(),
            "refreshed instance files"
        );
        Ok(record)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
