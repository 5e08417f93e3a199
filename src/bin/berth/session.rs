//! Maps parsed commands onto provisioning service calls.

use crate::cli::Command;
use berth::instance::{
    domain::{
        EntropySource, ExportFormat, InstanceId, format_connection, format_connections,
        format_listing,
    },
    ports::{InstanceWorkspace, LogRequest, RegistryStore, StackRuntime},
    services::{
        CreateInstanceRequest, FileCleanup, InstanceProvisioningService, UpdateInstanceRequest,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use eyre::{WrapErr, bail, eyre};
use mockable::Clock;
use std::io::{BufRead, Write};
use tracing::warn;

/// Word the user must type to confirm a deletion.
pub(crate) const DELETE_CONFIRMATION: &str = "DELETE";

/// One invocation of the command-line interface.
pub(crate) struct Session<'a, S, W, R, E, C>
where
    S: RegistryStore,
    W: InstanceWorkspace,
    R: StackRuntime,
    E: EntropySource,
    C: Clock + Send + Sync,
{
    service: &'a InstanceProvisioningService<S, W, R, E, C>,
    input: &'a mut dyn BufRead,
    output: &'a mut dyn Write,
}

impl<'a, S, W, R, E, C> Session<'a, S, W, R, E, C>
where
    S: RegistryStore,
    W: InstanceWorkspace,
    R: StackRuntime,
    E: EntropySource,
    C: Clock + Send + Sync,
{
    pub(crate) fn new(
        service: &'a InstanceProvisioningService<S, W, R, E, C>,
        input: &'a mut dyn BufRead,
        output: &'a mut dyn Write,
    ) -> Self {
        Self {
            service,
            input,
            output,
        }
    }

    pub(crate) fn run(mut self, command: Command) -> eyre::Result<()> {
        match command {
            Command::Create {
                ids,
                name,
                description,
                tags,
            } => self.create(&ids, name, description, tags),
            Command::List { format } => self.list(format),
            Command::Get { id } => self.get(id),
            Command::Info {
                instance,
                format,
                output,
            } => self.info(instance, format, output.as_deref()),
            Command::Update {
                id,
                name,
                description,
                tags,
                clear_tags,
            } => self.update(id, name, description, tags, clear_tags),
            Command::Delete {
                id,
                remove_files,
                yes,
                keep_running,
            } => self.delete(id, remove_files, yes, keep_running),
            Command::Status { instance } => self.status(instance),
            Command::Start { id } => {
                let output = self.service.start(id)?;
                self.emit(&output)?;
                writeln!(self.output, "Started instance {id}")?;
                Ok(())
            }
            Command::Stop { id } => {
                let output = self.service.stop(id)?;
                self.emit(&output)?;
                writeln!(self.output, "Stopped instance {id}")?;
                Ok(())
            }
            Command::Logs { id, service, tail } => {
                let logs = self.service.logs(id, &LogRequest { service, tail })?;
                self.emit(&logs)
            }
            Command::Template {
                id,
                service,
                output,
            } => {
                let yaml = self.service.external_service_template(id, &service)?;
                self.deliver(&yaml, output.as_deref())
            }
            Command::Render { id } => {
                let record = self.service.refresh_artifacts(id)?;
                writeln!(
                    self.output,
                    "Rewrote configuration of instance {id} in {}",
                    record.folder_path()
                )?;
                Ok(())
            }
        }
    }

    fn emit(&mut self, text: &str) -> eyre::Result<()> {
        self.output.write_all(text.as_bytes())?;
        if !text.is_empty() && !text.ends_with('\n') {
            writeln!(self.output)?;
        }
        Ok(())
    }

    fn deliver(&mut self, text: &str, destination: Option<&Utf8Path>) -> eyre::Result<()> {
        match destination {
            Some(path) => {
                write_file(path, text)?;
                writeln!(self.output, "Wrote {path}")?;
                Ok(())
            }
            None => self.emit(text),
        }
    }

    fn create(
        &mut self,
        ids: &[InstanceId],
        name: Option<String>,
        description: Option<String>,
        tags: Vec<String>,
    ) -> eyre::Result<()> {
        if ids.len() > 1 && name.is_some() {
            bail!("--name can only be used when creating a single instance");
        }

        let requested: Vec<Option<InstanceId>> = if ids.is_empty() {
            vec![None]
        } else {
            ids.iter().copied().map(Some).collect()
        };

        for requested_id in requested {
            let mut request = CreateInstanceRequest::new().with_tags(tags.iter().cloned());
            if let Some(instance_id) = requested_id {
                request = request.with_instance_id(i64::from(instance_id.get()));
            }
            if let Some(label) = name.as_deref() {
                request = request.with_name(label);
            }
            if let Some(text) = description.as_deref() {
                request = request.with_description(text);
            }

            let record = self.service.create(request)?;
            let info = self.service.connection_info(record.instance_id())?;
            writeln!(
                self.output,
                "Created instance {} ({}) in {}",
                record.instance_id(),
                record.name(),
                record.folder_path()
            )?;
            writeln!(self.output, "  API URL:      {}", info.api_url)?;
            writeln!(self.output, "  Database URL: {}", info.database_url)?;
        }
        Ok(())
    }

    fn list(&mut self, format: ExportFormat) -> eyre::Result<()> {
        let listing = self.service.listing()?;
        if listing.is_empty() && format == ExportFormat::Table {
            writeln!(self.output, "No instances registered")?;
            return Ok(());
        }
        let rendered = format_listing(&listing, format)?;
        self.emit(&rendered)
    }

    fn get(&mut self, id: InstanceId) -> eyre::Result<()> {
        let record = self.service.get(id)?;
        let json = serde_json::to_string_pretty(&record).wrap_err("failed to render record")?;
        self.emit(&json)
    }

    fn info(
        &mut self,
        instance: Option<InstanceId>,
        format: ExportFormat,
        destination: Option<&Utf8Path>,
    ) -> eyre::Result<()> {
        let rendered = match instance {
            Some(id) => format_connection(&self.service.connection_info(id)?, format)?,
            None => format_connections(&self.service.connection_infos()?, format)?,
        };
        self.deliver(&rendered, destination)
    }

    fn update(
        &mut self,
        id: InstanceId,
        name: Option<String>,
        description: Option<String>,
        tag_args: Vec<String>,
        clear_tags: bool,
    ) -> eyre::Result<()> {
        let tags = if clear_tags {
            Some(Vec::new())
        } else if tag_args.is_empty() {
            None
        } else {
            Some(tag_args)
        };
        let request = UpdateInstanceRequest {
            name,
            description,
            tags,
        };
        if request == UpdateInstanceRequest::default() {
            bail!("nothing to update: pass --name, --description, --tag, or --clear-tags");
        }

        let record = self.service.update(id, request)?;
        writeln!(self.output, "Updated instance {id} ({})", record.name())?;
        Ok(())
    }

    fn confirm_delete(&mut self, id: InstanceId) -> eyre::Result<bool> {
        write!(
            self.output,
            "Type {DELETE_CONFIRMATION} to remove instance {id}: "
        )?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input
            .read_line(&mut answer)
            .wrap_err("failed to read confirmation")?;
        Ok(answer.trim() == DELETE_CONFIRMATION)
    }

    fn delete(
        &mut self,
        id: InstanceId,
        remove_files: bool,
        yes: bool,
        keep_running: bool,
    ) -> eyre::Result<()> {
        // Unknown ids fail before prompting.
        self.service.get(id)?;
        if !yes && !self.confirm_delete(id)? {
            writeln!(self.output, "Aborted")?;
            return Ok(());
        }

        if !keep_running && let Err(err) = self.service.stop(id) {
            warn!(instance_id = %id, error = %err, "could not stop containers before deletion");
        }

        let deleted = self.service.delete(id, remove_files)?;
        let folder = deleted.record.folder_path();
        writeln!(self.output, "Deleted instance {id}")?;
        match deleted.cleanup {
            FileCleanup::Skipped => writeln!(self.output, "Kept {folder}")?,
            FileCleanup::Removed => writeln!(self.output, "Removed {folder}")?,
            FileCleanup::Failed(err) => {
                return Err(eyre::Report::new(err).wrap_err(format!(
                    "instance {id} was removed from the registry but {folder} could not be deleted"
                )));
            }
        }
        Ok(())
    }

    fn status(&mut self, instance: Option<InstanceId>) -> eyre::Result<()> {
        if let Some(id) = instance {
            let status = self.service.status(id)?;
            writeln!(self.output, "Instance {id}: {status}")?;
            return Ok(());
        }
        self.list(ExportFormat::Table)
    }
}

fn write_file(path: &Utf8Path, contents: &str) -> eyre::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("{path} does not name a file"))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_owned(),
        _ => Utf8PathBuf::from("."),
    };
    let dir = Dir::open_ambient_dir(&parent, ambient_authority())
        .wrap_err_with(|| format!("failed to open {parent}"))?;
    dir.write(file_name, contents)
        .wrap_err_with(|| format!("failed to write {path}"))
}
