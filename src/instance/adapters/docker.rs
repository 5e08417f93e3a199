//! `docker compose` stack runtime.

use crate::instance::domain::{ContainerStatus, InstanceRecord};
use crate::instance::ports::{LogRequest, StackRuntime, StackRuntimeError, StackRuntimeResult};
use serde::Deserialize;
use std::process::Command;
use tracing::debug;

/// Container CLI providing `compose` unless configured otherwise.
pub const DEFAULT_COMPOSE_PROGRAM: &str = "docker";

/// Stack runtime that shells out to `docker compose`.
///
/// Every command runs in the instance folder with the instance's compose
/// project name, so two instances never share containers.
#[derive(Debug, Clone)]
pub struct DockerComposeRuntime {
    program: String,
}

impl Default for DockerComposeRuntime {
    fn default() -> Self {
        Self::new(DEFAULT_COMPOSE_PROGRAM)
    }
}

impl DockerComposeRuntime {
    /// Creates a runtime invoking `program` (for example `docker` or
    /// `podman`).
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn compose_args(record: &InstanceRecord, args: &[String]) -> Vec<String> {
        let mut full = vec![
            "compose".to_owned(),
            "-p".to_owned(),
            record.project_name(),
        ];
        full.extend(args.iter().cloned());
        full
    }

    fn run(&self, record: &InstanceRecord, args: &[String]) -> StackRuntimeResult<String> {
        let folder = record.folder_path();
        if !folder.is_dir() {
            return Err(StackRuntimeError::MissingFolder(folder.to_owned()));
        }

        let full_args = Self::compose_args(record, args);
        let command_line = format!("{} {}", self.program, full_args.join(" "));
        debug!(
            instance_id = %record.instance_id(),
            command = %command_line,
            "running stack command"
        );

        let output = Command::new(&self.program)
            .args(&full_args)
            .current_dir(folder)
            .output()
            .map_err(|err| StackRuntimeError::spawn(&self.program, err))?;

        if !output.status.success() {
            return Err(StackRuntimeError::CommandFailed {
                command: command_line,
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_owned()).collect()
}

#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "State", default)]
    state: String,
}

/// Interprets `docker compose ps --format json` output.
///
/// Newer releases print one JSON object per line, older ones a single array.
fn parse_ps_output(output: &str) -> Result<ContainerStatus, serde_json::Error> {
    let mut entries: Vec<PsEntry> = Vec::new();
    for line in output.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if line.starts_with('[') {
            entries.extend(serde_json::from_str::<Vec<PsEntry>>(line)?);
        } else {
            entries.push(serde_json::from_str(line)?);
        }
    }

    if entries.is_empty() {
        Ok(ContainerStatus::Configured)
    } else if entries
        .iter()
        .any(|entry| entry.state.eq_ignore_ascii_case("running"))
    {
        Ok(ContainerStatus::Running)
    } else {
        Ok(ContainerStatus::Stopped)
    }
}

impl StackRuntime for DockerComposeRuntime {
    fn start(&self, record: &InstanceRecord) -> StackRuntimeResult<String> {
        self.run(record, &owned(&["up", "-d"]))
    }

    fn stop(&self, record: &InstanceRecord) -> StackRuntimeResult<String> {
        self.run(record, &owned(&["down", "--remove-orphans"]))
    }

    fn status(&self, record: &InstanceRecord) -> StackRuntimeResult<ContainerStatus> {
        let output = self.run(record, &owned(&["ps", "-a", "--format", "json"]))?;
        parse_ps_output(&output).map_err(|err| StackRuntimeError::CommandFailed {
            command: format!("{} compose ps", self.program),
            exit_code: Some(0),
            stderr: format!("unreadable status output: {err}"),
        })
    }

    fn logs(&self, record: &InstanceRecord, request: &LogRequest) -> StackRuntimeResult<String> {
        let mut args = owned(&["logs", "--no-color", "--tail"]);
        args.push(request.tail.to_string());
        args.extend(request.service.iter().cloned());
        self.run(record, &args)
    }
}
