//! In-memory stack runtime.

use crate::instance::domain::{ContainerStatus, InstanceId, InstanceRecord};
use crate::instance::ports::{LogRequest, StackRuntime, StackRuntimeError, StackRuntimeResult};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// In-memory stack runtime.
///
/// This adapter models container state without spawning processes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStackRuntime {
    state: Arc<RwLock<InMemoryRuntimeState>>,
}

#[derive(Debug, Default)]
struct InMemoryRuntimeState {
    containers: BTreeMap<InstanceId, ContainerStatus>,
    unavailable: bool,
}

fn runtime_error(reason: impl Into<String>) -> StackRuntimeError {
    StackRuntimeError::CommandFailed {
        command: "in-memory runtime".to_owned(),
        exit_code: None,
        stderr: reason.into(),
    }
}

impl InMemoryStackRuntime {
    /// Creates a runtime with no containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the containers of `instance_id` as created but not running.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn mark_stopped(&self, instance_id: InstanceId) -> StackRuntimeResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| runtime_error(err.to_string()))?;
        state
            .containers
            .insert(instance_id, ContainerStatus::Stopped);
        Ok(())
    }

    /// Makes every subsequent call fail, as if the runner were missing.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_unavailable(&self, unavailable: bool) -> StackRuntimeResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| runtime_error(err.to_string()))?;
        state.unavailable = unavailable;
        Ok(())
    }

    fn update(
        &self,
        record: &InstanceRecord,
        next: Option<ContainerStatus>,
    ) -> StackRuntimeResult<String> {
        let mut state = self
            .state
            .write()
            .map_err(|err| runtime_error(err.to_string()))?;
        if state.unavailable {
            return Err(runtime_error("runtime unavailable"));
        }
        match next {
            Some(status) => state.containers.insert(record.instance_id(), status),
            None => state.containers.remove(&record.instance_id()),
        };
        let outcome = next.map_or("removed", ContainerStatus::as_str);
        Ok(format!("{} {outcome}", record.project_name()))
    }
}

impl StackRuntime for InMemoryStackRuntime {
    fn start(&self, record: &InstanceRecord) -> StackRuntimeResult<String> {
        self.update(record, Some(ContainerStatus::Running))
    }

    fn stop(&self, record: &InstanceRecord) -> StackRuntimeResult<String> {
        self.update(record, None)
    }

    fn status(&self, record: &InstanceRecord) -> StackRuntimeResult<ContainerStatus> {
        let state = self
            .state
            .read()
            .map_err(|err| runtime_error(err.to_string()))?;
        if state.unavailable {
            return Err(runtime_error("runtime unavailable"));
        }
        Ok(state
            .containers
            .get(&record.instance_id())
            .copied()
            .unwrap_or(ContainerStatus::Configured))
    }

    fn logs(&self, record: &InstanceRecord, request: &LogRequest) -> StackRuntimeResult<String> {
        let status = self.status(record)?;
        let scope = request.service.as_deref().unwrap_or("all services");
        Ok(format!(
            "{} ({scope}, last {} lines): {status}\n",
            record.project_name(),
            request.tail
        ))
    }
}
