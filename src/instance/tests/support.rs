//! Shared harness for service tests.

use crate::instance::{
    adapters::memory::{InMemoryRegistryStore, InMemoryStackRuntime, InMemoryWorkspace},
    domain::{
        EntropySource, InstanceId,
        test_support::{SeededEntropy, SteppingClock},
    },
    ports::{InstanceWorkspace, RegistryStore},
    services::{InstanceProvisioningService, ProvisioningConfig},
};
use std::sync::Arc;

pub(super) const BASE_DIR: &str = "/srv/berth";

pub(super) type TestService<S = InMemoryRegistryStore, E = SeededEntropy> =
    InstanceProvisioningService<S, InMemoryWorkspace, InMemoryStackRuntime, E, SteppingClock>;

pub(super) struct Harness<S = InMemoryRegistryStore, E = SeededEntropy>
where
    S: RegistryStore,
    E: EntropySource,
{
    pub(super) service: TestService<S, E>,
    pub(super) store: Arc<S>,
    pub(super) workspace: Arc<InMemoryWorkspace>,
    pub(super) runtime: Arc<InMemoryStackRuntime>,
}

pub(super) fn harness_with<S, E>(registry: S, entropy: E) -> Harness<S, E>
where
    S: RegistryStore,
    E: EntropySource,
{
    harness_configured(registry, entropy, ProvisioningConfig::new(BASE_DIR))
}

pub(super) fn harness_configured<S, E>(
    registry: S,
    entropy: E,
    config: ProvisioningConfig,
) -> Harness<S, E>
where
    S: RegistryStore,
    E: EntropySource,
{
    let store = Arc::new(registry);
    let workspace = Arc::new(InMemoryWorkspace::new(BASE_DIR));
    let runtime = Arc::new(InMemoryStackRuntime::new());
    let service = InstanceProvisioningService::new(
        Arc::clone(&store),
        Arc::clone(&workspace),
        Arc::clone(&runtime),
        Arc::new(entropy),
        Arc::new(SteppingClock::new()),
        config,
    );
    Harness {
        service,
        store,
        workspace,
        runtime,
    }
}

pub(super) fn harness() -> Harness {
    harness_with(InMemoryRegistryStore::new(), SeededEntropy::new(42))
}

pub(super) fn id(value: i64) -> InstanceId {
    InstanceId::new(value).expect("valid test id")
}

impl<S, E> Harness<S, E>
where
    S: RegistryStore,
    E: EntropySource,
{
    pub(super) fn folder_count(&self) -> usize {
        self.workspace.folders().len()
    }

    pub(super) fn registered(&self) -> usize {
        self.store.load().expect("registry loads").len()
    }

    pub(super) fn folder_exists(&self, value: i64) -> bool {
        self.service
            .get(id(value))
            .is_ok_and(|record| self.workspace.exists(record.folder_path()))
    }
}
