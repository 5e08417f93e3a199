//! Deterministic fixtures shared by unit tests.

use super::{
    CredentialError, EntropySource, InstanceCredentials, InstanceId, InstanceRecord, NewInstance,
    PortSet, allocate, folder_name,
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Reproducible entropy backed by a seeded generator.
pub(crate) struct SeededEntropy(Mutex<StdRng>);

impl SeededEntropy {
    pub(crate) fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl EntropySource for SeededEntropy {
    fn fill(&self, destination: &mut [u8]) -> Result<(), CredentialError> {
        let mut rng = self
            .0
            .lock()
            .map_err(|_| CredentialError::Entropy("seeded generator poisoned".to_owned()))?;
        rng.fill_bytes(destination);
        Ok(())
    }
}

/// Entropy source that always fails.
pub(crate) struct FailingEntropy;

impl EntropySource for FailingEntropy {
    fn fill(&self, _destination: &mut [u8]) -> Result<(), CredentialError> {
        Err(CredentialError::Entropy("device unavailable".to_owned()))
    }
}

pub(crate) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0)
        .single()
        .expect("fixed timestamp is unambiguous")
}

/// Clock that advances one second per reading, starting at [`fixed_time`].
pub(crate) struct SteppingClock {
    ticks: AtomicI64,
}

impl SteppingClock {
    pub(crate) const fn new() -> Self {
        Self {
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        fixed_time() + chrono::Duration::seconds(tick)
    }
}

fn seed_for(instance_id: InstanceId) -> u64 {
    u64::from(instance_id.get())
}

/// Builds a record with ports derived from its identifier.
pub(crate) fn sample_record(instance_id: InstanceId, clock: &impl Clock) -> InstanceRecord {
    let ports = allocate(instance_id, &[]).expect("sample ids allocate");
    record_with(instance_id, ports, clock)
}

/// Builds a record that owns exactly `ports`.
pub(crate) fn record_with_ports(instance_id: InstanceId, ports: PortSet) -> InstanceRecord {
    record_with(instance_id, ports, &SteppingClock::new())
}

fn record_with(instance_id: InstanceId, ports: PortSet, clock: &impl Clock) -> InstanceRecord {
    let credentials =
        InstanceCredentials::generate(&SeededEntropy::new(seed_for(instance_id)), fixed_time())
            .expect("seeded credentials generate");
    InstanceRecord::new(
        NewInstance {
            instance_id,
            name: None,
            description: None,
            tags: BTreeSet::new(),
            folder_path: Utf8PathBuf::from("/srv/instances").join(folder_name(instance_id, None)),
            ports,
            credentials,
        },
        clock,
    )
}
