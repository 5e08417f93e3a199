//! Deterministic port allocation for instances.
//!
//! Every service has a documented base port. The port of service `s` for
//! instance `i` is `base_port(s) + i * PORT_STRIDE`, so the same identifier
//! always yields the same ports and deleting an instance frees its ports
//! without any bookkeeping.

use super::{InstanceDomainError, InstanceId, InstanceRecord, ParseStackServiceError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Distance between the port blocks of consecutive instances.
///
/// Must exceed the span between the lowest and highest base port.
pub const PORT_STRIDE: u32 = 10;

/// Logical services of the stack that expose a host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackService {
    /// API gateway plain HTTP listener.
    GatewayHttp,
    /// API gateway TLS listener.
    GatewayHttps,
    /// Studio dashboard.
    Dashboard,
    /// `PostgreSQL` database.
    Database,
    /// Transaction-mode connection pooler.
    Pooler,
    /// Analytics (Logflare) endpoint.
    Analytics,
}

impl StackService {
    /// Every service in allocation order.
    pub const ALL: [Self; 6] = [
        Self::GatewayHttp,
        Self::GatewayHttps,
        Self::Dashboard,
        Self::Database,
        Self::Pooler,
        Self::Analytics,
    ];

    /// Returns the documented base port of the service.
    #[must_use]
    pub const fn base_port(self) -> u16 {
        match self {
            Self::GatewayHttp => 20_000,
            Self::GatewayHttps => 20_001,
            Self::Dashboard => 20_002,
            Self::Database => 20_003,
            Self::Pooler => 20_004,
            Self::Analytics => 20_005,
        }
    }

    /// Returns the canonical service name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GatewayHttp => "gateway-http",
            Self::GatewayHttps => "gateway-https",
            Self::Dashboard => "dashboard",
            Self::Database => "database",
            Self::Pooler => "pooler",
            Self::Analytics => "analytics",
        }
    }
}

impl fmt::Display for StackService {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StackService {
    type Error = ParseStackServiceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|service| service.as_str() == normalized)
            .ok_or_else(|| ParseStackServiceError(value.to_owned()))
    }
}

/// Ports allocated to one instance, keyed by service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortSet(BTreeMap<StackService, u16>);

impl PortSet {
    /// Builds a port set from explicit entries.
    ///
    /// Used when reconstructing persisted or hand-edited records; fresh
    /// allocations go through [`allocate`].
    #[must_use]
    pub const fn from_entries(entries: BTreeMap<StackService, u16>) -> Self {
        Self(entries)
    }

    /// Returns the port for `service`, when allocated.
    #[must_use]
    pub fn get(&self, service: StackService) -> Option<u16> {
        self.0.get(&service).copied()
    }

    /// Returns the lowest allocated port.
    #[must_use]
    pub fn lowest(&self) -> Option<u16> {
        self.0.values().copied().min()
    }

    /// Returns whether `port` belongs to this set.
    #[must_use]
    pub fn contains_port(&self, port: u16) -> bool {
        self.0.values().any(|allocated| *allocated == port)
    }

    /// Iterates over `(service, port)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (StackService, u16)> + '_ {
        self.0.iter().map(|(service, port)| (*service, *port))
    }

    /// Returns the number of allocated ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no ports are allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Computes the port set of `instance_id` and checks it against `existing`.
///
/// # Errors
///
/// Returns [`InstanceDomainError::InvalidInstanceId`] when a derived port
/// would exceed 65535, and [`InstanceDomainError::PortConflict`] when a
/// derived port is already owned by one of `existing`.
pub fn allocate(
    instance_id: InstanceId,
    existing: &[InstanceRecord],
) -> Result<PortSet, InstanceDomainError> {
    let candidate = derive_ports(instance_id)?;

    for (service, port) in candidate.iter() {
        if let Some(owner) = existing
            .iter()
            .find(|record| record.ports().contains_port(port))
        {
            return Err(InstanceDomainError::PortConflict {
                port,
                service,
                conflicting_instance: owner.instance_id(),
            });
        }
    }

    Ok(candidate)
}

fn derive_ports(instance_id: InstanceId) -> Result<PortSet, InstanceDomainError> {
    let offset = u64::from(instance_id.get()) * u64::from(PORT_STRIDE);
    let mut entries = BTreeMap::new();

    for service in StackService::ALL {
        let port = u16::try_from(u64::from(service.base_port()) + offset).map_err(|_| {
            InstanceDomainError::InvalidInstanceId {
                value: i64::from(instance_id.get()),
                reason: format!("{service} port would exceed {}", u16::MAX),
            }
        })?;
        entries.insert(service, port);
    }

    Ok(PortSet(entries))
}
