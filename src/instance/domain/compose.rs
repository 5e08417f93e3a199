//! Typed compose documents written next to the stack configuration.
//!
//! Documents are built as `serde` structures and serialized to YAML, so
//! names and values are checked before anything reaches disk.

use super::environment::keys;
use super::{EnvironmentSynthesizer, ExportError, InstanceDomainError, InstanceRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// Compose services of the stack that carry a fixed container name upstream.
pub const STACK_CONTAINERS: [&str; 13] = [
    "studio",
    "kong",
    "auth",
    "rest",
    "realtime",
    "storage",
    "imgproxy",
    "meta",
    "functions",
    "analytics",
    "db",
    "vector",
    "supavisor",
];

/// A compose file fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    services: BTreeMap<String, ComposeService>,
    networks: BTreeMap<String, ComposeNetwork>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
struct ComposeService {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    environment: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    networks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ComposeNetwork {
    name: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    external: bool,
}

impl ComposeDocument {
    /// Builds the override that isolates an instance's stack.
    ///
    /// It pins the project name, prefixes every upstream container name with
    /// the instance, and names the default network after the instance.
    #[must_use]
    pub fn instance_override(record: &InstanceRecord) -> Self {
        let project = record.project_name();
        let services = STACK_CONTAINERS
            .iter()
            .map(|service| {
                let definition = ComposeService {
                    container_name: Some(format!("{project}-{service}")),
                    ..ComposeService::default()
                };
                ((*service).to_owned(), definition)
            })
            .collect();

        let networks = BTreeMap::from([(
            "default".to_owned(),
            ComposeNetwork {
                name: record.network_name().to_owned(),
                external: false,
            },
        )]);

        Self {
            name: Some(project),
            services,
            networks,
        }
    }

    /// Builds a compose file for an external service that joins the network
    /// of `record` with its connection settings in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceDomainError::InvalidServiceName`] when
    /// `service_name` is not a valid compose service key.
    pub fn external_service(
        record: &InstanceRecord,
        service_name: &str,
        synthesizer: &EnvironmentSynthesizer,
    ) -> Result<Self, InstanceDomainError> {
        let is_valid = !service_name.is_empty()
            && service_name.chars().all(|character| {
                character.is_ascii_lowercase()
                    || character.is_ascii_digit()
                    || character == '_'
                    || character == '-'
            });
        if !is_valid {
            return Err(InstanceDomainError::InvalidServiceName(
                service_name.to_owned(),
            ));
        }

        let rendered = synthesizer.render(record);
        let environment = [
            ("DATABASE_URL", keys::DATABASE_URL),
            ("SUPABASE_URL", keys::API_EXTERNAL_URL),
            ("SUPABASE_ANON_KEY", keys::ANON_KEY),
            ("SUPABASE_SERVICE_KEY", keys::SERVICE_ROLE_KEY),
        ]
        .into_iter()
        .map(|(name, key)| format!("{name}={}", rendered.get(key).unwrap_or_default()))
        .collect();

        let network = record.network_name().to_owned();
        let service = ComposeService {
            image: Some("your-service-image:latest".to_owned()),
            container_name: None,
            environment,
            networks: vec![network.clone()],
        };

        Ok(Self {
            name: None,
            services: BTreeMap::from([(service_name.to_owned(), service)]),
            networks: BTreeMap::from([(
                network.clone(),
                ComposeNetwork {
                    name: network,
                    external: true,
                },
            )]),
        })
    }

    /// Serializes the document as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Yaml`] when serialization fails.
    pub fn to_yaml(&self) -> Result<String, ExportError> {
        serde_yaml::to_string(self).map_err(|error| ExportError::Yaml(error.to_string()))
    }
}
