//! Connection details and their export formats.
//!
//! Every format is produced from [`ConnectionInfo`], which itself reads from
//! the rendered [`StackEnvironment`](super::StackEnvironment).

use super::environment::{dotenv_lines, keys};
use super::{
    ContainerStatus, EnvironmentSynthesizer, InstanceId, InstanceRecord, PortSet, StackService,
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tabled::{Table, Tabled};
use thiserror::Error;

/// Errors raised while serializing exports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    /// JSON serialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(String),

    /// YAML serialization failed.
    #[error("failed to serialize YAML: {0}")]
    Yaml(String),
}

/// Output format of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Pretty-printed JSON.
    Json,
    /// YAML.
    Yaml,
    /// Prefixed `KEY=VALUE` lines.
    Env,
    /// Human-readable table.
    #[default]
    Table,
}

/// Error returned when parsing an unknown export format.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown format '{0}' (expected json, yaml, env, or table)")]
pub struct ParseExportFormatError(pub String);

impl FromStr for ExportFormat {
    type Err = ParseExportFormatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "env" | "dotenv" => Ok(Self::Env),
            "table" => Ok(Self::Table),
            _ => Err(ParseExportFormatError(value.to_owned())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Env => "env",
            Self::Table => "table",
        })
    }
}

/// Everything a client needs to connect to one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Identifier of the instance.
    pub instance_id: InstanceId,
    /// Human label.
    pub name: String,
    /// Free text.
    pub description: String,
    /// Sorted tags.
    pub tags: BTreeSet<String>,
    /// Folder holding the rendered configuration.
    pub folder_path: Utf8PathBuf,
    /// Container network name.
    pub network_name: String,
    /// Database name.
    pub database_name: String,
    /// Allocated host ports.
    pub ports: PortSet,
    /// External API URL.
    pub api_url: String,
    /// External database connection string.
    pub database_url: String,
    /// Anon API token.
    pub anon_key: String,
    /// Service-role API token.
    pub service_role_key: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Full rendered stack configuration.
    pub environment: BTreeMap<String, String>,
}

impl ConnectionInfo {
    /// Builds the connection details of `record`.
    #[must_use]
    pub fn new(record: &InstanceRecord, synthesizer: &EnvironmentSynthesizer) -> Self {
        let environment = synthesizer.render(record).to_map();
        let lookup = |key: &str| environment.get(key).cloned().unwrap_or_default();

        Self {
            instance_id: record.instance_id(),
            name: record.name().to_owned(),
            description: record.description().to_owned(),
            tags: record.tags().clone(),
            folder_path: record.folder_path().to_owned(),
            network_name: record.network_name().to_owned(),
            database_name: record.database_name().to_owned(),
            ports: record.ports().clone(),
            api_url: lookup(keys::API_EXTERNAL_URL),
            database_url: lookup(keys::DATABASE_URL),
            anon_key: lookup(keys::ANON_KEY),
            service_role_key: lookup(keys::SERVICE_ROLE_KEY),
            created_at: record.created_at(),
            updated_at: record.updated_at(),
            environment,
        }
    }

    fn env_prefix(&self) -> String {
        format!("SUPABASE_INSTANCE_{}_", self.instance_id)
    }

    fn env_pairs(&self, include_secrets: bool) -> Vec<(String, String)> {
        let prefix = self.env_prefix();
        let mut pairs = vec![
            (format!("{prefix}NAME"), self.name.clone()),
            (format!("{prefix}DATABASE_URL"), self.database_url.clone()),
            (format!("{prefix}SUPABASE_URL"), self.api_url.clone()),
        ];
        if include_secrets {
            pairs.push((format!("{prefix}SUPABASE_ANON_KEY"), self.anon_key.clone()));
            pairs.push((
                format!("{prefix}SUPABASE_SERVICE_KEY"),
                self.service_role_key.clone(),
            ));
        }
        pairs.push((format!("{prefix}DOCKER_NETWORK"), self.network_name.clone()));
        pairs.push((
            format!("{prefix}POSTGRES_PORT"),
            port_text(&self.ports, StackService::Database),
        ));
        pairs
    }
}

/// One row of an instance listing: connection details plus observed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceListing {
    /// Connection details.
    #[serde(flatten)]
    pub info: ConnectionInfo,
    /// Observed container state.
    pub status: ContainerStatus,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "ID")]
    id: InstanceId,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "API URL")]
    api_url: String,
    #[tabled(rename = "DB Port")]
    database_port: String,
    #[tabled(rename = "Network")]
    network: String,
    #[tabled(rename = "Folder")]
    folder: String,
}

#[derive(Tabled)]
struct ListingRow {
    #[tabled(rename = "ID")]
    id: InstanceId,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: ContainerStatus,
    #[tabled(rename = "API URL")]
    api_url: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Folder")]
    folder: String,
}

impl From<&ConnectionInfo> for InstanceRow {
    fn from(info: &ConnectionInfo) -> Self {
        Self {
            id: info.instance_id,
            name: info.name.clone(),
            api_url: info.api_url.clone(),
            database_port: port_text(&info.ports, StackService::Database),
            network: info.network_name.clone(),
            folder: info.folder_path.to_string(),
        }
    }
}

impl From<&InstanceListing> for ListingRow {
    fn from(listing: &InstanceListing) -> Self {
        Self {
            id: listing.info.instance_id,
            name: listing.info.name.clone(),
            status: listing.status,
            api_url: listing.info.api_url.clone(),
            tags: join_tags(&listing.info.tags),
            folder: listing.info.folder_path.to_string(),
        }
    }
}

fn port_text(ports: &PortSet, service: StackService) -> String {
    ports
        .get(service)
        .map(|port| port.to_string())
        .unwrap_or_default()
}

fn join_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ExportError> {
    serde_json::to_string_pretty(value)
        .map(|mut json| {
            json.push('\n');
            json
        })
        .map_err(|error| ExportError::Json(error.to_string()))
}

fn to_yaml<T: Serialize + ?Sized>(value: &T) -> Result<String, ExportError> {
    serde_yaml::to_string(value).map_err(|error| ExportError::Yaml(error.to_string()))
}

fn with_newline(mut text: String) -> String {
    text.push('\n');
    text
}

fn detail_table(info: &ConnectionInfo) -> String {
    let mut fields = vec![
        ("ID", info.instance_id.to_string()),
        ("Name", info.name.clone()),
        ("Description", info.description.clone()),
        ("Tags", join_tags(&info.tags)),
        ("Folder", info.folder_path.to_string()),
        ("Network", info.network_name.clone()),
        ("Database", info.database_name.clone()),
        ("API URL", info.api_url.clone()),
        ("Database URL", info.database_url.clone()),
        ("Anon key", info.anon_key.clone()),
        ("Service role key", info.service_role_key.clone()),
    ];
    fields.extend(
        info.ports
            .iter()
            .map(|(service, port)| (service.as_str(), port.to_string())),
    );

    let rows = fields.into_iter().map(|(field, value)| FieldRow {
        field: field.to_owned(),
        value,
    });
    with_newline(Table::new(rows).to_string())
}

fn env_block<'a>(
    infos: impl IntoIterator<Item = &'a ConnectionInfo>,
    include_secrets: bool,
) -> String {
    dotenv_lines(
        infos
            .into_iter()
            .flat_map(|info| info.env_pairs(include_secrets)),
    )
}

/// Formats the connection details of one instance.
///
/// The `env` format of a single instance includes both API tokens.
///
/// # Errors
///
/// Returns [`ExportError`] when structured serialization fails.
pub fn format_connection(
    info: &ConnectionInfo,
    format: ExportFormat,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(info),
        ExportFormat::Yaml => to_yaml(info),
        ExportFormat::Env => Ok(env_block([info], true)),
        ExportFormat::Table => Ok(detail_table(info)),
    }
}

/// Formats the connection details of several instances.
///
/// The `env` format of several instances omits the API tokens.
///
/// # Errors
///
/// Returns [`ExportError`] when structured serialization fails.
pub fn format_connections(
    infos: &[ConnectionInfo],
    format: ExportFormat,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(infos),
        ExportFormat::Yaml => to_yaml(infos),
        ExportFormat::Env => Ok(env_block(infos, false)),
        ExportFormat::Table => Ok(with_newline(
            Table::new(infos.iter().map(InstanceRow::from)).to_string(),
        )),
    }
}

/// Formats an instance listing with observed state.
///
/// # Errors
///
/// Returns [`ExportError`] when structured serialization fails.
pub fn format_listing(
    listings: &[InstanceListing],
    format: ExportFormat,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(listings),
        ExportFormat::Yaml => to_yaml(listings),
        ExportFormat::Env => Ok(env_block(
            listings.iter().map(|listing| &listing.info),
            false,
        )),
        ExportFormat::Table => Ok(with_newline(
            Table::new(listings.iter().map(ListingRow::from)).to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::domain::environment::parse_dotenv;
    use crate::instance::domain::test_support::{SteppingClock, sample_record};
    use rstest::rstest;

    fn info(value: i64) -> ConnectionInfo {
        let id = InstanceId::new(value).expect("valid test id");
        let record = sample_record(id, &SteppingClock::new());
        ConnectionInfo::new(&record, &EnvironmentSynthesizer::default())
    }

    #[rstest]
    #[case("json", ExportFormat::Json)]
    #[case("YAML", ExportFormat::Yaml)]
    #[case("yml", ExportFormat::Yaml)]
    #[case("env", ExportFormat::Env)]
    #[case(" table ", ExportFormat::Table)]
    fn formats_parse_case_insensitively(#[case] raw: &str, #[case] expected: ExportFormat) {
        assert_eq!(raw.parse::<ExportFormat>(), Ok(expected));
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert_eq!(
            "xml".parse::<ExportFormat>(),
            Err(ParseExportFormatError("xml".to_owned()))
        );
    }

    #[test]
    fn connection_info_reads_from_the_rendered_environment() {
        let details = info(2);

        assert_eq!(details.api_url, "http://localhost:20020");
        assert_eq!(
            details.environment.get(keys::ANON_KEY),
            Some(&details.anon_key)
        );
        assert_eq!(
            details.environment.get(keys::DATABASE_URL),
            Some(&details.database_url)
        );
    }

    #[test]
    fn json_export_round_trips() {
        let details = info(3);

        let json = format_connection(&details, ExportFormat::Json).expect("json export");
        let parsed: ConnectionInfo = serde_json::from_str(&json).expect("json parses");

        assert_eq!(parsed, details);
    }

    #[test]
    fn yaml_export_exposes_the_environment_map() {
        let details = info(3);

        let yaml = format_connection(&details, ExportFormat::Yaml).expect("yaml export");
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).expect("yaml parses");

        assert_eq!(
            parsed["environment"]["POSTGRES_PORT"].as_str(),
            Some("20033")
        );
    }

    #[test]
    fn single_env_export_includes_tokens() {
        let details = info(1);

        let exported =
            parse_dotenv(&format_connection(&details, ExportFormat::Env).expect("env export"));

        assert_eq!(
            exported.get("SUPABASE_INSTANCE_1_SUPABASE_ANON_KEY"),
            Some(&details.anon_key)
        );
        assert_eq!(
            exported.get("SUPABASE_INSTANCE_1_POSTGRES_PORT").map(String::as_str),
            Some("20013")
        );
    }

    #[test]
    fn multi_env_export_omits_tokens() {
        let exported =
            format_connections(&[info(1), info(2)], ExportFormat::Env).expect("env export");

        assert!(exported.contains("SUPABASE_INSTANCE_2_SUPABASE_URL=http://localhost:20020"));
        assert!(!exported.contains("ANON_KEY"));
        assert!(!exported.contains("SERVICE_KEY"));
    }

    #[test]
    fn listing_table_shows_status() {
        let listing = InstanceListing {
            info: info(4),
            status: ContainerStatus::Configured,
        };

        let table = format_listing(&[listing], ExportFormat::Table).expect("table export");

        assert!(table.contains("configured"));
        assert!(table.contains("Instance 4"));
    }

    #[test]
    fn listing_json_flattens_connection_details() {
        let listing = InstanceListing {
            info: info(4),
            status: ContainerStatus::Running,
        };

        let json = format_listing(&[listing], ExportFormat::Json).expect("json export");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("json parses");

        assert_eq!(parsed[0]["status"], "running");
        assert_eq!(parsed[0]["instance_id"], 4);
    }
}
