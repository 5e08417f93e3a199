//! Environment synthesis for the backend stack.
//!
//! [`EnvironmentSynthesizer::render`] turns a record into the ordered
//! key/value configuration written to `<folder>/.env`. Every export format
//! is derived from the same mapping so formats cannot drift apart.

use super::{InstanceRecord, StackService};
use std::collections::BTreeMap;

/// Configuration keys understood by the stack.
pub mod keys {
    /// Numeric instance identifier.
    pub const INSTANCE_ID: &str = "INSTANCE_ID";
    /// Compose project name.
    pub const COMPOSE_PROJECT_NAME: &str = "COMPOSE_PROJECT_NAME";
    /// Container network name.
    pub const DOCKER_NETWORK: &str = "DOCKER_NETWORK";
    /// Database name.
    pub const POSTGRES_DB: &str = "POSTGRES_DB";
    /// Host port of the database.
    pub const POSTGRES_PORT: &str = "POSTGRES_PORT";
    /// Database superuser password.
    pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
    /// Connection string for external clients.
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Token signing secret.
    pub const JWT_SECRET: &str = "JWT_SECRET";
    /// Anon API token.
    pub const ANON_KEY: &str = "ANON_KEY";
    /// Service-role API token.
    pub const SERVICE_ROLE_KEY: &str = "SERVICE_ROLE_KEY";
    /// Dashboard basic-auth user.
    pub const DASHBOARD_USERNAME: &str = "DASHBOARD_USERNAME";
    /// Dashboard basic-auth password.
    pub const DASHBOARD_PASSWORD: &str = "DASHBOARD_PASSWORD";
    /// Realtime/pooler secret key base.
    pub const SECRET_KEY_BASE: &str = "SECRET_KEY_BASE";
    /// Vault encryption key.
    pub const VAULT_ENC_KEY: &str = "VAULT_ENC_KEY";
    /// Gateway HTTP host port.
    pub const KONG_HTTP_PORT: &str = "KONG_HTTP_PORT";
    /// Gateway HTTPS host port.
    pub const KONG_HTTPS_PORT: &str = "KONG_HTTPS_PORT";
    /// Dashboard host port.
    pub const STUDIO_PORT: &str = "STUDIO_PORT";
    /// Analytics host port.
    pub const ANALYTICS_PORT: &str = "ANALYTICS_PORT";
    /// Pooler transaction-mode host port.
    pub const POOLER_PROXY_PORT_TRANSACTION: &str = "POOLER_PROXY_PORT_TRANSACTION";
    /// Externally reachable API URL.
    pub const API_EXTERNAL_URL: &str = "API_EXTERNAL_URL";
    /// Public URL shown by the dashboard.
    pub const SUPABASE_PUBLIC_URL: &str = "SUPABASE_PUBLIC_URL";
    /// Redirect base for auth flows.
    pub const SITE_URL: &str = "SITE_URL";
    /// Analytics public access token.
    pub const LOGFLARE_PUBLIC_ACCESS_TOKEN: &str = "LOGFLARE_PUBLIC_ACCESS_TOKEN";
    /// Analytics private access token.
    pub const LOGFLARE_PRIVATE_ACCESS_TOKEN: &str = "LOGFLARE_PRIVATE_ACCESS_TOKEN";
}

const DASHBOARD_USER: &str = "supabase";
const DATABASE_USER: &str = "postgres";

/// Default host used in generated URLs.
pub const DEFAULT_PUBLIC_HOST: &str = "localhost";

/// Ordered configuration for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEnvironment {
    entries: Vec<(&'static str, String)>,
}

impl StackEnvironment {
    /// Returns the value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over entries in render order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, value.as_str()))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the environment is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries as a sorted map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect()
    }

    /// Serializes the environment as `KEY=VALUE` lines.
    #[must_use]
    pub fn to_dotenv(&self) -> String {
        dotenv_lines(self.iter())
    }

    /// Lays the environment over an upstream `.env.example`.
    ///
    /// Assignments to rendered keys take the rendered value in place; every
    /// other line of the template is kept verbatim. Rendered keys the
    /// template lacks are appended in render order under a marker comment.
    #[must_use]
    pub fn overlay(&self, template: &str) -> String {
        let mut output = String::with_capacity(template.len());
        let mut written = Vec::new();

        for line in template.lines() {
            match assignment_key(line).and_then(|key| self.entry(key)) {
                Some((key, value)) => {
                    output.push_str(&dotenv_lines([(key, value)]));
                    written.push(key);
                }
                None => {
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }

        let remaining: Vec<(&str, &str)> = self
            .iter()
            .filter(|(key, _)| !written.contains(key))
            .collect();
        if !remaining.is_empty() {
            output.push_str(OVERLAY_MARKER);
            output.push_str(&dotenv_lines(remaining));
        }
        output
    }

    fn entry(&self, key: &str) -> Option<(&'static str, &str)> {
        self.iter().find(|(candidate, _)| *candidate == key)
    }
}

/// Comment introducing instance keys appended to an upstream template.
const OVERLAY_MARKER: &str = "\n# Instance configuration rendered by berth\n";

/// Serializes pairs as `KEY=VALUE` lines, quoting values only when needed.
#[must_use]
pub fn dotenv_lines<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut output = String::new();
    for (key, value) in pairs {
        output.push_str(key.as_ref());
        output.push('=');
        output.push_str(&dotenv_value(value.as_ref()));
        output.push('\n');
    }
    output
}

/// Returns the key of an assignment line, ignoring comments and blanks.
fn assignment_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    trimmed
        .split_once('=')
        .map(|(key, _)| key.trim())
        .filter(|key| !key.is_empty())
}

fn dotenv_value(value: &str) -> String {
    let is_bare = !value.is_empty()
        && value.chars().all(|character| {
            character.is_ascii_alphanumeric() || "_./:@+,=-".contains(character)
        });
    if is_bare {
        return value.to_owned();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for character in value.chars() {
        match character {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '$' => quoted.push_str("\\$"),
            '\n' => quoted.push_str("\\n"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Builds the stack configuration from instance records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSynthesizer {
    public_host: String,
}

impl Default for EnvironmentSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_HOST)
    }
}

impl EnvironmentSynthesizer {
    /// Creates a synthesizer that addresses instances through `public_host`.
    #[must_use]
    pub fn new(public_host: impl Into<String>) -> Self {
        Self {
            public_host: public_host.into(),
        }
    }

    /// Returns the host used in generated URLs.
    #[must_use]
    pub fn public_host(&self) -> &str {
        &self.public_host
    }

    /// Returns the external API URL of `record`.
    #[must_use]
    pub fn api_url(&self, record: &InstanceRecord) -> String {
        format!(
            "http://{}:{}",
            self.public_host,
            port_value(record, StackService::GatewayHttp)
        )
    }

    /// Returns the external database connection string of `record`.
    #[must_use]
    pub fn database_url(&self, record: &InstanceRecord) -> String {
        format!(
            "postgresql://{DATABASE_USER}:{}@{}:{}/{}",
            record.credentials().postgres_password(),
            self.public_host,
            port_value(record, StackService::Database),
            record.database_name()
        )
    }

    /// Renders the full configuration of `record`.
    #[must_use]
    pub fn render(&self, record: &InstanceRecord) -> StackEnvironment {
        let credentials = record.credentials();
        let api_url = self.api_url(record);

        let entries = vec![
            (keys::INSTANCE_ID, record.instance_id().to_string()),
            (keys::COMPOSE_PROJECT_NAME, record.project_name()),
            (keys::DOCKER_NETWORK, record.network_name().to_owned()),
            (keys::POSTGRES_DB, record.database_name().to_owned()),
            (
                keys::POSTGRES_PORT,
                port_value(record, StackService::Database),
            ),
            (
                keys::POSTGRES_PASSWORD,
                credentials.postgres_password().to_owned(),
            ),
            (keys::DATABASE_URL, self.database_url(record)),
            (
                keys::JWT_SECRET,
                credentials.jwt_secret().expose().to_owned(),
            ),
            (keys::ANON_KEY, credentials.anon_key().to_owned()),
            (
                keys::SERVICE_ROLE_KEY,
                credentials.service_role_key().to_owned(),
            ),
            (keys::DASHBOARD_USERNAME, DASHBOARD_USER.to_owned()),
            (
                keys::DASHBOARD_PASSWORD,
                credentials.dashboard_password().to_owned(),
            ),
            (
                keys::SECRET_KEY_BASE,
                credentials.secret_key_base().to_owned(),
            ),
            (keys::VAULT_ENC_KEY, credentials.vault_enc_key().to_owned()),
            (
                keys::KONG_HTTP_PORT,
                port_value(record, StackService::GatewayHttp),
            ),
            (
                keys::KONG_HTTPS_PORT,
                port_value(record, StackService::GatewayHttps),
            ),
            (
                keys::STUDIO_PORT,
                port_value(record, StackService::Dashboard),
            ),
            (
                keys::ANALYTICS_PORT,
                port_value(record, StackService::Analytics),
            ),
            (
                keys::POOLER_PROXY_PORT_TRANSACTION,
                port_value(record, StackService::Pooler),
            ),
            (keys::API_EXTERNAL_URL, api_url.clone()),
            (keys::SUPABASE_PUBLIC_URL, api_url.clone()),
            (keys::SITE_URL, api_url),
            (
                keys::LOGFLARE_PUBLIC_ACCESS_TOKEN,
                credentials.logflare_public_token().to_owned(),
            ),
            (
                keys::LOGFLARE_PRIVATE_ACCESS_TOKEN,
                credentials.logflare_private_token().to_owned(),
            ),
        ];

        StackEnvironment { entries }
    }
}

fn port_value(record: &InstanceRecord, service: StackService) -> String {
    record
        .ports()
        .get(service)
        .map(|port| port.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, raw)| {
            let value = raw
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .map_or_else(|| raw.to_owned(), unescape);
            (key.to_owned(), value)
        })
        .collect()
}

#[cfg(test)]
fn unescape(inner: &str) -> String {
    let mut output = String::with_capacity(inner.len());
    let mut characters = inner.chars();
    while let Some(character) = characters.next() {
        if character != '\\' {
            output.push(character);
            continue;
        }
        match characters.next() {
            Some('n') => output.push('\n'),
            Some(other) => output.push(other),
            None => output.push('\\'),
        }
    }
    output
}
