//! Instance record aggregate root and naming conventions.

use super::{InstanceCredentials, InstanceDomainError, InstanceId, PortSet};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Returns the container network name of an instance.
#[must_use]
pub fn network_name(instance_id: InstanceId) -> String {
    format!("supabase-instance{instance_id}-network")
}

/// Returns the database name of an instance.
#[must_use]
pub fn database_name(instance_id: InstanceId) -> String {
    format!("supabase_instance{instance_id}")
}

/// Returns the compose project name of an instance.
#[must_use]
pub fn project_name(instance_id: InstanceId) -> String {
    format!("supabase-instance{instance_id}")
}

/// Returns the label given to an instance created without a name.
#[must_use]
pub fn default_name(instance_id: InstanceId) -> String {
    format!("Instance {instance_id}")
}

/// Returns the description given to an instance created without one.
#[must_use]
pub fn default_description(instance_id: InstanceId) -> String {
    format!("Supabase instance {instance_id}")
}

/// Returns the folder name for an instance, derived from its initial name.
///
/// Named instances get `<slug>-instance<id>`; unnamed ones `instance<id>`.
#[must_use]
pub fn folder_name(instance_id: InstanceId, name: Option<&str>) -> String {
    let slug = name.map(slugify).unwrap_or_default();
    if slug.is_empty() {
        format!("instance{instance_id}")
    } else {
        format!("{slug}-instance{instance_id}")
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for character in name.trim().to_lowercase().chars() {
        if character.is_ascii_alphanumeric() || character == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(character);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Normalizes caller-supplied tags: trimmed, deduplicated, sorted.
///
/// # Errors
///
/// Returns [`InstanceDomainError::EmptyTag`] when a tag is blank.
pub fn normalize_tags(
    tags: impl IntoIterator<Item = String>,
) -> Result<BTreeSet<String>, InstanceDomainError> {
    tags.into_iter()
        .map(|tag| {
            let trimmed = tag.trim();
            if trimmed.is_empty() {
                Err(InstanceDomainError::EmptyTag)
            } else {
                Ok(trimmed.to_owned())
            }
        })
        .collect()
}

/// Parameter object for a freshly provisioned instance.
#[derive(Debug, Clone)]
pub struct NewInstance {
    /// Identifier of the instance.
    pub instance_id: InstanceId,
    /// Human label; defaults to `Instance <id>`.
    pub name: Option<String>,
    /// Free text; defaults to `Supabase instance <id>`.
    pub description: Option<String>,
    /// Normalized tags.
    pub tags: BTreeSet<String>,
    /// Folder holding the rendered configuration.
    pub folder_path: Utf8PathBuf,
    /// Allocated ports.
    pub ports: PortSet,
    /// Generated credentials.
    pub credentials: InstanceCredentials,
}

/// Changes to the mutable metadata of an instance.
///
/// `None` leaves the corresponding field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceMetadataPatch {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement tag set.
    pub tags: Option<BTreeSet<String>>,
}

impl InstanceMetadataPatch {
    /// Returns whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.tags.is_none()
    }
}

/// Registry entry for one provisioned instance.
///
/// Only `name`, `description`, `tags`, and `updated_at` change after
/// creation; every other field is write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    instance_id: InstanceId,
    name: String,
    description: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    folder_path: Utf8PathBuf,
    ports: PortSet,
    network_name: String,
    database_name: String,
    credentials: InstanceCredentials,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// Creates the record of a newly provisioned instance.
    #[must_use]
    pub fn new(params: NewInstance, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        let id = params.instance_id;
        Self {
            instance_id: id,
            name: params.name.unwrap_or_else(|| default_name(id)),
            description: params
                .description
                .unwrap_or_else(|| default_description(id)),
            tags: params.tags,
            folder_path: params.folder_path,
            ports: params.ports,
            network_name: network_name(id),
            database_name: database_name(id),
            credentials: params.credentials,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Returns the instance identifier.
    #[must_use]
    pub const fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Returns the human label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the tags in sorted order.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Returns the folder holding the rendered configuration.
    #[must_use]
    pub fn folder_path(&self) -> &Utf8Path {
        &self.folder_path
    }

    /// Returns the allocated ports.
    #[must_use]
    pub const fn ports(&self) -> &PortSet {
        &self.ports
    }

    /// Returns the container network name.
    #[must_use]
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// Returns the database name.
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Returns the compose project name.
    #[must_use]
    pub fn project_name(&self) -> String {
        project_name(self.instance_id)
    }

    /// Returns the generated credentials.
    #[must_use]
    pub const fn credentials(&self) -> &InstanceCredentials {
        &self.credentials
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Applies a metadata patch and bumps `updated_at`.
    pub fn apply_metadata(&mut self, patch: InstanceMetadataPatch, clock: &impl Clock) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        self.touch(clock);
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::domain::test_support::{SteppingClock, sample_record};
    use rstest::rstest;

    fn id(value: i64) -> InstanceId {
        InstanceId::new(value).expect("valid test id")
    }

    #[rstest]
    #[case(None, "instance3")]
    #[case(Some("Billing API"), "billing-api-instance3")]
    #[case(Some("  --Team__One!!  "), "team__one-instance3")]
    #[case(Some("Ünïcode & stuff"), "n-code-stuff-instance3")]
    #[case(Some("???"), "instance3")]
    fn folder_names_follow_the_slug_convention(
        #[case] name: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(folder_name(id(3), name), expected);
    }

    #[test]
    fn derived_names_are_unique_per_instance() {
        assert_eq!(network_name(id(12)), "supabase-instance12-network");
        assert_eq!(database_name(id(12)), "supabase_instance12");
        assert_eq!(project_name(id(12)), "supabase-instance12");
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = normalize_tags(vec![" prod ".to_owned(), "eu".to_owned(), "prod".to_owned()])
            .expect("tags are valid");

        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["eu", "prod"]);
    }

    #[test]
    fn blank_tags_are_rejected() {
        let result = normalize_tags(vec!["ok".to_owned(), "   ".to_owned()]);

        assert_eq!(result, Err(InstanceDomainError::EmptyTag));
    }

    #[test]
    fn metadata_patch_touches_only_mutable_fields() {
        let clock = SteppingClock::new();
        let mut record = sample_record(id(4), &clock);
        let before = record.clone();

        record.apply_metadata(
            InstanceMetadataPatch {
                name: Some("Renamed".to_owned()),
                description: None,
                tags: Some(BTreeSet::from(["staging".to_owned()])),
            },
            &clock,
        );

        assert_eq!(record.name(), "Renamed");
        assert_eq!(record.description(), before.description());
        assert_eq!(record.tags().len(), 1);
        assert_eq!(record.ports(), before.ports());
        assert_eq!(record.credentials(), before.credentials());
        assert_eq!(record.folder_path(), before.folder_path());
        assert_eq!(record.created_at(), before.created_at());
        assert!(record.updated_at() > before.updated_at());
    }

    #[test]
    fn defaults_are_derived_from_the_identifier() {
        let clock = SteppingClock::new();
        let record = sample_record(id(6), &clock);

        assert_eq!(record.name(), "Instance 6");
        assert_eq!(record.description(), "Supabase instance 6");
        assert_eq!(record.created_at(), record.updated_at());
    }
}
