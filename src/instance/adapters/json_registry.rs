//! JSON file registry store.
//!
//! The registry lives in a single pretty-printed JSON array under the base
//! directory. Saves write a temporary sibling, sync it, keep a backup of the
//! previous file, and rename the temporary file over the live one, so a
//! reader sees either the old or the new registry but never a torn write.
//!
//! There is no locking: two processes saving concurrently leave one of the
//! two complete files behind.

use crate::instance::domain::{InstanceId, InstanceRecord};
use crate::instance::ports::{RegistryStore, RegistryStoreError, RegistryStoreResult};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{ErrorKind, Write};
use tracing::{debug, warn};

/// File name of the registry inside the base directory.
pub const REGISTRY_FILE_NAME: &str = "instance_registry.json";

const BACKUP_FILE_NAME: &str = "instance_registry.json.backup";
const TEMP_FILE_NAME: &str = "instance_registry.json.tmp";

/// Registry store persisted as JSON under a base directory.
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    base_dir: Utf8PathBuf,
}

impl JsonFileRegistry {
    /// Creates a store rooted at `base_dir`.
    ///
    /// Nothing touches the filesystem until the first load or save.
    #[must_use]
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the path of the live registry file.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.base_dir.join(REGISTRY_FILE_NAME)
    }

    /// Returns the path of the backup kept from the previous save.
    #[must_use]
    pub fn backup_path(&self) -> Utf8PathBuf {
        self.base_dir.join(BACKUP_FILE_NAME)
    }

    fn open_base(&self) -> RegistryStoreResult<Dir> {
        Dir::create_ambient_dir_all(&self.base_dir, ambient_authority())
            .map_err(|err| RegistryStoreError::io(&self.base_dir, err))?;
        Dir::open_ambient_dir(&self.base_dir, ambient_authority())
            .map_err(|err| RegistryStoreError::io(&self.base_dir, err))
    }

    fn write_temp(&self, dir: &Dir, contents: &str) -> RegistryStoreResult<()> {
        let temp_path = self.base_dir.join(TEMP_FILE_NAME);
        let written = dir.create(TEMP_FILE_NAME).and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        });

        written.map_err(|err| {
            discard_temp(dir, &temp_path);
            RegistryStoreError::io(temp_path, err)
        })
    }

    fn keep_backup(&self, dir: &Dir) {
        if !dir.exists(REGISTRY_FILE_NAME) {
            return;
        }
        if let Err(err) = dir.copy(REGISTRY_FILE_NAME, dir, BACKUP_FILE_NAME) {
            warn!(
                path = %self.backup_path(),
                error = %err,
                "failed to back up instance registry"
            );
        }
    }
}

fn discard_temp(dir: &Dir, temp_path: &Utf8Path) {
    if let Err(err) = dir.remove_file(TEMP_FILE_NAME)
        && err.kind() != ErrorKind::NotFound
    {
        warn!(path = %temp_path, error = %err, "failed to remove temporary registry file");
    }
}

/// Checks uniqueness of identifiers and ports across `records`.
fn check_invariants(records: &[InstanceRecord]) -> Result<(), String> {
    let mut seen_ids = BTreeSet::new();
    let mut port_owners: BTreeMap<u16, InstanceId> = BTreeMap::new();

    for record in records {
        let id = record.instance_id();
        if !seen_ids.insert(id) {
            return Err(format!("instance {id} is registered more than once"));
        }
        for (service, port) in record.ports().iter() {
            if let Some(owner) = port_owners.insert(port, id) {
                return Err(format!(
                    "port {port} ({service}) of instance {id} is also owned by instance {owner}"
                ));
            }
        }
    }
    Ok(())
}

/// Serializes records deterministically: sorted by id, trailing newline.
fn render_registry(records: &[InstanceRecord]) -> Result<String, serde_json::Error> {
    let mut sorted: Vec<&InstanceRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.instance_id());

    let mut contents = serde_json::to_string_pretty(&sorted)?;
    contents.push('\n');
    Ok(contents)
}

impl RegistryStore for JsonFileRegistry {
    fn load(&self) -> RegistryStoreResult<Vec<InstanceRecord>> {
        let path = self.path();
        let dir = match Dir::open_ambient_dir(&self.base_dir, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(RegistryStoreError::io(&self.base_dir, err)),
        };
        let contents = match dir.read_to_string(REGISTRY_FILE_NAME) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(RegistryStoreError::io(path, err)),
        };

        let mut records: Vec<InstanceRecord> = serde_json::from_str(&contents)
            .map_err(|err| RegistryStoreError::corrupted(&path, err.to_string()))?;
        check_invariants(&records).map_err(|reason| RegistryStoreError::corrupted(&path, reason))?;
        records.sort_by_key(InstanceRecord::instance_id);

        debug!(path = %path, count = records.len(), "loaded instance registry");
        Ok(records)
    }

    fn save(&self, records: &[InstanceRecord]) -> RegistryStoreResult<()> {
        let path = self.path();
        let contents = render_registry(records)
            .map_err(|err| RegistryStoreError::io(&path, std::io::Error::other(err)))?;

        let dir = self.open_base()?;
        self.write_temp(&dir, &contents)?;
        self.keep_backup(&dir);

        dir.rename(TEMP_FILE_NAME, &dir, REGISTRY_FILE_NAME)
            .map_err(|err| {
                discard_temp(&dir, &self.base_dir.join(TEMP_FILE_NAME));
                RegistryStoreError::io(&path, err)
            })?;

        debug!(path = %path, count = records.len(), "saved instance registry");
        Ok(())
    }
}
