//! Failure injection through a mocked registry store.

use super::support::{BASE_DIR, harness_with};
use crate::instance::{
    domain::test_support::SeededEntropy,
    ports::{MockRegistryStore, RegistryStoreError},
    services::{CreateInstanceRequest, ProvisioningError},
};
use camino::Utf8Path;

#[test]
fn save_failure_after_folder_write_leaves_nothing_behind() {
    let mut store = MockRegistryStore::new();
    store.expect_load().times(1).returning(|| Ok(Vec::new()));
    store.expect_save().times(1).returning(|_| {
        Err(RegistryStoreError::io(
            Utf8Path::new(BASE_DIR).join("instance_registry.json"),
            std::io::Error::other("disk full"),
        ))
    });
    let context = harness_with(store, SeededEntropy::new(3));

    let result = context.service.create(CreateInstanceRequest::new());

    assert!(matches!(
        result,
        Err(ProvisioningError::Registry(RegistryStoreError::Io { .. }))
    ));
    assert_eq!(context.folder_count(), 0);
}

#[test]
fn corrupted_registry_stops_creation_before_any_write() {
    let mut store = MockRegistryStore::new();
    store.expect_load().times(1).returning(|| {
        Err(RegistryStoreError::corrupted(
            Utf8Path::new(BASE_DIR).join("instance_registry.json"),
            "expected value at line 1 column 1",
        ))
    });
    store.expect_save().never();
    let context = harness_with(store, SeededEntropy::new(3));

    let result = context.service.create(CreateInstanceRequest::new());

    assert!(matches!(
        result,
        Err(ProvisioningError::Registry(RegistryStoreError::Corrupted { .. }))
    ));
    assert_eq!(context.folder_count(), 0);
}

#[test]
fn registry_saves_the_new_record_last() {
    let mut store = MockRegistryStore::new();
    store.expect_load().times(1).returning(|| Ok(Vec::new()));
    store
        .expect_save()
        .times(1)
        .withf(|records| records.len() == 1 && records.iter().all(|r| r.instance_id().get() == 1))
        .returning(|_| Ok(()));
    let context = harness_with(store, SeededEntropy::new(3));

    let record = context
        .service
        .create(CreateInstanceRequest::new())
        .expect("creation succeeds");

    assert_eq!(context.folder_count(), 1);
    assert!(context.workspace.files(record.folder_path()).is_some());
}
