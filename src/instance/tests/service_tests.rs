//! Unit tests for provisioning service orchestration.

use super::support::{BASE_DIR, Harness, harness, harness_configured, harness_with, id};
use crate::instance::{
    adapters::memory::InMemoryRegistryStore,
    domain::{
        ContainerStatus, CredentialError, InstanceCredentials, InstanceDomainError, PORT_STRIDE,
        SigningSecret, StackService, TokenRole, keys, mint_tokens, parse_dotenv,
        test_support::{FailingEntropy, SeededEntropy},
        validate_token,
    },
    ports::{
        ENV_FILE_NAME, ENV_TEMPLATE_FILE_NAME, InstanceWorkspace, LogRequest, OVERRIDE_FILE_NAME,
        WorkspaceError,
    },
    services::{
        CreateInstanceRequest, FileCleanup, ProvisioningConfig, ProvisioningError,
        UpdateInstanceRequest,
    },
};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use rstest::{fixture, rstest};

#[fixture]
fn context() -> Harness {
    harness()
}

fn create(context: &Harness, value: i64) {
    context
        .service
        .create(CreateInstanceRequest::new().with_instance_id(value))
        .expect("instance creation should succeed");
}

#[rstest]
fn create_assigns_smallest_free_id_and_writes_files(context: Harness) {
    create(&context, 1);
    create(&context, 3);

    let record = context
        .service
        .create(CreateInstanceRequest::new().with_name("Billing API").with_tags(["eu", " prod "]))
        .expect("instance creation should succeed");

    assert_eq!(record.instance_id(), id(2));
    assert_eq!(record.name(), "Billing API");
    assert_eq!(
        record.folder_path(),
        Utf8Path::new(BASE_DIR).join("billing-api-instance2")
    );
    assert_eq!(
        record.tags().iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["eu", "prod"]
    );

    let files = context
        .workspace
        .files(record.folder_path())
        .expect("instance folder exists");
    assert!(files.contains_key(ENV_FILE_NAME));
    assert!(files.contains_key(OVERRIDE_FILE_NAME));
}

#[rstest]
fn env_file_matches_the_rendered_environment(context: Harness) {
    create(&context, 4);
    let record = context.service.get(id(4)).expect("instance exists");

    let files = context
        .workspace
        .files(record.folder_path())
        .expect("instance folder exists");
    let env = parse_dotenv(files.get(ENV_FILE_NAME).expect("env file written"));

    assert_eq!(env, context.service.synthesizer().render(&record).to_map());
    assert_eq!(env.get(keys::KONG_HTTP_PORT).map(String::as_str), Some("20040"));
}

#[rstest]
fn created_tokens_validate_against_the_stored_secret(context: Harness) {
    create(&context, 1);
    let credentials = context
        .service
        .get(id(1))
        .expect("instance exists")
        .credentials()
        .clone();

    let claims = validate_token(
        credentials.service_role_key(),
        credentials.jwt_secret(),
        TokenRole::ServiceRole,
    )
    .expect("service token validates");

    assert_eq!(claims.role, TokenRole::ServiceRole);
}

#[rstest]
fn duplicate_ids_are_rejected(context: Harness) {
    create(&context, 5);

    let result = context
        .service
        .create(CreateInstanceRequest::new().with_instance_id(5));

    assert!(matches!(
        result,
        Err(ProvisioningError::DuplicateInstance(existing)) if existing == id(5)
    ));
    assert_eq!(context.registered(), 1);
}

#[rstest]
#[case(0)]
#[case(-3)]
#[case(4_554)]
fn invalid_ids_are_rejected_before_any_write(context: Harness, #[case] raw: i64) {
    let result = context
        .service
        .create(CreateInstanceRequest::new().with_instance_id(raw));

    assert!(matches!(
        result,
        Err(ProvisioningError::Domain(
            InstanceDomainError::InvalidInstanceId { .. }
        ))
    ));
    assert_eq!(context.folder_count(), 0);
    assert_eq!(context.registered(), 0);
}

#[rstest]
fn blank_tags_are_rejected(context: Harness) {
    let result = context
        .service
        .create(CreateInstanceRequest::new().with_tags(["ok", "  "]));

    assert!(matches!(
        result,
        Err(ProvisioningError::Domain(InstanceDomainError::EmptyTag))
    ));
}

#[rstest]
fn blank_names_fall_back_to_defaults(context: Harness) {
    let record = context
        .service
        .create(CreateInstanceRequest::new().with_name("   "))
        .expect("instance creation should succeed");

    assert_eq!(record.name(), "Instance 1");
    assert_eq!(record.folder_path(), Utf8Path::new(BASE_DIR).join("instance1"));
}

#[rstest]
fn existing_folder_fails_and_is_left_alone(context: Harness) {
    let folder = Utf8Path::new(BASE_DIR).join("instance1");
    context
        .workspace
        .seed_folder(&folder)
        .expect("seed folder");

    let result = context.service.create(CreateInstanceRequest::new());

    assert!(matches!(
        result,
        Err(ProvisioningError::Workspace(WorkspaceError::AlreadyExists(_)))
    ));
    assert!(context.workspace.files(&folder).is_some());
    assert_eq!(context.registered(), 0);
}

#[rstest]
fn failed_artifact_write_removes_the_folder(context: Harness) {
    context
        .workspace
        .fail_next_write()
        .expect("arm write failure");

    let result = context.service.create(CreateInstanceRequest::new());

    assert!(matches!(result, Err(ProvisioningError::Workspace(_))));
    assert_eq!(context.folder_count(), 0);
    assert_eq!(context.registered(), 0);
}

#[rstest]
fn failed_registry_save_removes_the_folder(context: Harness) {
    context.store.fail_next_save().expect("arm save failure");

    let result = context.service.create(CreateInstanceRequest::new());

    assert!(matches!(result, Err(ProvisioningError::Registry(_))));
    assert_eq!(context.folder_count(), 0);
    assert_eq!(context.registered(), 0);
}

#[test]
fn entropy_failure_aborts_creation() {
    let context = harness_with(InMemoryRegistryStore::new(), FailingEntropy);

    let result = context.service.create(CreateInstanceRequest::new());

    assert!(matches!(
        result,
        Err(ProvisioningError::CredentialGenerationFailed(
            CredentialError::Entropy(_)
        ))
    ));
    assert_eq!(context.folder_count(), 0);
    assert_eq!(context.registered(), 0);
}

/// Issues credentials whose service-role token was signed with a foreign
/// secret, so the self-check must reject them.
fn forge_service_token(
    entropy: &SeededEntropy,
    issued_at: DateTime<Utc>,
) -> Result<InstanceCredentials, CredentialError> {
    let credentials = InstanceCredentials::generate(entropy, issued_at)?;
    let foreign = mint_tokens(&SigningSecret::generate(entropy)?, issued_at)?;
    Ok(credentials.with_service_role_key(foreign.service_role_key))
}

#[test]
fn credentials_failing_the_self_check_abort_creation() {
    let mut context = harness();
    context.service = context.service.with_credential_issuer(forge_service_token);

    let result = context.service.create(CreateInstanceRequest::new());

    assert!(matches!(
        result,
        Err(ProvisioningError::CredentialGenerationFailed(
            CredentialError::InvalidToken(_)
        ))
    ));
    assert_eq!(context.folder_count(), 0);
    assert_eq!(context.registered(), 0);
}

#[test]
fn stack_template_is_copied_and_its_env_keys_are_overridden() {
    let template = Utf8Path::new("/opt/supabase/docker");
    let context = harness_configured(
        InMemoryRegistryStore::new(),
        SeededEntropy::new(42),
        ProvisioningConfig::new(BASE_DIR).with_stack_template(template),
    );
    context
        .workspace
        .seed_template(
            template,
            [
                ("docker-compose.yml", "services: {}\n"),
                ("volumes/db/roles.sql", "-- roles\n"),
                (
                    ENV_TEMPLATE_FILE_NAME,
                    "# Upstream defaults\nJWT_EXPIRY=3600\nKONG_HTTP_PORT=8000\n",
                ),
                (ENV_FILE_NAME, "STALE=1\n"),
            ],
        )
        .expect("seed template");

    let record = context
        .service
        .create(CreateInstanceRequest::new().with_instance_id(3))
        .expect("instance creation should succeed");

    let files = context
        .workspace
        .files(record.folder_path())
        .expect("instance folder exists");
    assert!(files.contains_key("docker-compose.yml"));
    assert!(files.contains_key("volumes/db/roles.sql"));
    assert!(files.contains_key(OVERRIDE_FILE_NAME));
    let dotenv = files.get(ENV_FILE_NAME).expect("env file written");
    let env = parse_dotenv(dotenv);
    assert!(dotenv.starts_with("# Upstream defaults\n"));
    assert!(!env.contains_key("STALE"));
    assert_eq!(env.get("JWT_EXPIRY").map(String::as_str), Some("3600"));
    assert_eq!(env.get(keys::KONG_HTTP_PORT).map(String::as_str), Some("20030"));
    assert_eq!(
        env.get(keys::POSTGRES_PASSWORD).map(String::as_str),
        Some(record.credentials().postgres_password())
    );
}

#[test]
fn missing_stack_template_leaves_nothing_behind() {
    let context = harness_configured(
        InMemoryRegistryStore::new(),
        SeededEntropy::new(42),
        ProvisioningConfig::new(BASE_DIR).with_stack_template("/opt/missing"),
    );

    let result = context.service.create(CreateInstanceRequest::new());

    assert!(matches!(
        result,
        Err(ProvisioningError::Workspace(WorkspaceError::Io { .. }))
    ));
    assert_eq!(context.folder_count(), 0);
    assert_eq!(context.registered(), 0);
}

#[rstest]
fn update_changes_only_mutable_fields(context: Harness) {
    create(&context, 2);
    let original = context.service.get(id(2)).expect("instance exists");
    let request = UpdateInstanceRequest {
        name: Some("Renamed".to_owned()),
        description: Some("Staging copy".to_owned()),
        tags: Some(vec!["staging".to_owned()]),
    };

    let first = context
        .service
        .update(id(2), request.clone())
        .expect("first update");
    let second = context.service.update(id(2), request).expect("second update");

    assert_eq!(second.name(), "Renamed");
    assert_eq!(second.description(), "Staging copy");
    assert_eq!(second.ports(), original.ports());
    assert_eq!(second.credentials(), original.credentials());
    assert_eq!(second.folder_path(), original.folder_path());
    assert_eq!(second.created_at(), original.created_at());
    assert!(second.updated_at() > first.updated_at());
    assert_eq!(second.tags(), first.tags());
    assert_eq!(second.name(), first.name());
    assert_eq!(second.description(), first.description());
}

#[rstest]
fn update_with_empty_tags_clears_them(context: Harness) {
    context
        .service
        .create(CreateInstanceRequest::new().with_tags(["a", "b"]))
        .expect("instance creation should succeed");

    let updated = context
        .service
        .update(
            id(1),
            UpdateInstanceRequest {
                tags: Some(Vec::new()),
                ..UpdateInstanceRequest::default()
            },
        )
        .expect("update succeeds");

    assert!(updated.tags().is_empty());
}

#[rstest]
#[case("")]
#[case("   ")]
fn update_with_blank_text_restores_defaults(context: Harness, #[case] blank: &str) {
    context
        .service
        .create(
            CreateInstanceRequest::new()
                .with_name("Billing")
                .with_description("Invoices"),
        )
        .expect("instance creation should succeed");

    let updated = context
        .service
        .update(
            id(1),
            UpdateInstanceRequest {
                name: Some(blank.to_owned()),
                description: Some(blank.to_owned()),
                tags: None,
            },
        )
        .expect("update succeeds");

    assert_eq!(updated.name(), "Instance 1");
    assert_eq!(updated.description(), "Supabase instance 1");
}

#[rstest]
fn update_trims_replacement_text(context: Harness) {
    create(&context, 1);

    let updated = context
        .service
        .update(
            id(1),
            UpdateInstanceRequest {
                name: Some("  Renamed  ".to_owned()),
                ..UpdateInstanceRequest::default()
            },
        )
        .expect("update succeeds");

    assert_eq!(updated.name(), "Renamed");
}

#[rstest]
fn update_of_missing_instance_fails(context: Harness) {
    let result = context
        .service
        .update(id(9), UpdateInstanceRequest::default());

    assert!(matches!(
        result,
        Err(ProvisioningError::InstanceNotFound(missing)) if missing == id(9)
    ));
}

#[rstest]
fn delete_without_files_keeps_the_folder(context: Harness) {
    create(&context, 1);
    let folder = context
        .service
        .get(id(1))
        .expect("instance exists")
        .folder_path()
        .to_owned();

    let deleted = context.service.delete(id(1), false).expect("delete succeeds");

    assert!(matches!(deleted.cleanup, FileCleanup::Skipped));
    assert_eq!(context.registered(), 0);
    assert!(context.workspace.files(&folder).is_some());
}

#[rstest]
fn failed_folder_removal_does_not_restore_the_entry(context: Harness) {
    create(&context, 1);
    context
        .workspace
        .fail_next_remove()
        .expect("arm remove failure");

    let deleted = context.service.delete(id(1), true).expect("delete succeeds");

    assert!(matches!(deleted.cleanup, FileCleanup::Failed(_)));
    assert_eq!(context.registered(), 0);
}

#[rstest]
fn delete_of_missing_instance_fails(context: Harness) {
    let result = context.service.delete(id(3), true);

    assert!(matches!(result, Err(ProvisioningError::InstanceNotFound(_))));
}

#[rstest]
fn ports_are_released_and_reused(context: Harness) {
    create(&context, 1);
    let original = context.service.get(id(1)).expect("instance exists");
    create(&context, 2);
    let second = context.service.get(id(2)).expect("instance exists");

    assert_eq!(
        second.ports().lowest(),
        original
            .ports()
            .lowest()
            .map(|port| port + u16::try_from(PORT_STRIDE).expect("stride fits"))
    );

    let deleted = context.service.delete(id(1), true).expect("delete succeeds");
    assert!(matches!(deleted.cleanup, FileCleanup::Removed));
    assert!(!context.workspace.exists(original.folder_path()));
    let remaining: Vec<_> = context
        .service
        .list()
        .expect("list succeeds")
        .iter()
        .map(|record| record.instance_id())
        .collect();
    assert_eq!(remaining, vec![id(2)]);

    create(&context, 1);
    let recreated = context.service.get(id(1)).expect("instance exists");
    assert_eq!(recreated.ports(), original.ports());
    assert_ne!(recreated.credentials(), original.credentials());
}

#[rstest]
fn runtime_operations_track_container_state(context: Harness) {
    create(&context, 1);

    assert_eq!(
        context.service.status(id(1)).expect("status"),
        ContainerStatus::Configured
    );
    context.service.start(id(1)).expect("start");
    assert_eq!(
        context.service.status(id(1)).expect("status"),
        ContainerStatus::Running
    );
    let logs = context
        .service
        .logs(
            id(1),
            &LogRequest {
                service: Some("db".to_owned()),
                tail: 20,
            },
        )
        .expect("logs");
    assert!(logs.contains("supabase-instance1"));
    context.service.stop(id(1)).expect("stop");
    assert_eq!(
        context.service.status(id(1)).expect("status"),
        ContainerStatus::Configured
    );
}

#[rstest]
fn listing_reports_unknown_status_when_runtime_is_unavailable(context: Harness) {
    create(&context, 1);
    create(&context, 2);
    context
        .runtime
        .mark_stopped(id(2))
        .expect("mark stopped");

    let healthy = context.service.listing().expect("listing");
    context
        .runtime
        .set_unavailable(true)
        .expect("disable runtime");
    let degraded = context.service.listing().expect("listing");

    let statuses: Vec<_> = healthy.iter().map(|entry| entry.status).collect();
    assert_eq!(
        statuses,
        vec![ContainerStatus::Configured, ContainerStatus::Stopped]
    );
    assert!(
        degraded
            .iter()
            .all(|entry| entry.status == ContainerStatus::Unknown)
    );
}

#[rstest]
fn connection_info_uses_the_configured_ports(context: Harness) {
    create(&context, 3);

    let info = context.service.connection_info(id(3)).expect("info");

    assert_eq!(info.api_url, "http://localhost:20030");
    assert_eq!(info.ports.get(StackService::Database), Some(20_033));
    assert_eq!(context.service.connection_infos().expect("infos").len(), 1);
}

#[rstest]
fn external_service_template_validates_the_name(context: Harness) {
    create(&context, 1);

    let yaml = context
        .service
        .external_service_template(id(1), "worker")
        .expect("template renders");
    let invalid = context
        .service
        .external_service_template(id(1), "Not Valid");

    assert!(yaml.contains("supabase-instance1-network"));
    assert!(matches!(
        invalid,
        Err(ProvisioningError::Domain(
            InstanceDomainError::InvalidServiceName(_)
        ))
    ));
}

#[rstest]
fn refresh_recreates_lost_files_without_new_secrets(context: Harness) {
    create(&context, 1);
    let record = context.service.get(id(1)).expect("instance exists");
    let before = context
        .workspace
        .files(record.folder_path())
        .expect("folder exists");
    context
        .workspace
        .remove_instance_dir(record.folder_path())
        .expect("remove folder");

    context.service.refresh_artifacts(id(1)).expect("refresh succeeds");

    assert_eq!(context.workspace.files(record.folder_path()), Some(before));
    assert!(context.folder_exists(1));
}

#[test]
fn seeded_services_produce_identical_records() {
    let first = harness_with(InMemoryRegistryStore::new(), SeededEntropy::new(1));
    let second = harness_with(InMemoryRegistryStore::new(), SeededEntropy::new(1));

    let left = first
        .service
        .create(CreateInstanceRequest::new())
        .expect("create");
    let right = second
        .service
        .create(CreateInstanceRequest::new())
        .expect("create");

    assert_eq!(left, right);
}
