//! SQLite adapter behavior against a real database file.

use signet_storage::{
    ArtifactStore, ContractStore, FsArtifactStore, SqliteContractStore, StorageError,
};
use signet_types::{
    ArtifactRef, Contract, ContractId, ContractStatus, FieldGeometry, FieldKind, FieldSpec,
    FieldValue,
};

async fn store(dir: &tempfile::TempDir) -> SqliteContractStore {
    let path = dir.path().join("signet.db");
    let url = format!("sqlite:{}?mode=rwc", path.display());
    SqliteContractStore::connect(&url)
        .await
        .expect("open sqlite store")
}

fn spec(kind: FieldKind) -> FieldSpec {
    FieldSpec {
        kind,
        geometry: FieldGeometry::new(50.0, 50.0, 100.0, 20.0),
    }
}

fn contract() -> Contract {
    Contract::new(ContractId::generate(), ArtifactRef::new("c-original.pdf"))
}

#[tokio::test]
async fn contract_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;

    let record = contract();
    let id = record.id.clone();
    store.create_contract(record.clone()).await.unwrap();

    let loaded = store.get_contract(&id).await.unwrap().expect("stored row");
    assert_eq!(loaded.id, id);
    assert_eq!(loaded.status, ContractStatus::PendingFields);
    assert_eq!(loaded.current_artifact, loaded.original_artifact);
    assert_eq!(loaded.created_at.timestamp_micros(), record.created_at.timestamp_micros());

    assert!(store
        .get_contract(&ContractId::new("missing"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn duplicate_insert_is_a_conflict() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;
    let record = contract();
    store.create_contract(record.clone()).await.unwrap();
    let err = store.create_contract(record).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
}

#[tokio::test]
async fn layout_replacement_renumbers_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;
    let record = contract();
    let id = record.id.clone();
    store.create_contract(record).await.unwrap();

    let first = store
        .replace_fields(
            &id,
            ContractStatus::PendingFields,
            ContractStatus::PendingCompanyInput,
            vec![spec(FieldKind::Text), spec(FieldKind::Seal)],
        )
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    assert!(first[0].id < first[1].id);

    let second = store
        .replace_fields(
            &id,
            ContractStatus::PendingCompanyInput,
            ContractStatus::PendingCompanyInput,
            vec![spec(FieldKind::Text)],
        )
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert!(second[0].id > first[1].id, "replacement renumbers, never reuses");

    let fields = store.fields_for(&id).await.unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].id, second[0].id);
}

#[tokio::test]
async fn stale_cas_rolls_the_transaction_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;
    let record = contract();
    let id = record.id.clone();
    store.create_contract(record).await.unwrap();
    store
        .replace_fields(
            &id,
            ContractStatus::PendingFields,
            ContractStatus::PendingCompanyInput,
            vec![spec(FieldKind::Text)],
        )
        .await
        .unwrap();

    let err = store
        .replace_fields(
            &id,
            ContractStatus::PendingFields,
            ContractStatus::PendingCompanyInput,
            vec![spec(FieldKind::Seal)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    // The failed replacement left the previous layout in place.
    let fields = store.fields_for(&id).await.unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].kind, FieldKind::Text);

    let err = store
        .replace_fields(
            &ContractId::new("missing"),
            ContractStatus::PendingFields,
            ContractStatus::PendingCompanyInput,
            vec![spec(FieldKind::Text)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn render_bind_and_reset_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;
    let record = contract();
    let id = record.id.clone();
    store.create_contract(record).await.unwrap();
    let fields = store
        .replace_fields(
            &id,
            ContractStatus::PendingFields,
            ContractStatus::PendingCompanyInput,
            vec![spec(FieldKind::Text), spec(FieldKind::Seal)],
        )
        .await
        .unwrap();

    store
        .record_render(
            &id,
            ContractStatus::PendingCompanyInput,
            ContractStatus::PendingSignatures,
            ArtifactRef::new("c-company-signed.pdf"),
            vec![
                (fields[0].id, FieldValue::Text("Acme Corp".to_string())),
                (
                    fields[1].id,
                    FieldValue::Image(ArtifactRef::new("c-field-2.png")),
                ),
            ],
        )
        .await
        .unwrap();

    let bound = store.fields_for(&id).await.unwrap();
    assert_eq!(bound[0].value, Some(FieldValue::Text("Acme Corp".to_string())));
    assert_eq!(
        bound[1].value,
        Some(FieldValue::Image(ArtifactRef::new("c-field-2.png")))
    );
    let updated = store.get_contract(&id).await.unwrap().unwrap();
    assert_eq!(updated.current_artifact.as_str(), "c-company-signed.pdf");
    assert_eq!(updated.status, ContractStatus::PendingSignatures);

    store
        .reset_values(
            &id,
            ContractStatus::PendingSignatures,
            ContractStatus::PendingCompanyInput,
        )
        .await
        .unwrap();
    let reset = store.get_contract(&id).await.unwrap().unwrap();
    assert_eq!(reset.current_artifact, reset.original_artifact);
    assert_eq!(reset.status, ContractStatus::PendingCompanyInput);
    for field in store.fields_for(&id).await.unwrap() {
        assert_eq!(field.value, None);
        assert_eq!(field.geometry, FieldGeometry::new(50.0, 50.0, 100.0, 20.0));
    }
}

#[tokio::test]
async fn foreign_field_bind_rolls_back_whole_render() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;
    let record = contract();
    let id = record.id.clone();
    store.create_contract(record).await.unwrap();
    let fields = store
        .replace_fields(
            &id,
            ContractStatus::PendingFields,
            ContractStatus::PendingCompanyInput,
            vec![spec(FieldKind::Text)],
        )
        .await
        .unwrap();

    let err = store
        .record_render(
            &id,
            ContractStatus::PendingCompanyInput,
            ContractStatus::PendingSignatures,
            ArtifactRef::new("c-company-signed.pdf"),
            vec![
                (fields[0].id, FieldValue::Text("kept?".to_string())),
                (signet_types::FieldId(9999), FieldValue::Text("x".to_string())),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvariantViolation(_)));

    // Rollback: neither the pointer, the status, nor the first bind stuck.
    let unchanged = store.get_contract(&id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, ContractStatus::PendingCompanyInput);
    assert_eq!(unchanged.current_artifact, unchanged.original_artifact);
    assert_eq!(store.fields_for(&id).await.unwrap()[0].value, None);
}

#[tokio::test]
async fn list_orders_by_creation_time_descending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;

    let mut older = contract();
    older.created_at -= chrono::Duration::seconds(90);
    let newer = contract();
    let newer_id = newer.id.clone();
    store.create_contract(older).await.unwrap();
    store.create_contract(newer).await.unwrap();

    let listed = store.list_contracts().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, newer_id);
}

#[tokio::test]
async fn fs_artifact_store_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::open(dir.path().join("artifacts"))
        .await
        .unwrap();

    let artifact = store.put("c1-original.pdf", b"document bytes").await.unwrap();
    assert_eq!(store.get(&artifact).await.unwrap(), b"document bytes");

    let err = store.put("nested/name.pdf", b"x").await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidInput(_)));

    let err = store.get(&ArtifactRef::new("absent.pdf")).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}
