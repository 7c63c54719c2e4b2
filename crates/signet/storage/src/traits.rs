use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use signet_types::{
    ArtifactRef, Contract, ContractId, ContractStatus, Field, FieldId, FieldKind, FieldSpec,
    FieldValue,
};

/// Durable record of contracts and their fields.
///
/// Every multi-row transition executes as one transaction, and every status
/// move is a compare-and-swap against the status the caller read: a lost
/// race surfaces as [`StorageError::Conflict`], never as a partially
/// applied transition.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Insert a freshly created contract.
    async fn create_contract(&self, contract: Contract) -> StorageResult<()>;

    /// Get one contract by id.
    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>>;

    /// List contracts newest-first.
    async fn list_contracts(&self) -> StorageResult<Vec<Contract>>;

    /// Fields of a contract in insertion order.
    async fn fields_for(&self, id: &ContractId) -> StorageResult<Vec<Field>>;

    /// Replace the whole field set and advance status in one transaction.
    ///
    /// Layouts declaring more than one field of a signature kind are
    /// rejected at write time.
    async fn replace_fields(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        layout: Vec<FieldSpec>,
    ) -> StorageResult<Vec<Field>>;

    /// Record a finished render: bind submitted values, swap the current
    /// artifact pointer, advance status. One transaction.
    async fn record_render(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        current: ArtifactRef,
        values: Vec<(FieldId, FieldValue)>,
    ) -> StorageResult<()>;

    /// Move status without touching fields or artifacts.
    async fn transition_status(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
    ) -> StorageResult<()>;

    /// Rejection reset: point the current artifact back at the original,
    /// clear every field value, move status. Kind and geometry are kept.
    async fn reset_values(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
    ) -> StorageResult<()>;
}

/// Content-addressable blob storage for documents and images, keyed by
/// generated names.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes under `name` and return the reference.
    async fn put(&self, name: &str, bytes: &[u8]) -> StorageResult<ArtifactRef>;

    /// Read an artifact back. `NotFound` when the name resolves to nothing.
    async fn get(&self, artifact: &ArtifactRef) -> StorageResult<Vec<u8>>;
}

/// Artifact names are generated, but adapters still refuse anything that
/// could escape the store's namespace.
pub(crate) fn check_artifact_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(StorageError::InvalidInput(format!(
            "artifact name '{name}' is not a plain file name"
        )));
    }
    Ok(())
}

/// At most one field per signature kind, enforced when the layout is
/// written so retrieval order never decides which signature lands.
pub(crate) fn check_signature_uniqueness(layout: &[FieldSpec]) -> StorageResult<()> {
    for kind in [FieldKind::StudentSignature, FieldKind::ParentSignature] {
        if layout.iter().filter(|spec| spec.kind == kind).count() > 1 {
            return Err(StorageError::InvariantViolation(format!(
                "layout declares more than one {kind} field"
            )));
        }
    }
    Ok(())
}
