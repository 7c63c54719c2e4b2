//! In-memory reference adapters.
//!
//! Deterministic and test-friendly. Production deployments use the SQLite
//! and filesystem adapters for source-of-truth data.

use crate::traits::{check_artifact_name, check_signature_uniqueness, ArtifactStore, ContractStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use signet_types::{
    ArtifactRef, Contract, ContractId, ContractStatus, Field, FieldId, FieldSpec, FieldValue,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    contracts: HashMap<ContractId, Contract>,
    fields: BTreeMap<FieldId, Field>,
    next_field_id: i64,
}

/// In-memory contract store.
#[derive(Default)]
pub struct InMemoryContractStore {
    tables: RwLock<Tables>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::Backend("contract tables lock poisoned".to_string()))
    }

    fn read_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StorageError::Backend("contract tables lock poisoned".to_string()))?;
        Ok(tables.contracts.get(id).cloned())
    }
}

fn stale(id: &ContractId, expected_from: ContractStatus, found: ContractStatus) -> StorageError {
    StorageError::Conflict(format!(
        "contract {id} moved: expected status {expected_from}, found {found}"
    ))
}

fn missing(id: &ContractId) -> StorageError {
    StorageError::NotFound(format!("contract {id} not found"))
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn create_contract(&self, contract: Contract) -> StorageResult<()> {
        let mut tables = self.write()?;
        if tables.contracts.contains_key(&contract.id) {
            return Err(StorageError::Conflict(format!(
                "contract {} already exists",
                contract.id
            )));
        }
        tables.contracts.insert(contract.id.clone(), contract);
        Ok(())
    }

    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>> {
        self.read_contract(id)
    }

    async fn list_contracts(&self) -> StorageResult<Vec<Contract>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StorageError::Backend("contract tables lock poisoned".to_string()))?;
        let mut contracts: Vec<_> = tables.contracts.values().cloned().collect();
        contracts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(contracts)
    }

    async fn fields_for(&self, id: &ContractId) -> StorageResult<Vec<Field>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StorageError::Backend("contract tables lock poisoned".to_string()))?;
        Ok(tables
            .fields
            .values()
            .filter(|field| field.contract_id == *id)
            .cloned()
            .collect())
    }

    async fn replace_fields(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        layout: Vec<FieldSpec>,
    ) -> StorageResult<Vec<Field>> {
        check_signature_uniqueness(&layout)?;
        let mut tables = self.write()?;
        let status = tables
            .contracts
            .get(id)
            .ok_or_else(|| missing(id))?
            .status;
        if status != expected_from {
            return Err(stale(id, expected_from, status));
        }

        tables.fields.retain(|_, field| field.contract_id != *id);
        let mut inserted = Vec::with_capacity(layout.len());
        for spec in layout {
            tables.next_field_id += 1;
            let field = Field {
                id: FieldId(tables.next_field_id),
                contract_id: id.clone(),
                kind: spec.kind,
                geometry: spec.geometry,
                value: None,
            };
            tables.fields.insert(field.id, field.clone());
            inserted.push(field);
        }
        if let Some(contract) = tables.contracts.get_mut(id) {
            contract.status = to;
        }
        Ok(inserted)
    }

    async fn record_render(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        current: ArtifactRef,
        values: Vec<(FieldId, FieldValue)>,
    ) -> StorageResult<()> {
        let mut tables = self.write()?;
        let status = tables
            .contracts
            .get(id)
            .ok_or_else(|| missing(id))?
            .status;
        if status != expected_from {
            return Err(stale(id, expected_from, status));
        }
        // Validate before applying so a bad id leaves nothing half-bound.
        for (field_id, _) in &values {
            let owned = tables
                .fields
                .get(field_id)
                .is_some_and(|field| field.contract_id == *id);
            if !owned {
                return Err(StorageError::InvariantViolation(format!(
                    "field {field_id} does not belong to contract {id}"
                )));
            }
        }
        for (field_id, value) in values {
            if let Some(field) = tables.fields.get_mut(&field_id) {
                field.value = Some(value);
            }
        }
        if let Some(contract) = tables.contracts.get_mut(id) {
            contract.current_artifact = current;
            contract.status = to;
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
    ) -> StorageResult<()> {
        let mut tables = self.write()?;
        let contract = tables.contracts.get_mut(id).ok_or_else(|| missing(id))?;
        if contract.status != expected_from {
            return Err(stale(id, expected_from, contract.status));
        }
        contract.status = to;
        Ok(())
    }

    async fn reset_values(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
    ) -> StorageResult<()> {
        let mut tables = self.write()?;
        let contract = tables.contracts.get_mut(id).ok_or_else(|| missing(id))?;
        if contract.status != expected_from {
            return Err(stale(id, expected_from, contract.status));
        }
        contract.current_artifact = contract.original_artifact.clone();
        contract.status = to;
        for field in tables.fields.values_mut() {
            if field.contract_id == *id {
                field.value = None;
            }
        }
        Ok(())
    }
}

/// In-memory artifact store.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> StorageResult<ArtifactRef> {
        check_artifact_name(name)?;
        self.blobs
            .write()
            .map_err(|_| StorageError::Backend("artifact table lock poisoned".to_string()))?
            .insert(name.to_string(), bytes.to_vec());
        Ok(ArtifactRef::new(name))
    }

    async fn get(&self, artifact: &ArtifactRef) -> StorageResult<Vec<u8>> {
        self.blobs
            .read()
            .map_err(|_| StorageError::Backend("artifact table lock poisoned".to_string()))?
            .get(artifact.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("artifact '{artifact}' does not exist")))
    }
}
