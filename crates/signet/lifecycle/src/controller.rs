//! The lifecycle state machine and its transition orchestration.

use crate::error::{LifecycleError, LifecycleResult};
use crate::input::{CompanyInput, SignatureInput};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use signet_compositor::{self as compositor, ImageEncoding, Stamp, StampContent, StampImage};
use signet_notify::{Notification, NotificationDispatcher};
use signet_storage::{ArtifactStore, ContractStore, StorageError};
use signet_types::{
    ArtifactRef, Contract, ContractAction, ContractId, ContractStatus, Field, FieldId, FieldKind,
    FieldSpec, FieldValue, Party,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Fallback extension for uploads whose file name carries none.
const DEFAULT_DOCUMENT_EXT: &str = "pdf";

/// Coordinates every contract lifecycle transition.
///
/// Mutating operations run under that contract's single-flight lock, so a
/// contract has at most one in-flight transition at a time within this
/// process; the store's status compare-and-swap backstops writers that
/// bypass it. Render output is committed in a fixed order: render fully in
/// memory, write the new blob, then commit the relational transaction. The
/// current-artifact pointer only ever moves inside that transaction, so a
/// failure at any point leaves no partially applied transition observable.
pub struct LifecycleController {
    contracts: Arc<dyn ContractStore>,
    artifacts: Arc<dyn ArtifactStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    public_base_url: String,
    locks: Mutex<HashMap<ContractId, Arc<AsyncMutex<()>>>>,
}

impl LifecycleController {
    pub fn new(
        contracts: Arc<dyn ContractStore>,
        artifacts: Arc<dyn ArtifactStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            contracts,
            artifacts,
            notifier,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// One contract plus its fields in insertion order.
    pub async fn get_contract(&self, id: &ContractId) -> LifecycleResult<(Contract, Vec<Field>)> {
        let contract = self.load(id).await?;
        let fields = self.contracts.fields_for(id).await?;
        Ok((contract, fields))
    }

    /// All contracts, newest first.
    pub async fn list_contracts(&self) -> LifecycleResult<Vec<Contract>> {
        Ok(self.contracts.list_contracts().await?)
    }

    /// Name and bytes of the contract's current document.
    pub async fn current_document(
        &self,
        id: &ContractId,
    ) -> LifecycleResult<(ArtifactRef, Vec<u8>)> {
        let contract = self.load(id).await?;
        let bytes = self.artifacts.get(&contract.current_artifact).await?;
        Ok((contract.current_artifact, bytes))
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Create a contract from an uploaded document. The current artifact
    /// starts at the original.
    pub async fn create_contract(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> LifecycleResult<Contract> {
        if bytes.is_empty() {
            return Err(LifecycleError::Validation("no document uploaded".to_string()));
        }
        let id = ContractId::generate();
        let ext = document_extension(file_name);
        let original = self
            .artifacts
            .put(&format!("{id}-original.{ext}"), &bytes)
            .await?;
        let contract = Contract::new(id, original);
        self.contracts.create_contract(contract.clone()).await?;
        tracing::info!(contract = %contract.id, "contract created");
        Ok(contract)
    }

    /// Replace the contract's field layout. Allowed while the contract is
    /// waiting for fields or for company input; field identities do not
    /// survive a resubmission.
    pub async fn save_field_layout(
        &self,
        id: &ContractId,
        layout: Vec<FieldSpec>,
    ) -> LifecycleResult<Vec<Field>> {
        if layout.is_empty() {
            return Err(LifecycleError::Validation("field layout is empty".to_string()));
        }
        for (index, spec) in layout.iter().enumerate() {
            if !spec.geometry.is_well_formed() {
                return Err(LifecycleError::Validation(format!(
                    "field {index} has malformed geometry"
                )));
            }
        }
        for kind in [FieldKind::StudentSignature, FieldKind::ParentSignature] {
            if layout.iter().filter(|spec| spec.kind == kind).count() > 1 {
                return Err(LifecycleError::Validation(format!(
                    "layout declares more than one {kind} field"
                )));
            }
        }

        let token = self.lock_for(id)?;
        let _guard = token.lock().await;

        let contract = self.load(id).await?;
        if !matches!(
            contract.status,
            ContractStatus::PendingFields | ContractStatus::PendingCompanyInput
        ) {
            return Err(LifecycleError::InvalidTransition(format!(
                "field layout cannot be replaced while status is {}",
                contract.status
            )));
        }
        let fields = self
            .contracts
            .replace_fields(
                id,
                contract.status,
                ContractStatus::PendingCompanyInput,
                layout,
            )
            .await?;
        tracing::info!(contract = %id, fields = fields.len(), "field layout saved");
        self.notify(id, Party::Company, self.link(id, "fill"));
        Ok(fields)
    }

    /// Render the company's text and seal content onto the current document
    /// and bind the submitted values.
    ///
    /// Submissions referencing unknown field ids, kinds outside this step,
    /// or fields without a matching payload entry are dropped silently:
    /// layouts may be filled incrementally, and callers cannot reach fields
    /// the step does not own.
    pub async fn submit_company_input(
        &self,
        id: &ContractId,
        input: CompanyInput,
    ) -> LifecycleResult<Contract> {
        let token = self.lock_for(id)?;
        let _guard = token.lock().await;

        let contract = self.load(id).await?;
        if contract.status != ContractStatus::PendingCompanyInput {
            return Err(LifecycleError::InvalidTransition(format!(
                "company input is not accepted while status is {}",
                contract.status
            )));
        }
        let fields = self.contracts.fields_for(id).await?;

        let mut stamps = Vec::new();
        let mut values: Vec<(FieldId, FieldValue)> = Vec::new();
        let mut uploads: Vec<(String, Vec<u8>)> = Vec::new();
        for field in &fields {
            // The signing step owns the other kinds; values aimed at them
            // through this channel are dropped.
            if !field.kind.in_company_step() {
                continue;
            }
            match field.kind {
                FieldKind::Text => {
                    let Some(text) = input.texts.get(&field.id) else { continue };
                    if text.is_empty() {
                        continue;
                    }
                    stamps.push(Stamp {
                        geometry: field.geometry,
                        content: StampContent::Text(text.clone()),
                    });
                    values.push((field.id, FieldValue::Text(text.clone())));
                }
                FieldKind::Seal => {
                    let Some(upload) = input.images.iter().find(|u| u.field_id == field.id) else {
                        continue;
                    };
                    let encoding = ImageEncoding::from_mime(&upload.mime).ok_or_else(|| {
                        LifecycleError::Validation(format!(
                            "field {} upload has unsupported type '{}'",
                            field.id, upload.mime
                        ))
                    })?;
                    let name = format!("{id}-field-{}.{}", field.id, encoding.extension());
                    stamps.push(Stamp {
                        geometry: field.geometry,
                        content: StampContent::Image(StampImage {
                            bytes: upload.bytes.clone(),
                            encoding,
                        }),
                    });
                    values.push((field.id, FieldValue::Image(ArtifactRef::new(name.clone()))));
                    uploads.push((name, upload.bytes.clone()));
                }
                FieldKind::StudentSignature | FieldKind::ParentSignature => {}
            }
        }

        let base = self.artifacts.get(&contract.current_artifact).await?;
        let rendered = compositor::render(&base, &stamps)?;

        for (name, bytes) in &uploads {
            self.artifacts.put(name, bytes).await?;
        }
        let ext = contract
            .current_artifact
            .extension()
            .unwrap_or(DEFAULT_DOCUMENT_EXT);
        let next = self
            .artifacts
            .put(&format!("{id}-company-signed.{ext}"), &rendered)
            .await?;

        self.contracts
            .record_render(
                id,
                ContractStatus::PendingCompanyInput,
                ContractStatus::PendingSignatures,
                next,
                values,
            )
            .await?;
        tracing::info!(contract = %id, stamps = stamps.len(), "company input recorded");
        self.notify(id, Party::Signers, self.link(id, "sign"));
        self.load(id).await
    }

    /// Stamp both signer images and complete the document.
    ///
    /// Both images must be present and decodable; a signature field missing
    /// from the layout skips that half without failing the call.
    pub async fn submit_signatures(
        &self,
        id: &ContractId,
        input: SignatureInput,
    ) -> LifecycleResult<Contract> {
        let student = decode_signature(input.student_png_base64.as_deref(), "student")?;
        let parent = decode_signature(input.parent_png_base64.as_deref(), "parent")?;

        let token = self.lock_for(id)?;
        let _guard = token.lock().await;

        let contract = self.load(id).await?;
        if contract.status != ContractStatus::PendingSignatures {
            return Err(LifecycleError::InvalidTransition(format!(
                "signatures are not accepted while status is {}",
                contract.status
            )));
        }
        let fields = self.contracts.fields_for(id).await?;

        let mut stamps = Vec::new();
        let mut values = Vec::new();
        let mut uploads = Vec::new();
        for (kind, role, bytes) in [
            (FieldKind::StudentSignature, "student", student),
            (FieldKind::ParentSignature, "parent", parent),
        ] {
            let name = format!("{id}-{role}-signature.png");
            uploads.push((name.clone(), bytes.clone()));
            if let Some(field) = fields.iter().find(|field| field.kind == kind) {
                stamps.push(Stamp {
                    geometry: field.geometry,
                    content: StampContent::Image(StampImage {
                        bytes,
                        encoding: ImageEncoding::Png,
                    }),
                });
                values.push((field.id, FieldValue::Image(ArtifactRef::new(name))));
            }
        }

        let base = self.artifacts.get(&contract.current_artifact).await?;
        let rendered = compositor::render(&base, &stamps)?;

        for (name, bytes) in &uploads {
            self.artifacts.put(name, bytes).await?;
        }
        let ext = contract
            .current_artifact
            .extension()
            .unwrap_or(DEFAULT_DOCUMENT_EXT);
        let final_artifact = self
            .artifacts
            .put(&format!("{id}-final.{ext}"), &rendered)
            .await?;

        self.contracts
            .record_render(
                id,
                ContractStatus::PendingSignatures,
                ContractStatus::Completed,
                final_artifact,
                values,
            )
            .await?;
        tracing::info!(contract = %id, "signatures recorded, contract completed");
        self.notify(id, Party::Reviewer, self.link(id, "review"));
        self.load(id).await
    }

    /// Reviewer decision. Approve is terminal; reject resets the document
    /// and every bound value, then reopens the company-input step.
    pub async fn apply_action(&self, id: &ContractId, action: &str) -> LifecycleResult<Contract> {
        let parsed = ContractAction::parse(action).ok_or_else(|| {
            LifecycleError::InvalidTransition(format!("unknown action '{action}'"))
        })?;

        let token = self.lock_for(id)?;
        let _guard = token.lock().await;

        let contract = self.load(id).await?;
        if contract.status.is_terminal() {
            return Err(LifecycleError::InvalidTransition(format!(
                "contract is {} and accepts no further actions",
                contract.status
            )));
        }

        match parsed {
            ContractAction::Approve => {
                self.contracts
                    .transition_status(id, contract.status, ContractStatus::Approved)
                    .await?;
                tracing::info!(contract = %id, "contract approved");
            }
            ContractAction::Reject => {
                self.contracts
                    .reset_values(id, contract.status, ContractStatus::PendingCompanyInput)
                    .await?;
                tracing::info!(contract = %id, "contract rejected, company input reopened");
                self.notify(id, Party::Company, self.link(id, "fill"));
            }
        }
        self.load(id).await
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn load(&self, id: &ContractId) -> LifecycleResult<Contract> {
        self.contracts
            .get_contract(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    /// The single-flight token for one contract.
    fn lock_for(&self, id: &ContractId) -> LifecycleResult<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StorageError::Backend("contract lock registry poisoned".to_string()))?;
        Ok(locks.entry(id.clone()).or_default().clone())
    }

    /// Post-commit notification on a spawned task, decoupled from the
    /// request path. Failures are logged, never surfaced to the caller.
    fn notify(&self, id: &ContractId, party: Party, link: String) {
        let notifier = Arc::clone(&self.notifier);
        let notification = Notification {
            contract_id: id.clone(),
            party,
            link,
        };
        tokio::spawn(async move {
            if let Err(err) = notifier.dispatch(notification.clone()).await {
                tracing::warn!(
                    contract = %notification.contract_id,
                    party = ?notification.party,
                    error = %err,
                    "notification dispatch failed"
                );
            }
        });
    }

    fn link(&self, id: &ContractId, step: &str) -> String {
        format!("{}/contracts/{}/{}", self.public_base_url, id, step)
    }
}

/// Strip an optional data-URL prefix and decode the signature payload.
fn decode_signature(encoded: Option<&str>, role: &str) -> LifecycleResult<Vec<u8>> {
    let encoded = encoded
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LifecycleError::Validation(format!("missing {role} signature data")))?;
    let payload = encoded
        .rsplit_once("base64,")
        .map_or(encoded, |(_, data)| data);
    BASE64.decode(payload).map_err(|e| {
        LifecycleError::Validation(format!("{role} signature is not valid base64: {e}"))
    })
}

/// Extension drawn from the uploaded file name; anything but short plain
/// alphanumerics falls back to the default.
fn document_extension(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| DEFAULT_DOCUMENT_EXT.to_string())
}
