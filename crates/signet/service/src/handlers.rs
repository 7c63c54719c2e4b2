//! REST handlers for the contract workflow.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use signet_lifecycle::{CompanyInput, ImageUpload, SignatureInput};
use signet_types::{Contract, ContractId, Field, FieldGeometry, FieldId, FieldKind, FieldSpec};

// ── Health ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ── Contracts ────────────────────────────────────────────────────────

/// Contract plus its fields in insertion order.
#[derive(Debug, Serialize)]
pub struct ContractResponse {
    #[serde(flatten)]
    pub contract: Contract,
    pub fields: Vec<Field>,
}

/// Upload a contract document and open the workflow. Multipart, with the
/// document under a `file` part.
pub async fn create_contract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Contract>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(part) = multipart.next_field().await.map_err(bad_request)? {
        if part.name() == Some("file") {
            let file_name = part.file_name().unwrap_or("document.pdf").to_string();
            let bytes = part.bytes().await.map_err(bad_request)?;
            file = Some((file_name, bytes.to_vec()));
        }
    }
    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("missing 'file' part".to_string()))?;
    let contract = state.controller.create_contract(&file_name, bytes).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

/// All contracts, newest first.
pub async fn list_contracts(State(state): State<AppState>) -> ApiResult<Json<Vec<Contract>>> {
    Ok(Json(state.controller.list_contracts().await?))
}

pub async fn get_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ContractResponse>> {
    let id = ContractId::new(id);
    let (contract, fields) = state.controller.get_contract(&id).await?;
    Ok(Json(ContractResponse { contract, fields }))
}

/// Serve the contract's current rendered document.
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = ContractId::new(id);
    let (artifact, bytes) = state.controller.current_document(&id).await?;
    let disposition = format!("inline; filename=\"{artifact}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// ── Field layout ─────────────────────────────────────────────────────

/// One row of a submitted layout.
#[derive(Debug, Deserialize)]
pub struct FieldSpecRequest {
    pub kind: FieldKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
pub struct FieldLayoutRequest {
    pub fields: Vec<FieldSpecRequest>,
}

#[derive(Debug, Serialize)]
pub struct FieldLayoutResponse {
    pub fields: Vec<Field>,
}

/// Replace the contract's placeholder layout.
pub async fn save_field_layout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<FieldLayoutRequest>,
) -> ApiResult<Json<FieldLayoutResponse>> {
    let id = ContractId::new(id);
    let layout = request
        .fields
        .into_iter()
        .map(|f| FieldSpec {
            kind: f.kind,
            geometry: FieldGeometry::new(f.x, f.y, f.width, f.height),
        })
        .collect();
    let fields = state.controller.save_field_layout(&id, layout).await?;
    Ok(Json(FieldLayoutResponse { fields }))
}

// ── Company input ────────────────────────────────────────────────────

/// Multipart part names: `text-{fieldId}` for text values, `image-{fieldId}`
/// for uploaded images.
pub async fn submit_company_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<Contract>> {
    let id = ContractId::new(id);
    let mut input = CompanyInput::default();
    while let Some(part) = multipart.next_field().await.map_err(bad_request)? {
        let Some(name) = part.name().map(str::to_string) else {
            continue;
        };
        if let Some(field_id) = part_field_id(&name, "text-") {
            let text = part.text().await.map_err(bad_request)?;
            input.texts.insert(field_id, text);
        } else if let Some(field_id) = part_field_id(&name, "image-") {
            let mime = part
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = part.bytes().await.map_err(bad_request)?;
            input.images.push(ImageUpload {
                field_id,
                mime,
                bytes: bytes.to_vec(),
            });
        }
        // Unrecognized parts are dropped, matching the binding rules.
    }
    Ok(Json(state.controller.submit_company_input(&id, input).await?))
}

// ── Signatures ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignatureRequest {
    pub student_signature: Option<String>,
    pub parent_signature: Option<String>,
}

/// Submit both signer images as base64 PNG payloads.
pub async fn submit_signatures(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SignatureRequest>,
) -> ApiResult<Json<Contract>> {
    let id = ContractId::new(id);
    let input = SignatureInput {
        student_png_base64: request.student_signature,
        parent_png_base64: request.parent_signature,
    };
    Ok(Json(state.controller.submit_signatures(&id, input).await?))
}

// ── Reviewer action ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
}

/// Reviewer decision: approve or reject.
pub async fn contract_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<Json<Contract>> {
    let id = ContractId::new(id);
    Ok(Json(state.controller.apply_action(&id, &request.action).await?))
}

// ── Helpers ──────────────────────────────────────────────────────────

fn part_field_id(name: &str, prefix: &str) -> Option<FieldId> {
    name.strip_prefix(prefix)?.parse::<i64>().ok().map(FieldId)
}

fn bad_request<E: std::fmt::Display>(err: E) -> ApiError {
    ApiError::BadRequest(err.to_string())
}
