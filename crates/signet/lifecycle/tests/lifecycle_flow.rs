//! End-to-end lifecycle behavior over the in-memory adapters and the real
//! compositor.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lopdf::{dictionary, Document, Object, Stream};
use signet_lifecycle::{
    CompanyInput, ImageUpload, LifecycleController, LifecycleError, SignatureInput,
};
use signet_notify::{Notification, RecordingDispatcher};
use signet_storage::{ArtifactStore, InMemoryArtifactStore, InMemoryContractStore};
use signet_types::{
    ArtifactRef, ContractId, ContractStatus, FieldGeometry, FieldId, FieldKind, FieldSpec,
    FieldValue, Party,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

const BASE_URL: &str = "https://sign.example.test";

struct Harness {
    controller: LifecycleController,
    artifacts: Arc<InMemoryArtifactStore>,
    notifier: Arc<RecordingDispatcher>,
}

fn harness() -> Harness {
    let contracts = Arc::new(InMemoryContractStore::new());
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let notifier = Arc::new(RecordingDispatcher::new());
    let controller = LifecycleController::new(
        contracts,
        artifacts.clone(),
        notifier.clone(),
        BASE_URL,
    );
    Harness {
        controller,
        artifacts,
        notifier,
    }
}

/// Minimal one-page document, 612 x 800 page units.
fn base_document() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "Contents" => Object::Reference(content_id),
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(800),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialize test document");
    out
}

fn png_bytes() -> Vec<u8> {
    let img = image::ImageBuffer::from_pixel(3, 3, image::Rgba([20u8, 20, 20, 255]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageOutputFormat::Png)
        .expect("encode test png");
    out
}

fn png_base64() -> String {
    BASE64.encode(png_bytes())
}

fn text_field(x: f64, y: f64, width: f64, height: f64) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Text,
        geometry: FieldGeometry::new(x, y, width, height),
    }
}

fn field_of(kind: FieldKind) -> FieldSpec {
    FieldSpec {
        kind,
        geometry: FieldGeometry::new(40.0, 600.0, 120.0, 40.0),
    }
}

/// The dispatch task runs off the request path; give it a few polls.
async fn wait_for_notifications(notifier: &RecordingDispatcher, expect: usize) -> Vec<Notification> {
    for _ in 0..100 {
        if notifier.sent().len() >= expect {
            break;
        }
        tokio::task::yield_now().await;
    }
    notifier.sent()
}

fn page_text(rendered: &[u8]) -> String {
    let doc = Document::load_mem(rendered).expect("reload rendered document");
    let page_id = *doc.get_pages().get(&1).expect("page 1");
    let content = doc.get_page_content(page_id).expect("page content");
    String::from_utf8_lossy(&content).into_owned()
}

#[tokio::test]
async fn create_points_current_at_original() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();

    assert_eq!(contract.status, ContractStatus::PendingFields);
    assert_eq!(contract.current_artifact, contract.original_artifact);
    assert_eq!(
        contract.original_artifact.as_str(),
        format!("{}-original.pdf", contract.id)
    );
    assert!(h.artifacts.get(&contract.original_artifact).await.is_ok());
}

#[tokio::test]
async fn empty_upload_is_rejected_without_state() {
    let h = harness();
    let err = h
        .controller
        .create_contract("agreement.pdf", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
    assert!(h.controller.list_contracts().await.unwrap().is_empty());
}

#[tokio::test]
async fn layout_saves_n_fields_and_replaces_on_resubmit() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();

    let first = h
        .controller
        .save_field_layout(
            &contract.id,
            vec![text_field(50.0, 50.0, 100.0, 20.0), field_of(FieldKind::Seal)],
        )
        .await
        .unwrap();
    assert_eq!(first.len(), 2);

    let (reloaded, fields) = h.controller.get_contract(&contract.id).await.unwrap();
    assert_eq!(reloaded.status, ContractStatus::PendingCompanyInput);
    assert_eq!(fields.len(), 2);

    // Resubmission replaces, never appends, and renumbers.
    let second = h
        .controller
        .save_field_layout(&contract.id, vec![text_field(10.0, 10.0, 50.0, 15.0)])
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert!(second[0].id > first[1].id);
    let (_, fields) = h.controller.get_contract(&contract.id).await.unwrap();
    assert_eq!(fields.len(), 1);

    let sent = wait_for_notifications(&h.notifier, 2).await;
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.party == Party::Company));
    assert_eq!(
        sent[0].link,
        format!("{BASE_URL}/contracts/{}/fill", contract.id)
    );
}

#[tokio::test]
async fn empty_layout_is_invalid() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let err = h
        .controller
        .save_field_layout(&contract.id, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
}

#[tokio::test]
async fn duplicate_signature_kind_layout_is_invalid() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let err = h
        .controller
        .save_field_layout(
            &contract.id,
            vec![
                field_of(FieldKind::ParentSignature),
                field_of(FieldKind::ParentSignature),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
}

#[tokio::test]
async fn company_input_renders_binds_and_advances() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let fields = h
        .controller
        .save_field_layout(&contract.id, vec![text_field(50.0, 50.0, 100.0, 20.0)])
        .await
        .unwrap();

    let mut texts = HashMap::new();
    texts.insert(fields[0].id, "Acme Corp".to_string());
    let updated = h
        .controller
        .submit_company_input(
            &contract.id,
            CompanyInput {
                texts,
                images: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, ContractStatus::PendingSignatures);
    assert_eq!(
        updated.current_artifact.as_str(),
        format!("{}-company-signed.pdf", contract.id)
    );

    let rendered = h.artifacts.get(&updated.current_artifact).await.unwrap();
    let content = page_text(&rendered);
    // 800 - 50 - 20 = 730
    assert!(content.contains("50 730 Td"), "content was: {content}");
    assert!(content.contains("(Acme Corp) Tj"));

    let (_, fields) = h.controller.get_contract(&contract.id).await.unwrap();
    assert_eq!(
        fields[0].value,
        Some(FieldValue::Text("Acme Corp".to_string()))
    );

    let sent = wait_for_notifications(&h.notifier, 2).await;
    assert_eq!(sent.last().unwrap().party, Party::Signers);
    assert_eq!(
        sent.last().unwrap().link,
        format!("{BASE_URL}/contracts/{}/sign", contract.id)
    );
}

#[tokio::test]
async fn company_input_stores_seal_artifacts() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let fields = h
        .controller
        .save_field_layout(&contract.id, vec![field_of(FieldKind::Seal)])
        .await
        .unwrap();

    let updated = h
        .controller
        .submit_company_input(
            &contract.id,
            CompanyInput {
                texts: HashMap::new(),
                images: vec![ImageUpload {
                    field_id: fields[0].id,
                    mime: "image/png".to_string(),
                    bytes: png_bytes(),
                }],
            },
        )
        .await
        .unwrap();

    let expected_name = format!("{}-field-{}.png", contract.id, fields[0].id);
    let (_, fields) = h.controller.get_contract(&contract.id).await.unwrap();
    assert_eq!(
        fields[0].value,
        Some(FieldValue::Image(ArtifactRef::new(expected_name.clone())))
    );
    assert!(h
        .artifacts
        .get(&ArtifactRef::new(expected_name))
        .await
        .is_ok());
    assert!(page_text(&h.artifacts.get(&updated.current_artifact).await.unwrap()).contains("Do"));
}

#[tokio::test]
async fn company_input_ignores_unknown_and_out_of_step_submissions() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let fields = h
        .controller
        .save_field_layout(
            &contract.id,
            vec![
                text_field(50.0, 50.0, 100.0, 20.0),
                field_of(FieldKind::StudentSignature),
            ],
        )
        .await
        .unwrap();

    // Unknown id plus a value aimed at a signature field: both dropped.
    let mut texts = HashMap::new();
    texts.insert(FieldId(9999), "ghost".to_string());
    texts.insert(fields[1].id, "not yours".to_string());
    let updated = h
        .controller
        .submit_company_input(
            &contract.id,
            CompanyInput {
                texts,
                images: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, ContractStatus::PendingSignatures);
    let (_, fields) = h.controller.get_contract(&contract.id).await.unwrap();
    assert!(fields.iter().all(|f| f.value.is_none()));
}

#[tokio::test]
async fn company_input_requires_the_right_status() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let err = h
        .controller
        .submit_company_input(&contract.id, CompanyInput::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition(_)));
}

#[tokio::test]
async fn render_failure_mutates_nothing() {
    let h = harness();
    // Upload is only checked for presence; the broken document surfaces at
    // the first render.
    let contract = h
        .controller
        .create_contract("broken.pdf", b"not a document at all".to_vec())
        .await
        .unwrap();
    h.controller
        .save_field_layout(&contract.id, vec![text_field(10.0, 10.0, 40.0, 12.0)])
        .await
        .unwrap();

    let err = h
        .controller
        .submit_company_input(&contract.id, CompanyInput::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Render(_)));

    let (unchanged, _) = h.controller.get_contract(&contract.id).await.unwrap();
    assert_eq!(unchanged.status, ContractStatus::PendingCompanyInput);
    assert_eq!(unchanged.current_artifact, unchanged.original_artifact);
}

#[tokio::test]
async fn signatures_complete_the_contract() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    h.controller
        .save_field_layout(
            &contract.id,
            vec![
                field_of(FieldKind::StudentSignature),
                FieldSpec {
                    kind: FieldKind::ParentSignature,
                    geometry: FieldGeometry::new(300.0, 600.0, 120.0, 40.0),
                },
            ],
        )
        .await
        .unwrap();
    h.controller
        .submit_company_input(&contract.id, CompanyInput::default())
        .await
        .unwrap();

    let updated = h
        .controller
        .submit_signatures(
            &contract.id,
            SignatureInput {
                student_png_base64: Some(png_base64()),
                parent_png_base64: Some(format!("data:image/png;base64,{}", png_base64())),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, ContractStatus::Completed);
    assert_eq!(
        updated.current_artifact.as_str(),
        format!("{}-final.pdf", contract.id)
    );

    let (_, fields) = h.controller.get_contract(&contract.id).await.unwrap();
    let student_name = format!("{}-student-signature.png", contract.id);
    let parent_name = format!("{}-parent-signature.png", contract.id);
    assert_eq!(
        fields[0].value,
        Some(FieldValue::Image(ArtifactRef::new(student_name.clone())))
    );
    assert_eq!(
        fields[1].value,
        Some(FieldValue::Image(ArtifactRef::new(parent_name.clone())))
    );
    assert!(h.artifacts.get(&ArtifactRef::new(student_name)).await.is_ok());
    assert!(h.artifacts.get(&ArtifactRef::new(parent_name)).await.is_ok());

    let sent = wait_for_notifications(&h.notifier, 3).await;
    assert_eq!(sent.last().unwrap().party, Party::Reviewer);
}

#[tokio::test]
async fn missing_student_field_still_lands_the_parent_half() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    h.controller
        .save_field_layout(&contract.id, vec![field_of(FieldKind::ParentSignature)])
        .await
        .unwrap();
    h.controller
        .submit_company_input(&contract.id, CompanyInput::default())
        .await
        .unwrap();

    let updated = h
        .controller
        .submit_signatures(
            &contract.id,
            SignatureInput {
                student_png_base64: Some(png_base64()),
                parent_png_base64: Some(png_base64()),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, ContractStatus::Completed);
    let (_, fields) = h.controller.get_contract(&contract.id).await.unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(
        fields[0].value,
        Some(FieldValue::Image(ArtifactRef::new(format!(
            "{}-parent-signature.png",
            contract.id
        ))))
    );
}

#[tokio::test]
async fn signatures_require_both_payload_halves() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();

    let err = h
        .controller
        .submit_signatures(
            &contract.id,
            SignatureInput {
                student_png_base64: Some(png_base64()),
                parent_png_base64: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let (unchanged, _) = h.controller.get_contract(&contract.id).await.unwrap();
    assert_eq!(unchanged.status, ContractStatus::PendingFields);
}

#[tokio::test]
async fn approve_is_terminal() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();

    let approved = h
        .controller
        .apply_action(&contract.id, "approve")
        .await
        .unwrap();
    assert_eq!(approved.status, ContractStatus::Approved);

    let err = h
        .controller
        .apply_action(&contract.id, "reject")
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition(_)));
}

#[tokio::test]
async fn reject_resets_document_and_values() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let fields = h
        .controller
        .save_field_layout(&contract.id, vec![text_field(50.0, 50.0, 100.0, 20.0)])
        .await
        .unwrap();
    let mut texts = HashMap::new();
    texts.insert(fields[0].id, "Acme Corp".to_string());
    h.controller
        .submit_company_input(
            &contract.id,
            CompanyInput {
                texts,
                images: Vec::new(),
            },
        )
        .await
        .unwrap();

    let rejected = h
        .controller
        .apply_action(&contract.id, "reject")
        .await
        .unwrap();

    assert_eq!(rejected.status, ContractStatus::PendingCompanyInput);
    assert_eq!(rejected.current_artifact, rejected.original_artifact);
    let (_, fields) = h.controller.get_contract(&contract.id).await.unwrap();
    assert_eq!(fields[0].value, None);
    assert_eq!(fields[0].geometry, FieldGeometry::new(50.0, 50.0, 100.0, 20.0));

    let sent = wait_for_notifications(&h.notifier, 3).await;
    let last = sent.last().unwrap();
    assert_eq!(last.party, Party::Company);
    assert_eq!(last.link, format!("{BASE_URL}/contracts/{}/fill", contract.id));
}

#[tokio::test]
async fn unknown_action_is_an_invalid_transition() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let err = h
        .controller
        .apply_action(&contract.id, "shred")
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition(_)));
}

#[tokio::test]
async fn unknown_contract_is_not_found() {
    let h = harness();
    let missing = ContractId::new("nope");
    assert!(matches!(
        h.controller.get_contract(&missing).await.unwrap_err(),
        LifecycleError::NotFound(_)
    ));
    assert!(matches!(
        h.controller
            .save_field_layout(&missing, vec![text_field(0.0, 0.0, 10.0, 10.0)])
            .await
            .unwrap_err(),
        LifecycleError::NotFound(_)
    ));
}

#[tokio::test]
async fn rerendering_after_reject_starts_from_the_original() {
    let h = harness();
    let contract = h
        .controller
        .create_contract("agreement.pdf", base_document())
        .await
        .unwrap();
    let fields = h
        .controller
        .save_field_layout(&contract.id, vec![text_field(50.0, 50.0, 100.0, 20.0)])
        .await
        .unwrap();

    let mut texts = HashMap::new();
    texts.insert(fields[0].id, "First Pass".to_string());
    h.controller
        .submit_company_input(
            &contract.id,
            CompanyInput {
                texts,
                images: Vec::new(),
            },
        )
        .await
        .unwrap();
    h.controller
        .apply_action(&contract.id, "reject")
        .await
        .unwrap();

    let mut texts = HashMap::new();
    texts.insert(fields[0].id, "Second Pass".to_string());
    let redone = h
        .controller
        .submit_company_input(
            &contract.id,
            CompanyInput {
                texts,
                images: Vec::new(),
            },
        )
        .await
        .unwrap();

    let content = page_text(&h.artifacts.get(&redone.current_artifact).await.unwrap());
    assert!(content.contains("(Second Pass) Tj"));
    assert!(!content.contains("(First Pass) Tj"), "rejected pass must not survive");
}
