//! Submission payloads accepted by the lifecycle controller.

use signet_types::FieldId;
use std::collections::HashMap;

/// An uploaded image with its declared MIME type.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub field_id: FieldId,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Company-step submission: per-field text plus uploaded seal images,
/// keyed by field id.
#[derive(Clone, Debug, Default)]
pub struct CompanyInput {
    pub texts: HashMap<FieldId, String>,
    pub images: Vec<ImageUpload>,
}

/// Signature-step submission: base64-encoded PNGs for both signer parties.
/// Data-URL prefixes (`data:image/png;base64,`) are tolerated.
#[derive(Clone, Debug, Default)]
pub struct SignatureInput {
    pub student_png_base64: Option<String>,
    pub parent_png_base64: Option<String>,
}
