//! Placeholder fields and their overlay geometry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ArtifactRef, ContractId, ParseEnumError};

/// Row id of a field, assigned by the store at insertion. Ordering by id is
/// insertion order; ids are not stable across layout edits.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FieldId(pub i64);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a field holds. A closed set: unknown kinds cannot enter the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    /// Literal text supplied by the company.
    Text,
    /// Company seal image.
    Seal,
    /// Student's signature image.
    StudentSignature,
    /// Parent's signature image.
    ParentSignature,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Seal => "seal",
            Self::StudentSignature => "studentSignature",
            Self::ParentSignature => "parentSignature",
        }
    }

    /// Kinds the company-input step may bind.
    pub fn in_company_step(&self) -> bool {
        matches!(self, Self::Text | Self::Seal)
    }

    /// Kinds the signature step may bind.
    pub fn in_signature_step(&self) -> bool {
        matches!(self, Self::StudentSignature | Self::ParentSignature)
    }
}

impl FromStr for FieldKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "seal" => Ok(Self::Seal),
            "studentSignature" => Ok(Self::StudentSignature),
            "parentSignature" => Ok(Self::ParentSignature),
            other => Err(ParseEnumError::new("field kind", other)),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overlay rectangle in input coordinates: origin top-left, y increasing
/// downward, units matching the page.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FieldGeometry {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Lower-left corner of the rectangle in render coordinates (origin
    /// bottom-left, y increasing upward): `render_y = page_height - y -
    /// height`, x unchanged. Applied identically for text and image content.
    pub fn render_origin(&self, page_height: f64) -> (f64, f64) {
        (self.x, page_height - self.y - self.height)
    }

    /// Geometry a layout submission may carry: finite values, non-negative
    /// position, positive extent.
    pub fn is_well_formed(&self) -> bool {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        finite && self.x >= 0.0 && self.y >= 0.0 && self.width > 0.0 && self.height > 0.0
    }
}

/// Bound content of a field. Either literal text or a reference to a stored
/// image artifact, never both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Image(ArtifactRef),
}

/// A placeholder field on page 1 of a contract document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub contract_id: ContractId,
    pub kind: FieldKind,
    pub geometry: FieldGeometry,
    /// Absent until a value is bound; cleared again on rejection.
    pub value: Option<FieldValue>,
}

/// One row of a submitted field layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub geometry: FieldGeometry,
}
