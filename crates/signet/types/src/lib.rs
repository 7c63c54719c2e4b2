//! Shared data model for the signet contract workflow.
//!
//! Closed enumerations for lifecycle status and field kinds, the field
//! geometry with its input-space to render-space transform, and the contract
//! and field records every other crate operates on. Status and kind are
//! tagged variants validated at every boundary, never free-form strings.

#![deny(unsafe_code)]

mod contract;
mod field;

pub use contract::{Contract, ContractAction, ContractId, ContractStatus, Party};
pub use field::{Field, FieldGeometry, FieldId, FieldKind, FieldSpec, FieldValue};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reference to a stored document or image artifact, addressed by its
/// generated name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File extension of the referenced artifact, if any.
    pub fn extension(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, ext)| ext)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error for parsing a closed enum from its stored string form.
#[derive(Debug, Error)]
#[error("unknown {what}: '{value}'")]
pub struct ParseEnumError {
    what: &'static str,
    value: String,
}

impl ParseEnumError {
    pub(crate) fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}
