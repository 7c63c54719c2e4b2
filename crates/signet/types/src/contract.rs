//! Contract records, lifecycle status, and workflow parties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ArtifactRef, ParseEnumError};

// ── Contract identifier ──────────────────────────────────────────────

/// Unique identifier for a contract.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub String);

impl ContractId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Lifecycle status ─────────────────────────────────────────────────

/// Lifecycle status of a contract.
///
/// Rejection is not a status of its own: the reject action resets the
/// current artifact and every bound value, then re-enters
/// `PendingCompanyInput`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Uploaded, waiting for the field layout.
    PendingFields,
    /// Layout saved, waiting for the company to fill text and seal fields.
    PendingCompanyInput,
    /// Company input rendered, waiting for student and parent signatures.
    PendingSignatures,
    /// Fully signed, waiting for the reviewer's decision.
    Completed,
    /// Reviewed and accepted. Terminal.
    Approved,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingFields => "pending_fields",
            Self::PendingCompanyInput => "pending_company_input",
            Self::PendingSignatures => "pending_signatures",
            Self::Completed => "completed",
            Self::Approved => "approved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl FromStr for ContractStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_fields" => Ok(Self::PendingFields),
            "pending_company_input" => Ok(Self::PendingCompanyInput),
            "pending_signatures" => Ok(Self::PendingSignatures),
            "completed" => Ok(Self::Completed),
            "approved" => Ok(Self::Approved),
            other => Err(ParseEnumError::new("contract status", other)),
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Reviewer action ──────────────────────────────────────────────────

/// Reviewer decision on a contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractAction {
    Approve,
    Reject,
}

impl ContractAction {
    /// Parse a caller-supplied action value. Unknown values are the
    /// caller's mistake to hear about, not a panic.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

// ── Parties ──────────────────────────────────────────────────────────

/// Notification targets in the countersigning workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// The company filling text and seal fields.
    Company,
    /// Student and parent, who countersign.
    Signers,
    /// The reviewing party who approves or rejects.
    Reviewer,
}

// ── Contract record ──────────────────────────────────────────────────

/// A contract under the countersigning workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    /// The untouched uploaded document. Immutable once set.
    pub original_artifact: ArtifactRef,
    /// The most recently rendered document. Equal to `original_artifact`
    /// until the first compositing pass and again after every rejection.
    pub current_artifact: ArtifactRef,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    /// Record for a freshly stored upload; the current artifact starts at
    /// the original.
    pub fn new(id: ContractId, original: ArtifactRef) -> Self {
        Self {
            id,
            current_artifact: original.clone(),
            original_artifact: original,
            status: ContractStatus::PendingFields,
            created_at: Utc::now(),
        }
    }
}
