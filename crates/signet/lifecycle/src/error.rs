use signet_compositor::RenderError;
use signet_storage::StorageError;
use signet_types::ContractId;
use thiserror::Error;

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Failures of lifecycle transitions, classified so callers can tell
/// client-fixable input from server-side faults.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Missing or malformed required input. Nothing was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The contract id resolves to nothing. Nothing was mutated.
    #[error("contract {0} not found")]
    NotFound(ContractId),

    /// The requested trigger is not legal for the contract's current
    /// status, or the action value is not recognized.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Compositor failure; no artifact was written and no state moved.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Repository or artifact-store failure; the transaction rolled back.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
