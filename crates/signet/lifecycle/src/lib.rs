//! Contract lifecycle orchestration.
//!
//! [`LifecycleController`] owns the finite-state machine over contract
//! status. Each transition validates its payload, runs the compositor where
//! content is stamped, persists the outcome through the storage boundaries
//! as one transaction, and notifies the next party after the commit. The
//! controller holds no state of its own beyond the per-contract
//! single-flight locks; everything durable lives behind the injected
//! [`signet_storage::ContractStore`] and [`signet_storage::ArtifactStore`].

#![deny(unsafe_code)]

mod controller;
mod error;
mod input;

pub use controller::LifecycleController;
pub use error::{LifecycleError, LifecycleResult};
pub use input::{CompanyInput, ImageUpload, SignatureInput};
