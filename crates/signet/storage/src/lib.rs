//! Storage boundaries for the signet contract workflow.
//!
//! Two traits: [`ContractStore`] for the relational record of contracts and
//! fields, [`ArtifactStore`] for document and image blobs addressed by
//! generated names. Multi-row transitions are transactional and status
//! moves are compare-and-swap, so a partially applied transition is never
//! observable. SQLite and filesystem adapters are the source-of-truth
//! backends; the in-memory adapters are deterministic and test-friendly.

#![deny(unsafe_code)]

mod error;
mod fs;
mod memory;
mod sqlite;
mod traits;

pub use error::{StorageError, StorageResult};
pub use fs::FsArtifactStore;
pub use memory::{InMemoryArtifactStore, InMemoryContractStore};
pub use sqlite::SqliteContractStore;
pub use traits::{ArtifactStore, ContractStore};
