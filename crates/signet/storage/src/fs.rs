//! Filesystem artifact store.

use crate::traits::{check_artifact_name, ArtifactStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use signet_types::ArtifactRef;
use std::path::PathBuf;

/// Artifact store rooted at one directory; blobs are plain files named by
/// their generated artifact name.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open a store at `root`, creating the directory when missing.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to create artifact root: {e}")))?;
        Ok(Self { root })
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> StorageResult<ArtifactRef> {
        check_artifact_name(name)?;
        let path = self.root.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to write artifact '{name}': {e}")))?;
        Ok(ArtifactRef::new(name))
    }

    async fn get(&self, artifact: &ArtifactRef) -> StorageResult<Vec<u8>> {
        check_artifact_name(artifact.as_str())?;
        let path = self.root.join(artifact.as_str());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(
                format!("artifact '{artifact}' does not exist"),
            )),
            Err(e) => Err(StorageError::Backend(format!(
                "failed to read artifact '{artifact}': {e}"
            ))),
        }
    }
}
