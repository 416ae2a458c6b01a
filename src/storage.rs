//! Storage Adapter (spec §4.1, C1): enumerates versioned directories under
//! a model root and fetches artifact bytes on demand.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use crate::error::{Error, ErrorCode};

/// Capability set the rest of the system consumes from a storage backend.
/// Implementers beyond the local filesystem (object stores, etc.) plug in
/// here; this crate ships only [`LocalFilesystemStorage`].
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Derive version numbers from the immediate child directory names of
    /// `model_root` that parse as positive integers; non-parsing children
    /// are ignored. A missing root yields an empty set, not an error.
    async fn list_versions(&self, model_root: &Path) -> Result<BTreeSet<u64>, Error>;

    /// Fetch the bytes of `relative_path` inside `model_root/version/`.
    async fn open_artifact(
        &self,
        model_root: &Path,
        version: u64,
        relative_path: &Path,
    ) -> Result<Vec<u8>, Error>;

    /// Whether `model_root` exists at all.
    async fn exists(&self, model_root: &Path) -> Result<bool, Error>;
}

/// Storage Adapter backed directly by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalFilesystemStorage;

impl LocalFilesystemStorage {
    pub fn new() -> Self {
        LocalFilesystemStorage
    }
}

#[async_trait]
impl StorageAdapter for LocalFilesystemStorage {
    async fn list_versions(&self, model_root: &Path) -> Result<BTreeSet<u64>, Error> {
        let root = model_root.to_path_buf();
        tokio::task::spawn_blocking(move || list_versions_blocking(&root))
            .await
            .map_err(|err| Error::internal(format!("storage task panicked: {err}")))?
    }

    async fn open_artifact(
        &self,
        model_root: &Path,
        version: u64,
        relative_path: &Path,
    ) -> Result<Vec<u8>, Error> {
        let path = model_root.join(version.to_string()).join(relative_path);
        tokio::fs::read(&path).await.map_err(|err| {
            Error::new(
                ErrorCode::IoError,
                format!("failed to read artifact {}: {err}", path.display()),
            )
        })
    }

    async fn exists(&self, model_root: &Path) -> Result<bool, Error> {
        Ok(tokio::fs::metadata(model_root).await.is_ok())
    }
}

fn list_versions_blocking(model_root: &Path) -> Result<BTreeSet<u64>, Error> {
    let entries = match std::fs::read_dir(model_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(err) => {
            return Err(Error::new(
                ErrorCode::IoError,
                format!("cannot list {}: {err}", model_root.display()),
            ))
        }
    };

    let mut versions = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            Error::new(
                ErrorCode::IoError,
                format!("cannot read entry in {}: {err}", model_root.display()),
            )
        })?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if let Ok(version) = name.parse::<u64>() {
                if version > 0 {
                    versions.insert(version);
                }
            }
        }
    }
    Ok(versions)
}

/// Convenience for building the root directory path of one model.
pub fn model_root(repository_root: &Path, model_name: &str) -> PathBuf {
    repository_root.join(model_name)
}
