// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use bazaar_common::model::{ModelId, UploadId};
use bazaar_common::SafeDisplay;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// A blob-store subtree owned by a single logical entity. Deleting the
/// owning entity deletes the whole namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlobNamespace {
    /// `models/{id}` - archives, configs, reports of one model
    Model(ModelId),
    /// `data/{id}` - training artifacts of one model
    Data(ModelId),
    /// `uploads/{id}` - staged dataset files of one upload
    Upload(UploadId),
    /// `backups` - output of backup jobs
    Backups,
    /// storage root, e.g. `backup_config.json`
    Root,
}

impl BlobNamespace {
    pub fn base_path(&self) -> PathBuf {
        match self {
            BlobNamespace::Model(id) => Path::new("models").join(id.to_string()),
            BlobNamespace::Data(id) => Path::new("data").join(id.to_string()),
            BlobNamespace::Upload(id) => Path::new("uploads").join(id.to_string()),
            BlobNamespace::Backups => PathBuf::from("backups"),
            BlobNamespace::Root => PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobStorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive error: {0}")]
    Zip(String),
    #[error("Blob storage error: {0}")]
    Internal(String),
}

impl From<async_zip::error::ZipError> for BlobStorageError {
    fn from(error: async_zip::error::ZipError) -> Self {
        BlobStorageError::Zip(error.to_string())
    }
}

impl SafeDisplay for BlobStorageError {
    fn to_safe_string(&self) -> String {
        match self {
            BlobStorageError::NotFound(_) => self.to_string(),
            BlobStorageError::Io(_) => "Internal storage error".to_string(),
            BlobStorageError::Zip(_) => "Invalid archive".to_string(),
            BlobStorageError::Internal(_) => "Internal storage error".to_string(),
        }
    }
}

/// Namespaced blob store. Paths are relative to the namespace base;
/// `Write`/`Append` atomicity per path is the adapter's responsibility.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn get(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<Option<Bytes>, BlobStorageError>;

    async fn put(
        &self,
        namespace: BlobNamespace,
        path: &Path,
        data: &[u8],
    ) -> Result<(), BlobStorageError>;

    async fn append(
        &self,
        namespace: BlobNamespace,
        path: &Path,
        data: &[u8],
    ) -> Result<(), BlobStorageError>;

    async fn exists(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<bool, BlobStorageError>;

    /// All file paths under `prefix`, relative to the namespace base.
    async fn list(
        &self,
        namespace: BlobNamespace,
        prefix: &Path,
    ) -> Result<Vec<PathBuf>, BlobStorageError>;

    async fn delete(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<(), BlobStorageError>;

    async fn delete_namespace(&self, namespace: BlobNamespace) -> Result<(), BlobStorageError>;

    /// Packs every file under `src_dir` into a deflate zip at `target`.
    async fn zip_dir(
        &self,
        namespace: BlobNamespace,
        src_dir: &Path,
        target: &Path,
    ) -> Result<(), BlobStorageError>;

    /// Extracts the archive at `archive` below `target_dir`.
    async fn unzip(
        &self,
        namespace: BlobNamespace,
        archive: &Path,
        target_dir: &Path,
    ) -> Result<(), BlobStorageError>;

    async fn usage(&self) -> Result<DiskUsage, BlobStorageError>;

    /// The storage location as seen by dispatched jobs (mounted share dir).
    fn location(&self) -> PathBuf;
}

impl DiskUsage {
    /// Storage pressure gate: rejects when free space falls below the
    /// greater of 20% of total or 20 GiB.
    pub fn is_under_pressure(&self) -> bool {
        const MIN_FREE_BYTES: u64 = 20 * 1024 * 1024 * 1024;
        let threshold = MIN_FREE_BYTES.max(self.total_bytes / 5);
        self.free_bytes < threshold
    }
}
