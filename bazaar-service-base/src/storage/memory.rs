use crate::storage::blob::{BlobNamespace, BlobStorage, BlobStorageError, DiskUsage};
use crate::storage::zip::{unzip_bytes, zip_bytes};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-memory blob storage for tests.
pub struct InMemoryBlobStorage {
    blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    usage: Mutex<DiskUsage>,
}

impl Default for InMemoryBlobStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBlobStorage {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(BTreeMap::new()),
            usage: Mutex::new(DiskUsage {
                free_bytes: 100 * 1024 * 1024 * 1024,
                total_bytes: 200 * 1024 * 1024 * 1024,
            }),
        }
    }

    pub fn set_usage(&self, usage: DiskUsage) {
        *self.usage.lock().unwrap() = usage;
    }

    fn key(namespace: &BlobNamespace, path: &Path) -> (String, String) {
        (
            namespace.base_path().to_string_lossy().to_string(),
            path.to_string_lossy().replace('\\', "/"),
        )
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn get(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<Option<Bytes>, BlobStorageError> {
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs
            .get(&Self::key(&namespace, path))
            .map(|data| Bytes::from(data.clone())))
    }

    async fn put(
        &self,
        namespace: BlobNamespace,
        path: &Path,
        data: &[u8],
    ) -> Result<(), BlobStorageError> {
        let mut blobs = self.blobs.lock().unwrap();
        blobs.insert(Self::key(&namespace, path), data.to_vec());
        Ok(())
    }

    async fn append(
        &self,
        namespace: BlobNamespace,
        path: &Path,
        data: &[u8],
    ) -> Result<(), BlobStorageError> {
        let mut blobs = self.blobs.lock().unwrap();
        blobs
            .entry(Self::key(&namespace, path))
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    async fn exists(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<bool, BlobStorageError> {
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs.contains_key(&Self::key(&namespace, path)))
    }

    async fn list(
        &self,
        namespace: BlobNamespace,
        prefix: &Path,
    ) -> Result<Vec<PathBuf>, BlobStorageError> {
        let ns = namespace.base_path().to_string_lossy().to_string();
        let prefix = prefix.to_string_lossy().replace('\\', "/");
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs
            .keys()
            .filter(|(namespace, path)| {
                *namespace == ns
                    && (prefix.is_empty()
                        || path == &prefix
                        || path.starts_with(&format!("{prefix}/")))
            })
            .map(|(_, path)| PathBuf::from(path))
            .collect())
    }

    async fn delete(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<(), BlobStorageError> {
        let mut blobs = self.blobs.lock().unwrap();
        blobs.remove(&Self::key(&namespace, path));
        Ok(())
    }

    async fn delete_namespace(&self, namespace: BlobNamespace) -> Result<(), BlobStorageError> {
        let ns = namespace.base_path().to_string_lossy().to_string();
        let mut blobs = self.blobs.lock().unwrap();
        blobs.retain(|(namespace, _), _| *namespace != ns);
        Ok(())
    }

    async fn zip_dir(
        &self,
        namespace: BlobNamespace,
        src_dir: &Path,
        target: &Path,
    ) -> Result<(), BlobStorageError> {
        let files = self.list(namespace.clone(), src_dir).await?;
        let src_prefix = format!("{}/", src_dir.to_string_lossy().replace('\\', "/"));

        let mut entries = Vec::new();
        for file in files {
            let path = file.to_string_lossy().replace('\\', "/");
            let entry_name = path
                .strip_prefix(&src_prefix)
                .unwrap_or(path.as_str())
                .to_string();
            let data = self
                .get(namespace.clone(), &file)
                .await?
                .ok_or_else(|| BlobStorageError::NotFound(path.clone()))?;
            entries.push((entry_name, data.to_vec()));
        }

        let archive = zip_bytes(entries).await?;
        self.put(namespace, target, &archive).await
    }

    async fn unzip(
        &self,
        namespace: BlobNamespace,
        archive: &Path,
        target_dir: &Path,
    ) -> Result<(), BlobStorageError> {
        let data = self
            .get(namespace.clone(), archive)
            .await?
            .ok_or_else(|| BlobStorageError::NotFound(archive.display().to_string()))?;

        for (name, contents) in unzip_bytes(data.to_vec()).await? {
            let target = target_dir.join(&name);
            self.put(namespace.clone(), &target, &contents).await?;
        }

        Ok(())
    }

    async fn usage(&self) -> Result<DiskUsage, BlobStorageError> {
        Ok(*self.usage.lock().unwrap())
    }

    fn location(&self) -> PathBuf {
        PathBuf::from("/share")
    }
}
