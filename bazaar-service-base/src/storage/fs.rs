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

use crate::storage::blob::{BlobNamespace, BlobStorage, BlobStorageError, DiskUsage};
use async_trait::async_trait;
use async_zip::tokio::read::seek::ZipFileReader;
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;

/// Blob storage over a local directory tree (typically a share mounted into
/// both the control plane and the job containers).
pub struct FileSystemBlobStorage {
    root: PathBuf,
}

impl FileSystemBlobStorage {
    pub async fn new(root: &Path) -> Result<Self, BlobStorageError> {
        tokio::fs::create_dir_all(root).await?;
        let root = tokio::fs::canonicalize(root).await?;
        Ok(Self { root })
    }

    fn resolve(
        &self,
        namespace: &BlobNamespace,
        path: &Path,
    ) -> Result<PathBuf, BlobStorageError> {
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
        {
            return Err(BlobStorageError::Internal(format!(
                "Path {} is not relative to the namespace",
                path.display()
            )));
        }
        Ok(self.root.join(namespace.base_path()).join(path))
    }

    async fn ensure_parent(path: &Path) -> Result<(), BlobStorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStorage for FileSystemBlobStorage {
    async fn get(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<Option<Bytes>, BlobStorageError> {
        let target = self.resolve(&namespace, path)?;
        match tokio::fs::read(&target).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(
        &self,
        namespace: BlobNamespace,
        path: &Path,
        data: &[u8],
    ) -> Result<(), BlobStorageError> {
        let target = self.resolve(&namespace, path)?;
        Self::ensure_parent(&target).await?;
        tokio::fs::write(&target, data).await?;
        Ok(())
    }

    async fn append(
        &self,
        namespace: BlobNamespace,
        path: &Path,
        data: &[u8],
    ) -> Result<(), BlobStorageError> {
        let target = self.resolve(&namespace, path)?;
        Self::ensure_parent(&target).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&target)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn exists(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<bool, BlobStorageError> {
        let target = self.resolve(&namespace, path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn list(
        &self,
        namespace: BlobNamespace,
        prefix: &Path,
    ) -> Result<Vec<PathBuf>, BlobStorageError> {
        let base = self.root.join(namespace.base_path());
        let dir = self.resolve(&namespace, prefix)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let entries = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in walkdir::WalkDir::new(&dir) {
                let entry = entry.map_err(|e| e.to_string())?;
                if entry.file_type().is_file() {
                    let relative = entry
                        .path()
                        .strip_prefix(&base)
                        .map_err(|e| e.to_string())?;
                    files.push(relative.to_path_buf());
                }
            }
            files.sort();
            Ok::<_, String>(files)
        })
        .await
        .map_err(|e| BlobStorageError::Internal(e.to_string()))?
        .map_err(BlobStorageError::Internal)?;

        Ok(entries)
    }

    async fn delete(
        &self,
        namespace: BlobNamespace,
        path: &Path,
    ) -> Result<(), BlobStorageError> {
        let target = self.resolve(&namespace, path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_namespace(&self, namespace: BlobNamespace) -> Result<(), BlobStorageError> {
        let base = self.root.join(namespace.base_path());
        debug!("Deleting blob namespace {}", base.display());
        match tokio::fs::remove_dir_all(&base).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn zip_dir(
        &self,
        namespace: BlobNamespace,
        src_dir: &Path,
        target: &Path,
    ) -> Result<(), BlobStorageError> {
        let files = self.list(namespace.clone(), src_dir).await?;
        let base = self.root.join(namespace.base_path());
        let src_base = base.join(src_dir);

        let target_path = self.resolve(&namespace, target)?;
        Self::ensure_parent(&target_path).await?;
        let target_file = tokio::fs::File::create(&target_path).await?;
        let mut writer = ZipFileWriter::with_tokio(target_file);

        for file in files {
            let absolute = base.join(&file);
            let entry_name = absolute
                .strip_prefix(&src_base)
                .map_err(|e| BlobStorageError::Internal(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            let data = tokio::fs::read(&absolute).await?;
            let entry = ZipEntryBuilder::new(entry_name.into(), Compression::Deflate);
            writer.write_entry_whole(entry, &data).await?;
        }

        writer.close().await?;
        Ok(())
    }

    async fn unzip(
        &self,
        namespace: BlobNamespace,
        archive: &Path,
        target_dir: &Path,
    ) -> Result<(), BlobStorageError> {
        let archive_path = self.resolve(&namespace, archive)?;
        let file = tokio::fs::File::open(&archive_path).await?;
        let mut reader = ZipFileReader::with_tokio(BufReader::new(file)).await?;

        for index in 0..reader.file().entries().len() {
            let entry = &reader.file().entries()[index];
            let name = entry.filename().as_str()?.to_string();
            let is_dir = entry.dir()?;

            let relative = target_dir.join(&name);
            let target = self.resolve(&namespace, &relative)?;

            if is_dir {
                tokio::fs::create_dir_all(&target).await?;
                continue;
            }

            Self::ensure_parent(&target).await?;
            let mut entry_reader = reader.reader_with_entry(index).await?;
            let mut contents = Vec::new();
            entry_reader.read_to_end_checked(&mut contents).await?;
            tokio::fs::write(&target, contents).await?;
        }

        Ok(())
    }

    async fn usage(&self) -> Result<DiskUsage, BlobStorageError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let disks = sysinfo::Disks::new_with_refreshed_list();
            let mut best: Option<(&sysinfo::Disk, usize)> = None;
            for disk in disks.list() {
                if root.starts_with(disk.mount_point()) {
                    let depth = disk.mount_point().components().count();
                    if best.map(|(_, d)| depth > d).unwrap_or(true) {
                        best = Some((disk, depth));
                    }
                }
            }
            match best {
                Some((disk, _)) => Ok(DiskUsage {
                    free_bytes: disk.available_space(),
                    total_bytes: disk.total_space(),
                }),
                None => Err(BlobStorageError::Internal(format!(
                    "No disk found for {}",
                    root.display()
                ))),
            }
        })
        .await
        .map_err(|e| BlobStorageError::Internal(e.to_string()))?
    }

    fn location(&self) -> PathBuf {
        self.root.clone()
    }
}

#[cfg(test)]
mod tests {
    use test_r::test;

    use super::*;
    use crate::storage::zip::zip_bytes;
    use assert2::check;
    use bazaar_common::model::ModelId;

    async fn storage() -> (tempfile::TempDir, FileSystemBlobStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemBlobStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    #[test]
    async fn put_get_round_trip() {
        let (_dir, storage) = storage().await;
        let namespace = BlobNamespace::Model(ModelId::new_v4());

        let missing = storage
            .get(namespace.clone(), Path::new("model.zip"))
            .await
            .unwrap();
        check!(missing == None);

        storage
            .put(namespace.clone(), Path::new("model.zip"), b"data")
            .await
            .unwrap();
        let found = storage
            .get(namespace.clone(), Path::new("model.zip"))
            .await
            .unwrap();
        check!(found == Some(Bytes::from_static(b"data")));
    }

    #[test]
    async fn append_concatenates_in_order() {
        let (_dir, storage) = storage().await;
        let namespace = BlobNamespace::Model(ModelId::new_v4());

        storage
            .append(namespace.clone(), Path::new("combined"), b"first;")
            .await
            .unwrap();
        storage
            .append(namespace.clone(), Path::new("combined"), b"second")
            .await
            .unwrap();

        let found = storage
            .get(namespace.clone(), Path::new("combined"))
            .await
            .unwrap();
        check!(found == Some(Bytes::from_static(b"first;second")));
    }

    #[test]
    async fn list_returns_relative_paths() {
        let (_dir, storage) = storage().await;
        let namespace = BlobNamespace::Model(ModelId::new_v4());

        storage
            .put(namespace.clone(), Path::new("chunks/0"), b"a")
            .await
            .unwrap();
        storage
            .put(namespace.clone(), Path::new("chunks/1"), b"b")
            .await
            .unwrap();

        let files = storage
            .list(namespace.clone(), Path::new("chunks"))
            .await
            .unwrap();
        check!(files == vec![PathBuf::from("chunks/0"), PathBuf::from("chunks/1")]);
    }

    #[test]
    async fn unzip_extracts_archive() {
        let (_dir, storage) = storage().await;
        let namespace = BlobNamespace::Model(ModelId::new_v4());

        let archive = zip_bytes(vec![
            ("metadata.json".to_string(), b"{}".to_vec()),
            ("weights/part0".to_string(), b"xyz".to_vec()),
        ])
        .await
        .unwrap();

        storage
            .put(namespace.clone(), Path::new("model.zip"), &archive)
            .await
            .unwrap();
        storage
            .unzip(namespace.clone(), Path::new("model.zip"), Path::new("model"))
            .await
            .unwrap();

        let metadata = storage
            .get(namespace.clone(), Path::new("model/metadata.json"))
            .await
            .unwrap();
        check!(metadata == Some(Bytes::from_static(b"{}")));

        let weights = storage
            .get(namespace.clone(), Path::new("model/weights/part0"))
            .await
            .unwrap();
        check!(weights == Some(Bytes::from_static(b"xyz")));
    }

    #[test]
    async fn delete_namespace_removes_everything() {
        let (_dir, storage) = storage().await;
        let namespace = BlobNamespace::Model(ModelId::new_v4());

        storage
            .put(namespace.clone(), Path::new("a/b/c"), b"x")
            .await
            .unwrap();
        storage.delete_namespace(namespace.clone()).await.unwrap();

        let files = storage.list(namespace.clone(), Path::new("")).await.unwrap();
        check!(files.is_empty());
    }

    #[test]
    async fn rejects_escaping_paths() {
        let (_dir, storage) = storage().await;
        let namespace = BlobNamespace::Model(ModelId::new_v4());

        let result = storage
            .get(namespace.clone(), Path::new("../../etc/passwd"))
            .await;
        check!(result.is_err());
    }
}
