use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;

use super::error::StorageError;
use super::image::ImageType;
use super::key::StorageKey;
use super::traits::{BlobStore, BoxReader, StoredBlob};

const TEMP_DIR: &str = ".tmp";

/// Filesystem-backed blob store.
///
/// Blobs are stored in a sharded directory layout:
/// `{base_path}/{first 2 hex chars}/{remaining 62 hex chars}`.
/// Every write lands in `{base_path}/.tmp` first and is renamed into place,
/// so readers never observe a partially written file.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(TEMP_DIR)).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Compute the filesystem path for a given key.
    fn blob_path(&self, key: &StorageKey) -> PathBuf {
        self.base_path
            .join(key.shard_prefix())
            .join(key.shard_suffix())
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(TEMP_DIR)
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Write `data` to a fresh temporary file and flush it to disk.
    async fn write_temp(&self, data: &[u8]) -> Result<PathBuf, StorageError> {
        let temp_path = self.temp_path();

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(temp_path)
    }

    /// Move a finished temporary over `blob_path`.
    async fn commit_temp(&self, temp_path: PathBuf, blob_path: &PathBuf) -> Result<(), StorageError> {
        if let Some(parent) = blob_path.parent()
            && let Err(e) = fs::create_dir_all(parent).await
        {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn max_size(&self) -> u64 {
        self.max_size
    }

    async fn put(
        &self,
        key: &StorageKey,
        data: &[u8],
        declared_type: &str,
    ) -> Result<ImageType, StorageError> {
        let image_type = self.check(data, declared_type)?;

        let blob_path = self.blob_path(key);
        if fs::try_exists(&blob_path).await? {
            return Err(StorageError::AlreadyExists(key.to_hex()));
        }

        let temp_path = self.write_temp(data).await?;
        self.commit_temp(temp_path, &blob_path).await?;

        debug!(storage_key = %key, size = data.len(), "Stored blob");
        Ok(image_type)
    }

    async fn replace(
        &self,
        key: &StorageKey,
        data: &[u8],
        declared_type: &str,
    ) -> Result<ImageType, StorageError> {
        let image_type = self.check(data, declared_type)?;

        let blob_path = self.blob_path(key);
        if !fs::try_exists(&blob_path).await? {
            return Err(StorageError::NotFound(key.to_hex()));
        }

        // rename(2) swaps the directory entry atomically; the old inode is
        // released only once the new one is in place.
        let temp_path = self.write_temp(data).await?;
        self.commit_temp(temp_path, &blob_path).await?;

        debug!(storage_key = %key, size = data.len(), "Replaced blob");
        Ok(image_type)
    }

    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError> {
        let blob_path = self.blob_path(key);
        match fs::File::open(&blob_path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        let blob_path = self.blob_path(key);
        Ok(fs::try_exists(&blob_path).await?)
    }

    async fn delete(&self, key: &StorageKey) -> Result<(), StorageError> {
        let blob_path = self.blob_path(key);
        match fs::remove_file(&blob_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<StoredBlob>, StorageError> {
        let mut blobs = Vec::new();
        let mut shards = fs::read_dir(&self.base_path).await?;

        while let Some(shard) = shards.next_entry().await? {
            let shard_name = shard.file_name();
            let Some(prefix) = shard_name.to_str() else {
                continue;
            };
            if prefix == TEMP_DIR || !shard.file_type().await?.is_dir() {
                continue;
            }

            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_name = entry.file_name();
                let Some(suffix) = file_name.to_str() else {
                    continue;
                };
                // Anything that is not a well-formed key was not written by us.
                let Ok(key) = StorageKey::from_hex(&format!("{prefix}{suffix}")) else {
                    continue;
                };
                let modified = entry.metadata().await?.modified()?;
                blobs.push(StoredBlob { key, modified });
            }
        }

        Ok(blobs)
    }

    async fn purge_temporaries(&self, cutoff: SystemTime) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut entries = fs::read_dir(self.base_path.join(TEMP_DIR)).await?;

        while let Some(entry) = entries.next_entry().await? {
            let modified = entry.metadata().await?.modified()?;
            if modified >= cutoff {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }
}
