use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::image::ImageType;
use super::key::StorageKey;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// A key found in the store during enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: StorageKey,
    pub modified: SystemTime,
}

/// Key-addressed blob storage for image content.
///
/// Implementations know nothing about owners, names or quotas. Writes are
/// all-or-nothing from a reader's point of view: a key either resolves to
/// the complete previous content or the complete new content.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Largest blob accepted by `put` and `replace`, in bytes.
    fn max_size(&self) -> u64;

    /// Run the checks `put` and `replace` apply to incoming content,
    /// without writing anything.
    fn check(&self, data: &[u8], declared_type: &str) -> Result<ImageType, StorageError> {
        let limit = self.max_size();
        if data.len() as u64 > limit {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit,
            });
        }
        ImageType::validate(declared_type, data)
    }

    /// Store `data` under a key that must not exist yet.
    ///
    /// The declared type must be allow-listed and agree with the content's
    /// signature; the checked type is returned.
    async fn put(
        &self,
        key: &StorageKey,
        data: &[u8],
        declared_type: &str,
    ) -> Result<ImageType, StorageError>;

    /// Atomically swap the content stored under an existing key.
    async fn replace(
        &self,
        key: &StorageKey,
        data: &[u8],
        declared_type: &str,
    ) -> Result<ImageType, StorageError>;

    /// Retrieve all bytes for a blob.
    async fn get(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get_stream(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve a blob as a streaming async reader.
    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Delete a blob. Reports `NotFound` when nothing is stored under the key.
    async fn delete(&self, key: &StorageKey) -> Result<(), StorageError>;

    /// Enumerate every stored key.
    async fn list(&self) -> Result<Vec<StoredBlob>, StorageError>;

    /// Remove abandoned temporaries last modified before `cutoff`.
    ///
    /// Returns the number of files removed.
    async fn purge_temporaries(&self, cutoff: SystemTime) -> Result<usize, StorageError>;
}
