use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::storage::{BlobStore, BoxReader, ImageType, StorageError, StorageKey};
use tracing::{Span, debug, error, info, instrument, warn};

use super::error::SkinError;
use crate::entity::skin;
use crate::identity::{IdentityContext, UserId};
use crate::store::{MetadataStore, NewSkin};

/// Maximum number of skins a single user may own at once.
pub const MAX_SKINS_PER_USER: u64 = 10;

/// Maximum display name length, in characters, after trimming.
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Uploaded file content together with its declared MIME type.
#[derive(Debug, Clone)]
pub struct SkinFile {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Requested changes for [`SkinService::edit`]. `None` leaves a part untouched.
#[derive(Debug, Clone, Default)]
pub struct SkinEdit {
    pub display_name: Option<String>,
    pub file: Option<SkinFile>,
}

impl SkinEdit {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.file.is_none()
    }
}

/// Outcome of one orphan sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub temporaries_removed: usize,
}

/// Validate and normalise a user-chosen display name.
pub fn validate_display_name(name: &str) -> Result<&str, SkinError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(SkinError::Validation(format!(
            "Name must be 1-{MAX_DISPLAY_NAME_CHARS} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(SkinError::Validation(
            "Name must not contain control characters".into(),
        ));
    }
    Ok(trimmed)
}

fn allowed_type(declared: &str) -> Result<ImageType, SkinError> {
    ImageType::from_mime(declared).ok_or_else(|| {
        let allowed: Vec<&str> = ImageType::ALL.iter().map(ImageType::mime).collect();
        SkinError::Validation(format!(
            "Unsupported content type '{declared}', expected one of {}",
            allowed.join(", ")
        ))
    })
}

fn storage_key_of(model: &skin::Model) -> Result<StorageKey, SkinError> {
    StorageKey::from_hex(&model.storage_key).map_err(|e| {
        error!(skin_id = model.id, error = %e, "Corrupt storage key in skin row");
        SkinError::Storage(e.to_string())
    })
}

/// Ownership is compared on every call and never cached.
fn authorize(model: &skin::Model, owner_id: UserId) -> Result<(), SkinError> {
    if model.owner_id == owner_id {
        Ok(())
    } else {
        Err(SkinError::Forbidden)
    }
}

/// Deletes a freshly written blob unless defused once its row is committed.
///
/// If the owning future is dropped mid-upload the delete is handed to the
/// runtime so the blob does not outlive the cancelled request.
struct BlobCleanupGuard {
    blobs: Arc<dyn BlobStore>,
    key: StorageKey,
    defused: bool,
}

impl BlobCleanupGuard {
    fn new(blobs: Arc<dyn BlobStore>, key: StorageKey) -> Self {
        Self {
            blobs,
            key,
            defused: false,
        }
    }

    fn defuse(mut self) {
        self.defused = true;
    }

    /// Run the compensating delete inline.
    async fn compensate(mut self) {
        let result = self.blobs.delete(&self.key).await;
        self.defused = true;
        match result {
            Ok(()) | Err(StorageError::NotFound(_)) => {
                warn!(storage_key = %self.key, "Removed blob after failed metadata write");
            }
            Err(e) => {
                error!(
                    storage_key = %self.key,
                    error = %e,
                    "Failed to remove blob after failed metadata write, left for orphan sweep"
                );
            }
        }
    }
}

impl Drop for BlobCleanupGuard {
    fn drop(&mut self) {
        if self.defused {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(storage_key = %self.key, "No runtime to remove blob of cancelled upload");
            return;
        };
        let blobs = Arc::clone(&self.blobs);
        let key = self.key;
        handle.spawn(async move {
            match blobs.delete(&key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {
                    warn!(storage_key = %key, "Removed blob of cancelled upload");
                }
                Err(e) => {
                    error!(
                        storage_key = %key,
                        error = %e,
                        "Failed to remove blob of cancelled upload, left for orphan sweep"
                    );
                }
            }
        });
    }
}

/// Coordinates blob storage and skin metadata behind one contract.
///
/// Write ordering keeps the store free of dangling references: uploads write
/// the blob before the row, deletes remove the row before the blob. A failure
/// between the two steps can at worst leave an unreferenced file, which
/// [`SkinService::sweep_orphans`] reclaims.
pub struct SkinService {
    blobs: Arc<dyn BlobStore>,
    meta: Arc<dyn MetadataStore>,
    request_timeout: Duration,
}

impl SkinService {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        meta: Arc<dyn MetadataStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            blobs,
            meta,
            request_timeout,
        }
    }

    /// Run `fut` under the request timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, SkinError>>,
    ) -> Result<T, SkinError> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Skin operation timed out"
                );
                Err(SkinError::Unavailable(format!("{operation} timed out")))
            }
        }
    }

    /// Store a new skin for the caller.
    #[instrument(skip_all, fields(owner_id, size = file.data.len()))]
    pub async fn upload(
        &self,
        identity: &impl IdentityContext,
        display_name: &str,
        file: &SkinFile,
    ) -> Result<skin::Model, SkinError> {
        let owner_id = identity.current_owner_id()?;
        Span::current().record("owner_id", owner_id);

        self.bounded("upload", self.upload_inner(owner_id, display_name, file))
            .await
    }

    async fn upload_inner(
        &self,
        owner_id: UserId,
        display_name: &str,
        file: &SkinFile,
    ) -> Result<skin::Model, SkinError> {
        let display_name = validate_display_name(display_name)?;
        self.check_file(file)?;

        // Cheap early rejection; the authoritative check runs with the insert.
        if self.meta.count_by_owner(owner_id).await? >= MAX_SKINS_PER_USER {
            return Err(SkinError::QuotaExceeded {
                limit: MAX_SKINS_PER_USER,
            });
        }

        let key = StorageKey::generate();
        let content_type = self.blobs.put(&key, &file.data, &file.content_type).await?;
        let guard = BlobCleanupGuard::new(Arc::clone(&self.blobs), key);

        let new = NewSkin {
            owner_id,
            display_name: display_name.to_string(),
            storage_key: key,
            content_type,
            size: file.data.len() as u64,
        };

        match self.meta.create_within_quota(new, MAX_SKINS_PER_USER).await {
            Ok(model) => {
                guard.defuse();
                info!(skin_id = model.id, storage_key = %key, "Skin uploaded");
                Ok(model)
            }
            Err(e) => {
                guard.compensate().await;
                Err(e.into())
            }
        }
    }

    /// The caller's skins in upload order.
    #[instrument(skip_all, fields(owner_id))]
    pub async fn list(&self, identity: &impl IdentityContext) -> Result<Vec<skin::Model>, SkinError> {
        let owner_id = identity.current_owner_id()?;
        Span::current().record("owner_id", owner_id);

        self.bounded("list", async {
            Ok::<_, SkinError>(self.meta.list_by_owner(owner_id).await?)
        })
        .await
    }

    /// Load one of the caller's skins.
    #[instrument(skip_all, fields(owner_id, skin_id = id))]
    pub async fn get(
        &self,
        identity: &impl IdentityContext,
        id: i32,
    ) -> Result<skin::Model, SkinError> {
        let owner_id = identity.current_owner_id()?;
        Span::current().record("owner_id", owner_id);

        self.bounded("get", self.load_owned(owner_id, id)).await
    }

    /// Load one of the caller's skins together with a reader over its file.
    #[instrument(skip_all, fields(owner_id, skin_id = id))]
    pub async fn open(
        &self,
        identity: &impl IdentityContext,
        id: i32,
    ) -> Result<(skin::Model, BoxReader), SkinError> {
        let owner_id = identity.current_owner_id()?;
        Span::current().record("owner_id", owner_id);

        self.bounded("open", async {
            let model = self.load_owned(owner_id, id).await?;
            let key = storage_key_of(&model)?;
            let reader = self.blobs.get_stream(&key).await.map_err(|e| {
                error!(storage_key = %key, error = %e, "Skin row references an unreadable blob");
                SkinError::Storage(e.to_string())
            })?;
            Ok::<_, SkinError>((model, reader))
        })
        .await
    }

    /// Type, signature and size checks, run before anything is written.
    fn check_file(&self, file: &SkinFile) -> Result<ImageType, SkinError> {
        allowed_type(&file.content_type)?;
        Ok(self.blobs.check(&file.data, &file.content_type)?)
    }

    async fn load_owned(&self, owner_id: UserId, id: i32) -> Result<skin::Model, SkinError> {
        let model = self.meta.get_by_id(id).await?;
        authorize(&model, owner_id)?;
        Ok(model)
    }

    /// Rename and/or replace the file of one of the caller's skins.
    ///
    /// The name and the file are applied as two independent steps: if the
    /// file swap fails after a rename committed, the rename stays.
    #[instrument(skip_all, fields(owner_id, skin_id = id))]
    pub async fn edit(
        &self,
        identity: &impl IdentityContext,
        id: i32,
        changes: &SkinEdit,
    ) -> Result<skin::Model, SkinError> {
        let owner_id = identity.current_owner_id()?;
        Span::current().record("owner_id", owner_id);

        self.bounded("edit", self.edit_inner(owner_id, id, changes))
            .await
    }

    async fn edit_inner(
        &self,
        owner_id: UserId,
        id: i32,
        changes: &SkinEdit,
    ) -> Result<skin::Model, SkinError> {
        let existing = self.load_owned(owner_id, id).await?;

        if changes.is_empty() {
            return Ok(existing);
        }

        let display_name = changes
            .display_name
            .as_deref()
            .map(validate_display_name)
            .transpose()?;
        if let Some(file) = &changes.file {
            self.check_file(file)?;
        }

        if let Some(display_name) = display_name {
            self.meta.update_display_name(id, display_name).await?;
            debug!("Skin renamed");
        }

        if let Some(file) = &changes.file {
            let key = storage_key_of(&existing)?;
            let content_type = self
                .blobs
                .replace(&key, &file.data, &file.content_type)
                .await
                .map_err(|e| match e {
                    // Deleted after load_owned.
                    StorageError::NotFound(_) => SkinError::NotFound,
                    e => {
                        warn!(storage_key = %key, error = %e, "Skin file replace failed");
                        SkinError::from(e)
                    }
                })?;
            self.meta
                .update_content(id, content_type, file.data.len() as u64)
                .await?;
            debug!(storage_key = %key, "Skin file replaced");
        }

        let updated = self.meta.get_by_id(id).await?;
        info!("Skin edited");
        Ok(updated)
    }

    /// Remove one of the caller's skins.
    ///
    /// Succeeds once the row is gone; a blob that cannot be removed stays
    /// behind as an orphan.
    #[instrument(skip_all, fields(owner_id, skin_id = id))]
    pub async fn delete(&self, identity: &impl IdentityContext, id: i32) -> Result<(), SkinError> {
        let owner_id = identity.current_owner_id()?;
        Span::current().record("owner_id", owner_id);

        self.bounded("delete", self.delete_inner(owner_id, id))
            .await
    }

    async fn delete_inner(&self, owner_id: UserId, id: i32) -> Result<(), SkinError> {
        let existing = self.load_owned(owner_id, id).await?;
        let key = storage_key_of(&existing)?;

        self.meta.delete_by_id(id).await?;

        match self.blobs.delete(&key).await {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => {
                debug!(storage_key = %key, "Blob already absent");
            }
            Err(e) => {
                warn!(storage_key = %key, error = %e, "Failed to remove blob of deleted skin, left for orphan sweep");
            }
        }

        info!(storage_key = %key, "Skin deleted");
        Ok(())
    }

    /// Remove blobs no row references, and abandoned temporaries.
    ///
    /// Only files last modified more than `grace` ago are considered, so a
    /// blob whose upload has not committed its row yet is left alone.
    #[instrument(skip(self))]
    pub async fn sweep_orphans(&self, grace: Duration) -> Result<SweepReport, SkinError> {
        let cutoff = SystemTime::now()
            .checked_sub(grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let referenced = self.meta.referenced_keys().await?;
        let stored = self.blobs.list().await?;

        let mut report = SweepReport {
            scanned: stored.len(),
            ..Default::default()
        };

        for blob in stored {
            if blob.modified >= cutoff || referenced.contains(&blob.key.to_hex()) {
                continue;
            }
            match self.blobs.delete(&blob.key).await {
                Ok(()) => report.removed += 1,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => warn!(storage_key = %blob.key, error = %e, "Failed to remove orphan blob"),
            }
        }

        report.temporaries_removed = self.blobs.purge_temporaries(cutoff).await?;

        if report.removed > 0 || report.temporaries_removed > 0 {
            info!(
                scanned = report.scanned,
                removed = report.removed,
                temporaries_removed = report.temporaries_removed,
                "Swept orphan blobs"
            );
        }
        Ok(report)
    }
}

/// Spawn a background task that periodically sweeps orphan blobs.
pub fn spawn_orphan_sweeper(
    service: Arc<SkinService>,
    interval: Duration,
    grace: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);

        loop {
            interval.tick().await;
            if let Err(e) = service.sweep_orphans(grace).await {
                error!(error = %e, "Orphan sweep failed");
            }
        }
    })
}
