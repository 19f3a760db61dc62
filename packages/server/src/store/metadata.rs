use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use common::storage::{ImageType, StorageKey};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use thiserror::Error;
use tracing::instrument;

use crate::entity::{skin, user};

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("skin {0} not found")]
    NotFound(i32),

    #[error("owner {0} not found")]
    OwnerNotFound(i32),

    #[error("storage key {0} is already referenced")]
    DuplicateKey(String),

    #[error("owner already has {limit} skins")]
    QuotaExceeded { limit: u64 },

    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

impl MetaError {
    /// Whether the backend could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            MetaError::Db(DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
        )
    }
}

/// Row contents for a freshly stored skin.
#[derive(Debug, Clone)]
pub struct NewSkin {
    pub owner_id: i32,
    pub display_name: String,
    pub storage_key: StorageKey,
    pub content_type: ImageType,
    pub size: u64,
}

/// Relational bookkeeping for skins. Never touches blob content.
///
/// Every mutating call is atomic at the row level.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create(&self, new: NewSkin) -> Result<skin::Model, MetaError>;

    /// Insert only while the owner holds fewer than `limit` skins.
    ///
    /// Count and insert happen in one transaction that holds the owner's
    /// row lock, so concurrent callers for the same owner are serialized.
    async fn create_within_quota(
        &self,
        new: NewSkin,
        limit: u64,
    ) -> Result<skin::Model, MetaError>;

    async fn get_by_id(&self, id: i32) -> Result<skin::Model, MetaError>;

    /// The owner's skins in creation order.
    async fn list_by_owner(&self, owner_id: i32) -> Result<Vec<skin::Model>, MetaError>;

    async fn count_by_owner(&self, owner_id: i32) -> Result<u64, MetaError>;

    async fn update_display_name(&self, id: i32, display_name: &str) -> Result<(), MetaError>;

    async fn update_storage_key(&self, id: i32, key: &StorageKey) -> Result<(), MetaError>;

    /// Record the type and size of content swapped in under the existing key.
    async fn update_content(
        &self,
        id: i32,
        content_type: ImageType,
        size: u64,
    ) -> Result<(), MetaError>;

    async fn delete_by_id(&self, id: i32) -> Result<(), MetaError>;

    /// Every storage key currently referenced by a row.
    async fn referenced_keys(&self) -> Result<HashSet<String>, MetaError>;
}

/// [`MetadataStore`] over a SeaORM connection pool.
#[derive(Clone)]
pub struct DbMetadataStore {
    db: DatabaseConnection,
}

impl DbMetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn active_model(new: &NewSkin) -> skin::ActiveModel {
        let now = Utc::now();
        skin::ActiveModel {
            owner_id: Set(new.owner_id),
            display_name: Set(new.display_name.clone()),
            storage_key: Set(new.storage_key.to_hex()),
            content_type: Set(new.content_type.mime().to_string()),
            size: Set(new.size as i64),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
    }

    /// Apply column updates to one row, reporting `NotFound` when no row matched.
    async fn update_columns(
        &self,
        id: i32,
        columns: Vec<(skin::Column, Expr)>,
    ) -> Result<(), MetaError> {
        let mut update = skin::Entity::update_many()
            .col_expr(skin::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(skin::Column::Id.eq(id));
        for (column, value) in columns {
            update = update.col_expr(column, value);
        }

        let result = update.exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(MetaError::NotFound(id));
        }
        Ok(())
    }
}

fn map_insert_err(err: DbErr, new: &NewSkin) -> MetaError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            MetaError::DuplicateKey(new.storage_key.to_hex())
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => MetaError::OwnerNotFound(new.owner_id),
        _ => MetaError::Db(err),
    }
}

#[async_trait]
impl MetadataStore for DbMetadataStore {
    #[instrument(skip(self, new), fields(owner_id = new.owner_id))]
    async fn create(&self, new: NewSkin) -> Result<skin::Model, MetaError> {
        Self::active_model(&new)
            .insert(&self.db)
            .await
            .map_err(|e| map_insert_err(e, &new))
    }

    #[instrument(skip(self, new), fields(owner_id = new.owner_id))]
    async fn create_within_quota(
        &self,
        new: NewSkin,
        limit: u64,
    ) -> Result<skin::Model, MetaError> {
        let txn = self.db.begin().await?;

        let owner = user::Entity::find_by_id(new.owner_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?;
        if owner.is_none() {
            txn.rollback().await?;
            return Err(MetaError::OwnerNotFound(new.owner_id));
        }

        let count = skin::Entity::find()
            .filter(skin::Column::OwnerId.eq(new.owner_id))
            .count(&txn)
            .await?;
        if count >= limit {
            txn.rollback().await?;
            return Err(MetaError::QuotaExceeded { limit });
        }

        let model = Self::active_model(&new)
            .insert(&txn)
            .await
            .map_err(|e| map_insert_err(e, &new))?;

        txn.commit().await?;
        Ok(model)
    }

    async fn get_by_id(&self, id: i32) -> Result<skin::Model, MetaError> {
        skin::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(MetaError::NotFound(id))
    }

    async fn list_by_owner(&self, owner_id: i32) -> Result<Vec<skin::Model>, MetaError> {
        Ok(skin::Entity::find()
            .filter(skin::Column::OwnerId.eq(owner_id))
            .order_by_asc(skin::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn count_by_owner(&self, owner_id: i32) -> Result<u64, MetaError> {
        Ok(skin::Entity::find()
            .filter(skin::Column::OwnerId.eq(owner_id))
            .count(&self.db)
            .await?)
    }

    async fn update_display_name(&self, id: i32, display_name: &str) -> Result<(), MetaError> {
        self.update_columns(
            id,
            vec![(skin::Column::DisplayName, Expr::value(display_name))],
        )
        .await
    }

    async fn update_storage_key(&self, id: i32, key: &StorageKey) -> Result<(), MetaError> {
        self.update_columns(
            id,
            vec![(skin::Column::StorageKey, Expr::value(key.to_hex()))],
        )
        .await
        .map_err(|e| match e {
            MetaError::Db(ref db_err)
                if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                MetaError::DuplicateKey(key.to_hex())
            }
            other => other,
        })
    }

    async fn update_content(
        &self,
        id: i32,
        content_type: ImageType,
        size: u64,
    ) -> Result<(), MetaError> {
        self.update_columns(
            id,
            vec![
                (skin::Column::ContentType, Expr::value(content_type.mime())),
                (skin::Column::Size, Expr::value(size as i64)),
            ],
        )
        .await
    }

    async fn delete_by_id(&self, id: i32) -> Result<(), MetaError> {
        let result = skin::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(MetaError::NotFound(id));
        }
        Ok(())
    }

    async fn referenced_keys(&self) -> Result<HashSet<String>, MetaError> {
        let keys: Vec<String> = skin::Entity::find()
            .select_only()
            .column(skin::Column::StorageKey)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(keys.into_iter().collect())
    }
}
