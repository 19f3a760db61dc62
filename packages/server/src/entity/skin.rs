use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "skin")]
pub struct Model {
    /// Assigned on insert; ascending ids follow creation order.
    #[sea_orm(primary_key)]
    pub id: i32,

    pub owner_id: i32,
    #[sea_orm(belongs_to, from = "owner_id", to = "id")]
    pub owner: HasOne<super::user::Entity>,

    /// User-chosen label, trimmed.
    pub display_name: String,

    /// Hex-encoded blob key. Stable for the lifetime of the row.
    #[sea_orm(unique)]
    pub storage_key: String,

    /// MIME type of the stored content.
    pub content_type: String,

    /// Purposefully denormalized to avoid a filesystem stat for list queries.
    pub size: i64,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
