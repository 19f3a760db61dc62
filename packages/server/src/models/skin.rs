use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::skin;

/// Response DTO for a single skin.
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct SkinResponse {
    #[schema(example = 17)]
    pub id: i32,
    /// Owning user.
    #[schema(example = 42)]
    pub owner_id: i32,
    #[schema(example = "Alex (winter)")]
    pub display_name: String,
    /// MIME type of the stored file.
    #[schema(example = "image/png")]
    pub content_type: String,
    /// File size in bytes.
    #[schema(example = 2048)]
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<skin::Model> for SkinResponse {
    fn from(model: skin::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            display_name: model.display_name,
            content_type: model.content_type,
            size: model.size,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Response DTO for listing the caller's skins.
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct SkinListResponse {
    /// Skins in upload order.
    pub skins: Vec<SkinResponse>,
    pub total: u64,
    /// Maximum number of skins one user may own.
    #[schema(example = 10)]
    pub limit: u64,
}
