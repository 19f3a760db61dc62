use std::time::Duration;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::entity::skin;

pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    // Set connection pool options
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;
    sync_schema(&db).await?;

    Ok(db)
}

/// Create or migrate every table registered under `entity`.
pub async fn sync_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.get_schema_registry("skin_server::entity::*")
        .sync(db)
        .await
}

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't support composite non-unique indexes,
/// so we create them manually on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Serves both the quota count and the ordered listing:
    // SELECT ... FROM skin WHERE owner_id = ? ORDER BY id
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_skin_owner_id")
        .table(skin::Entity)
        .col(skin::Column::OwnerId)
        .col(skin::Column::Id)
        .to_owned();

    let stmt = db.get_database_backend().build(&stmt);
    match db.execute_raw(stmt).await {
        Ok(_) => info!("Ensured index idx_skin_owner_id exists"),
        Err(e) => warn!("Failed to create index idx_skin_owner_id: {}", e),
    }

    Ok(())
}
