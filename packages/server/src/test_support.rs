//! Shared fixtures for unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use common::storage::filesystem::FilesystemBlobStore;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use tempfile::TempDir;

use crate::entity::user;
use crate::identity::{IdentityContext, Unauthenticated, UserId};

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// A file-backed SQLite database with the full schema.
///
/// The pool holds a single connection, so transactions are serialized the
/// way row locks serialize them on Postgres.
pub struct TestDb {
    pub conn: DatabaseConnection,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());

        let mut opts = ConnectOptions::new(url);
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let conn = Database::connect(opts).await.unwrap();
        crate::database::sync_schema(&conn).await.unwrap();

        Self { conn, _dir: dir }
    }
}

pub async fn create_user(db: &DatabaseConnection, username: &str) -> UserId {
    let model = user::ActiveModel {
        username: Set(username.to_string()),
        password: Set("not-a-real-hash".to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();
    model.id
}

pub async fn blob_store() -> (Arc<FilesystemBlobStore>, PathBuf, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("skins");
    let store = FilesystemBlobStore::new(root.clone(), 64 * 1024)
        .await
        .unwrap();
    (Arc::new(store), root, dir)
}

/// An already verified caller.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

impl IdentityContext for Caller {
    fn current_owner_id(&self) -> Result<UserId, Unauthenticated> {
        Ok(self.0)
    }
}

/// A caller without credentials.
pub struct Anonymous;

impl IdentityContext for Anonymous {
    fn current_owner_id(&self) -> Result<UserId, Unauthenticated> {
        Err(Unauthenticated)
    }
}
