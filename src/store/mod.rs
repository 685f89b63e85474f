//! Persistence seam.
//!
//! The server only talks to `dyn Store`. Two backends exist: the managed
//! Supabase database reached over its REST endpoint, and a local SQLite file
//! for development and tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use boardroom_common::{History, HistoryQuery, Member, MemberPatch, NewHistory, NewMember, Picture};

use crate::config::{BoardroomConfig, StorageBackend};
use crate::errors::StoreError;

pub mod sqlite;
pub mod supabase;

pub use sqlite::{BoardDb, DbHandle, SqliteStore};
pub use supabase::SupabaseStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn list_members(&self, user_id: &str) -> Result<Vec<Member>, StoreError>;

    async fn get_member(&self, id: &str) -> Result<Option<Member>, StoreError>;

    async fn create_member(&self, member: NewMember) -> Result<Member, StoreError>;

    /// `None` when no member has this id.
    async fn update_member(&self, id: &str, patch: MemberPatch)
    -> Result<Option<Member>, StoreError>;

    /// Whether a member was removed.
    async fn delete_member(&self, id: &str) -> Result<bool, StoreError>;

    async fn insert_history(&self, entry: NewHistory) -> Result<History, StoreError>;

    async fn get_history(&self, id: &str) -> Result<Option<History>, StoreError>;

    /// The most recent `query.effective_limit()` records, oldest first.
    async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<History>, StoreError>;

    async fn list_pictures(&self) -> Result<Vec<Picture>, StoreError>;
}

pub type SharedStore = Arc<dyn Store>;

/// Open the backend selected by configuration.
pub fn open(config: &BoardroomConfig) -> Result<SharedStore> {
    match config.resolved_backend() {
        StorageBackend::Supabase => {
            let url = config
                .supabase
                .url
                .as_deref()
                .context("SUPABASE_URL is required for the supabase backend")?;
            let key = config
                .supabase
                .service_key
                .as_deref()
                .context("SUPABASE_SERVICE_KEY is required for the supabase backend")?;
            tracing::info!(url = %url, "Using Supabase storage");
            Ok(Arc::new(SupabaseStore::new(url, key)))
        }
        StorageBackend::Sqlite | StorageBackend::Auto => {
            let path = &config.storage.db_path;
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create database directory")?;
                }
            }
            let db = BoardDb::new(path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            tracing::info!(path = %path.display(), "Using SQLite storage");
            Ok(Arc::new(SqliteStore::new(db)))
        }
    }
}
