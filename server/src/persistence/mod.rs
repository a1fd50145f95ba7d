//! Entity Store for the cat battle server.
//!
//! One [`Store`] trait covers every entity kind; the backend behind it is
//! picked from configuration at startup. Multi-record writes
//! (`update_owned_cats`, `record_battle_turn`) are atomic per call.

mod database;
mod memory;
mod seed;

pub use database::PgStore;
pub use memory::MemoryStore;
pub use seed::seed_catalog;

use std::sync::Arc;

use async_trait::async_trait;
use catbattle_shared::{
    Battle, CatTemplate, Item, NewBattle, NewCat, NewItem, NewOwnedCat, NewOwnedItem, NewUser, OwnedCat,
    OwnedItem, User,
};
use log::info;
use thiserror::Error;

use crate::config::StoreConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("corrupted data: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence contract for users, cats, battles and items.
///
/// Lookups return `Ok(None)` for unknown ids. Updates replace the whole
/// record and fail with [`StoreError::NotFound`] if it does not exist.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Users
    // =========================================================================

    async fn get_user(&self, id: i64) -> Result<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// Fails with [`StoreError::UsernameTaken`] on duplicates
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn update_user(&self, user: &User) -> Result<()>;

    // =========================================================================
    // Cat catalog
    // =========================================================================

    async fn list_cats(&self) -> Result<Vec<CatTemplate>>;

    async fn get_cat(&self, id: i64) -> Result<Option<CatTemplate>>;

    async fn create_cat(&self, cat: NewCat) -> Result<CatTemplate>;

    // =========================================================================
    // Owned cats
    // =========================================================================

    /// All cats of a user, ordered by id
    async fn list_owned_cats(&self, user_id: i64) -> Result<Vec<OwnedCat>>;

    async fn get_owned_cat(&self, id: i64) -> Result<Option<OwnedCat>>;

    async fn active_owned_cat(&self, user_id: i64) -> Result<Option<OwnedCat>>;

    async fn create_owned_cat(&self, cat: NewOwnedCat) -> Result<OwnedCat>;

    /// Write several owned cats at once. Either all are written or none.
    async fn update_owned_cats(&self, cats: &[OwnedCat]) -> Result<()>;

    // =========================================================================
    // Battles
    // =========================================================================

    async fn get_battle(&self, id: i64) -> Result<Option<Battle>>;

    async fn active_battle(&self, user_id: i64) -> Result<Option<Battle>>;

    async fn create_battle(&self, battle: NewBattle) -> Result<Battle>;

    /// Write a resolved turn, together with the rewarded user on a win.
    async fn record_battle_turn(&self, battle: &Battle, user: Option<&User>) -> Result<()>;

    // =========================================================================
    // Items
    // =========================================================================

    async fn list_items(&self) -> Result<Vec<Item>>;

    async fn get_item(&self, id: i64) -> Result<Option<Item>>;

    async fn create_item(&self, item: NewItem) -> Result<Item>;

    async fn list_owned_items(&self, user_id: i64) -> Result<Vec<OwnedItem>>;

    async fn get_owned_item(&self, id: i64) -> Result<Option<OwnedItem>>;

    async fn create_owned_item(&self, item: NewOwnedItem) -> Result<OwnedItem>;

    async fn update_owned_item(&self, item: &OwnedItem) -> Result<()>;
}

/// Open the configured backend.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config {
        StoreConfig::Memory => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Postgres { url, max_connections } => {
            let store = PgStore::connect(url, *max_connections).await?;
            info!("Connected to PostgreSQL");
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
    }
}
