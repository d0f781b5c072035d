//! Persistence boundary for per-user learning state.
//!
//! Profiles and review items carry a `version`. A save only succeeds when the
//! caller's version matches the stored one (0 when nothing is stored yet); the
//! stored version is then bumped and returned. Stale writers get
//! [`StorageError::VersionConflict`] instead of silently overwriting.

pub mod memory;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;

use crate::engine::performance::UserPerformanceProfile;
use crate::engine::scheduler::ReviewItem;

pub use memory::MemoryStore;
pub use sqlite::{SqliteInitError, SqliteStore};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sql error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("version conflict on {key}: expected {expected}, found {found}")]
    VersionConflict { key: String, expected: i64, found: i64 },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn load_profile(&self, user_id: &str) -> StorageResult<Option<UserPerformanceProfile>>;

    /// Returns the new stored version.
    async fn save_profile(&self, profile: &UserPerformanceProfile) -> StorageResult<i64>;

    /// Unreadable items are skipped rather than failing the whole load.
    async fn load_review_items(&self, user_id: &str) -> StorageResult<Vec<ReviewItem>>;

    /// Versioned upsert of every item, all or nothing. Items missing from
    /// `items` are left in place.
    async fn save_review_items(&self, user_id: &str, items: &[ReviewItem]) -> StorageResult<Vec<i64>>;

    /// Insert-or-replace by item id, or by task and skill when another id
    /// already tracks them. Returns the new stored version.
    async fn upsert_review_item(&self, user_id: &str, item: &ReviewItem) -> StorageResult<i64>;
}

pub(crate) fn profile_key(user_id: &str) -> String {
    format!("profile:{user_id}")
}

pub(crate) fn review_item_key(user_id: &str, item_id: &str) -> String {
    format!("review_item:{user_id}:{item_id}")
}

pub(crate) fn check_version(key: String, expected: i64, found: i64) -> StorageResult<i64> {
    if expected == found {
        Ok(found + 1)
    } else {
        Err(StorageError::VersionConflict { key, expected, found })
    }
}
