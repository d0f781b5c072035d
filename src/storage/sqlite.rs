use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::engine::performance::UserPerformanceProfile;
use crate::engine::scheduler::ReviewItem;
use crate::storage::schema::{split_sql_statements, ENGINE_SCHEMA_SQL, SCHEMA_VERSION};
use crate::storage::{profile_key, review_item_key, LearningStore, StorageError, StorageResult};

#[derive(Debug, thiserror::Error)]
pub enum SqliteInitError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) a file database and applies the schema.
    pub async fn open(path: &Path) -> Result<Self, SqliteInitError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SqliteInitError::Io(e.to_string()))?;
            }
        }
        Self::connect(&format!("sqlite:{}?mode=rwc", path.display())).await
    }

    pub async fn connect(url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| SqliteInitError::Config(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Single-connection in-memory database. The connection is never
    /// recycled, otherwise the data would vanish with it.
    pub async fn in_memory() -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| SqliteInitError::Config(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, SqliteInitError> {
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("adaptive-task-engine")
        .join("engine.db")
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    let version: Option<String> =
        sqlx::query_scalar(r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#)
            .fetch_optional(pool)
            .await
            .unwrap_or(None);

    if version.as_deref() == Some(SCHEMA_VERSION) {
        return Ok(());
    }

    for stmt in split_sql_statements(ENGINE_SCHEMA_SQL) {
        sqlx::query(&stmt).execute(pool).await?;
    }

    sqlx::query(r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#)
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    tracing::debug!(schema_version = SCHEMA_VERSION, "sqlite schema applied");
    Ok(())
}

async fn stored_profile_version(conn: &mut SqliteConnection, user_id: &str) -> StorageResult<i64> {
    let found: Option<i64> =
        sqlx::query_scalar(r#"SELECT "version" FROM "performance_profiles" WHERE "userId" = ?"#)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.unwrap_or(0))
}

/// Version of the stored row for this item's id, else of the row already
/// holding its task and skill.
async fn stored_item_version(conn: &mut SqliteConnection, user_id: &str, item: &ReviewItem) -> StorageResult<i64> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT "version" FROM "review_items"
        WHERE "userId" = ? AND ("id" = ? OR ("taskId" = ? AND "skill" = ?))
        ORDER BY CASE WHEN "id" = ? THEN 0 ELSE 1 END
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(&item.id)
    .bind(&item.task_id)
    .bind(&item.skill)
    .bind(&item.id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.unwrap_or(0))
}

/// Conditional write: insert when the caller expects no row, otherwise
/// update only while the stored version still matches. A new item whose
/// task and skill are already tracked under another id is a conflict; at the
/// stored version it replaces that row.
async fn write_review_item(conn: &mut SqliteConnection, user_id: &str, item: &ReviewItem) -> StorageResult<i64> {
    let next = item.version + 1;
    let mut stored = item.clone();
    stored.user_id = user_id.to_string();
    stored.version = next;
    let data = serde_json::to_string(&stored)?;

    let result = if item.version == 0 {
        sqlx::query(
            r#"
            INSERT INTO "review_items" ("id", "userId", "taskId", "skill", "version", "nextReview", "data")
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&item.id)
        .bind(user_id)
        .bind(&item.task_id)
        .bind(&item.skill)
        .bind(next)
        .bind(item.next_review)
        .bind(&data)
        .execute(&mut *conn)
        .await?
    } else {
        sqlx::query(
            r#"
            UPDATE "review_items"
            SET "id" = ?, "taskId" = ?, "skill" = ?, "version" = ?, "nextReview" = ?, "data" = ?
            WHERE "userId" = ? AND "version" = ?
              AND ("id" = ? OR ("taskId" = ? AND "skill" = ?))
            "#,
        )
        .bind(&item.id)
        .bind(&item.task_id)
        .bind(&item.skill)
        .bind(next)
        .bind(item.next_review)
        .bind(&data)
        .bind(user_id)
        .bind(item.version)
        .bind(&item.id)
        .bind(&item.task_id)
        .bind(&item.skill)
        .execute(&mut *conn)
        .await?
    };

    if result.rows_affected() == 1 {
        return Ok(next);
    }

    let found = stored_item_version(conn, user_id, item).await?;
    Err(StorageError::VersionConflict {
        key: review_item_key(user_id, &item.id),
        expected: item.version,
        found,
    })
}

#[async_trait]
impl LearningStore for SqliteStore {
    async fn load_profile(&self, user_id: &str) -> StorageResult<Option<UserPerformanceProfile>> {
        let row = sqlx::query(r#"SELECT "version", "data" FROM "performance_profiles" WHERE "userId" = ?"#)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row.try_get("data")?;
        let mut profile: UserPerformanceProfile = serde_json::from_str(&data)?;
        profile.version = row.try_get("version")?;
        Ok(Some(profile))
    }

    async fn save_profile(&self, profile: &UserPerformanceProfile) -> StorageResult<i64> {
        let next = profile.version + 1;
        let mut stored = profile.clone();
        stored.version = next;
        let data = serde_json::to_string(&stored)?;

        let mut conn = self.pool.acquire().await?;
        let result = if profile.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO "performance_profiles" ("userId", "version", "data", "updatedAt")
                VALUES (?, ?, ?, ?)
                ON CONFLICT ("userId") DO NOTHING
                "#,
            )
            .bind(&profile.user_id)
            .bind(next)
            .bind(&data)
            .bind(profile.last_updated)
            .execute(&mut *conn)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE "performance_profiles"
                SET "version" = ?, "data" = ?, "updatedAt" = ?
                WHERE "userId" = ? AND "version" = ?
                "#,
            )
            .bind(next)
            .bind(&data)
            .bind(profile.last_updated)
            .bind(&profile.user_id)
            .bind(profile.version)
            .execute(&mut *conn)
            .await?
        };

        if result.rows_affected() == 1 {
            return Ok(next);
        }

        let found = stored_profile_version(&mut conn, &profile.user_id).await?;
        Err(StorageError::VersionConflict {
            key: profile_key(&profile.user_id),
            expected: profile.version,
            found,
        })
    }

    async fn load_review_items(&self, user_id: &str) -> StorageResult<Vec<ReviewItem>> {
        let rows = sqlx::query(
            r#"
            SELECT "id", "version", "data" FROM "review_items"
            WHERE "userId" = ?
            ORDER BY "taskId", "skill", "id"
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let data: String = row.try_get("data")?;
            match serde_json::from_str::<ReviewItem>(&data) {
                Ok(mut item) => {
                    item.version = row.try_get("version")?;
                    items.push(item);
                }
                Err(err) => {
                    let id: String = row.try_get("id")?;
                    tracing::warn!(user_id, item_id = %id, error = %err, "skipping unreadable review item");
                }
            }
        }
        Ok(items)
    }

    async fn save_review_items(&self, user_id: &str, items: &[ReviewItem]) -> StorageResult<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut versions = Vec::with_capacity(items.len());
        for item in items {
            // A conflict drops `tx`, rolling back earlier writes.
            versions.push(write_review_item(&mut tx, user_id, item).await?);
        }
        tx.commit().await?;
        Ok(versions)
    }

    async fn upsert_review_item(&self, user_id: &str, item: &ReviewItem) -> StorageResult<i64> {
        let mut conn = self.pool.acquire().await?;
        write_review_item(&mut conn, user_id, item).await
    }
}
