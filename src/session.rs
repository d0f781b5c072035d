//! One user's learning session over a [`LearningStore`].
//!
//! State is loaded once, every completion is saved right away, and the
//! in-memory copy stays authoritative for the rest of the session even when a
//! write fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::integrator::{
    completion_attempt, find_review_item, record_review, AdaptiveEngine, CompletionInput, CompletionResult,
    TaskWithDifficulty, UnifiedTaskDifficulty,
};
use crate::engine::performance::{
    initialize_performance_profile, strongest_category, update_performance_profile, weakest_category, Attempt,
    UserPerformanceProfile,
};
use crate::engine::queue::DailyReviewQueue;
use crate::engine::scheduler::{
    forecast_reviews, initialize_review_item, retention_metrics, ForecastDay, RetentionMetrics, ReviewItem,
};
use crate::engine::types::{StreakData, Task};
use crate::storage::{LearningStore, StorageError, StorageResult};

/// Everything a caller reports about one finished (or abandoned) task.
#[derive(Debug, Clone)]
pub struct TaskCompletion<'a> {
    pub task: &'a Task,
    pub streak: &'a StreakData,
    pub completed: bool,
    pub time_spent_minutes: f64,
    pub quality: Option<u8>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompletion {
    #[serde(flatten)]
    pub result: CompletionResult,
    /// False when the store rejected the write; the session keeps going on
    /// the in-memory state.
    pub persisted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInsights {
    pub strongest: Option<(String, f64)>,
    pub weakest: Option<(String, f64)>,
}

pub struct CoachSession {
    store: Arc<dyn LearningStore>,
    engine: AdaptiveEngine,
    user_id: String,
    profile: UserPerformanceProfile,
    review_items: Vec<ReviewItem>,
}

impl CoachSession {
    pub async fn open(
        store: Arc<dyn LearningStore>,
        engine: AdaptiveEngine,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let profile = match store.load_profile(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::debug!(user_id, "no stored profile, starting fresh");
                initialize_performance_profile(user_id, now)
            }
            Err(err) => {
                tracing::warn!(user_id, error = %err, "failed to load performance profile, starting fresh");
                initialize_performance_profile(user_id, now)
            }
        };

        let review_items = match store.load_review_items(user_id).await {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "failed to load review items, starting fresh");
                Vec::new()
            }
        };

        tracing::info!(
            user_id,
            review_items = review_items.len(),
            profile_version = profile.version,
            "learning session opened"
        );

        Self {
            store,
            engine,
            user_id: user_id.to_string(),
            profile,
            review_items,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn engine(&self) -> &AdaptiveEngine {
        &self.engine
    }

    pub fn profile(&self) -> &UserPerformanceProfile {
        &self.profile
    }

    pub fn review_items(&self) -> &[ReviewItem] {
        &self.review_items
    }

    pub async fn complete_task(&mut self, completion: TaskCompletion<'_>) -> SessionCompletion {
        let TaskCompletion {
            task,
            streak,
            completed,
            time_spent_minutes,
            quality,
            now,
        } = completion;

        let existing = find_review_item(&self.review_items, task).cloned();
        let mut result = self.engine.complete_task(CompletionInput {
            task,
            user_id: &self.user_id,
            profile: &self.profile,
            streak,
            review_item: existing.as_ref(),
            completed,
            time_spent_minutes,
            quality,
            now,
        });

        let mut persisted = true;

        let attempt = completion_attempt(&result.difficulty, completed, time_spent_minutes, now);
        match self.save_profile_merging(&result.updated_profile, task, &attempt).await {
            Ok(saved) => result.updated_profile = saved,
            Err(err) => {
                persisted = false;
                tracing::error!(
                    user_id = %self.user_id,
                    task_id = %task.id,
                    error = %err,
                    "failed to persist performance profile, continuing in memory"
                );
            }
        }

        if completed {
            if let Some(item) = result.updated_review_item.take() {
                let saved = self
                    .save_item_merging(item.clone(), quality, time_spent_minutes, &result.difficulty, now)
                    .await;
                result.updated_review_item = Some(match saved {
                    Ok(saved) => saved,
                    Err(err) => {
                        persisted = false;
                        tracing::error!(
                            user_id = %self.user_id,
                            task_id = %task.id,
                            error = %err,
                            "failed to persist review item, continuing in memory"
                        );
                        item
                    }
                });
            }
        }

        self.profile = result.updated_profile.clone();
        if let Some(item) = &result.updated_review_item {
            self.remember_item(item.clone());
        }

        SessionCompletion { result, persisted }
    }

    /// Saves `profile`; on a version conflict the attempt is replayed once on
    /// top of the stored profile. An unreadable stored profile counts as
    /// no prior state.
    async fn save_profile_merging(
        &self,
        profile: &UserPerformanceProfile,
        task: &Task,
        attempt: &Attempt,
    ) -> StorageResult<UserPerformanceProfile> {
        match self.store.save_profile(profile).await {
            Ok(version) => Ok(UserPerformanceProfile {
                version,
                ..profile.clone()
            }),
            Err(StorageError::VersionConflict { expected, found, .. }) => {
                tracing::warn!(user_id = %self.user_id, expected, found, "profile changed underneath, merging");
                let stored = match self.store.load_profile(&self.user_id).await {
                    Ok(stored) => stored,
                    Err(StorageError::Serialization(err)) => {
                        tracing::warn!(
                            user_id = %self.user_id,
                            error = %err,
                            "stored profile unreadable, replacing it"
                        );
                        Some(UserPerformanceProfile {
                            version: found,
                            ..initialize_performance_profile(&self.user_id, attempt.at)
                        })
                    }
                    Err(err) => return Err(err),
                }
                .unwrap_or_else(|| initialize_performance_profile(&self.user_id, attempt.at));
                let merged = update_performance_profile(&stored, task, attempt, &self.engine.config().tracker);
                let version = self.store.save_profile(&merged).await?;
                Ok(UserPerformanceProfile { version, ..merged })
            }
            Err(err) => Err(err),
        }
    }

    /// Saves `item`; on a version conflict the review is replayed once on top
    /// of the stored item.
    async fn save_item_merging(
        &self,
        item: ReviewItem,
        quality: Option<u8>,
        time_spent_minutes: f64,
        difficulty: &UnifiedTaskDifficulty,
        now: DateTime<Utc>,
    ) -> StorageResult<ReviewItem> {
        match self.store.upsert_review_item(&self.user_id, &item).await {
            Ok(version) => Ok(ReviewItem { version, ..item }),
            Err(StorageError::VersionConflict { expected, found, .. }) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    item_id = %item.id,
                    expected,
                    found,
                    "review item changed underneath, merging"
                );
                let stored_items = match self.store.load_review_items(&self.user_id).await {
                    Ok(items) => items,
                    Err(StorageError::Serialization(err)) => {
                        tracing::warn!(user_id = %self.user_id, error = %err, "stored review items unreadable");
                        Vec::new()
                    }
                    Err(err) => return Err(err),
                };
                // Nothing readable under this skill: start over at the
                // conflicting row's version so the save replaces it.
                let base = stored_items
                    .into_iter()
                    .find(|stored| stored.id == item.id || stored.matches(&item.task_id, &item.skill))
                    .unwrap_or_else(|| ReviewItem {
                        version: found,
                        ..initialize_review_item(&self.user_id, &item.task_id, &item.category, &item.skill, now)
                    });
                let (merged, _) = record_review(&base, quality, time_spent_minutes, difficulty, now);
                let version = self.store.upsert_review_item(&self.user_id, &merged).await?;
                Ok(ReviewItem { version, ..merged })
            }
            Err(err) => Err(err),
        }
    }

    fn remember_item(&mut self, item: ReviewItem) {
        match self
            .review_items
            .iter_mut()
            .find(|existing| existing.id == item.id || existing.matches(&item.task_id, &item.skill))
        {
            Some(existing) => *existing = item,
            None => self.review_items.push(item),
        }
    }

    pub fn difficulty_for(&self, task: &Task, streak: &StreakData, now: DateTime<Utc>) -> UnifiedTaskDifficulty {
        self.engine.get_task_difficulty(
            task,
            &self.profile,
            streak,
            find_review_item(&self.review_items, task),
            now,
        )
    }

    pub fn tasks_with_difficulties(
        &self,
        tasks: &[Task],
        streak: &StreakData,
        now: DateTime<Utc>,
    ) -> Vec<TaskWithDifficulty> {
        self.engine
            .get_tasks_with_difficulties(tasks, &self.profile, streak, &self.review_items, now)
    }

    pub fn daily_queue(
        &self,
        tasks: &[Task],
        streak: &StreakData,
        max_items: Option<usize>,
        now: DateTime<Utc>,
    ) -> DailyReviewQueue {
        self.engine.generate_daily_review_queue(
            tasks,
            &self.user_id,
            &self.profile,
            streak,
            &self.review_items,
            max_items,
            now,
        )
    }

    pub fn recommended_next<'a>(&self, tasks: &'a [Task], streak: &StreakData, now: DateTime<Utc>) -> Option<&'a Task> {
        self.engine
            .get_recommended_next_task(tasks, &self.profile, streak, &self.review_items, now)
    }

    pub fn tasks_needing_review(
        &self,
        tasks: &[Task],
        streak: &StreakData,
        now: DateTime<Utc>,
    ) -> Vec<TaskWithDifficulty> {
        self.engine
            .get_tasks_needing_review(tasks, &self.profile, streak, &self.review_items, now)
    }

    pub fn retention_metrics(&self) -> RetentionMetrics {
        retention_metrics(&self.review_items)
    }

    pub fn forecast(&self, from: DateTime<Utc>, days: usize) -> Vec<ForecastDay> {
        forecast_reviews(&self.review_items, from, days)
    }

    pub fn category_insights(&self) -> CategoryInsights {
        let min_attempts = self.engine.config().tracker.insight_min_attempts;
        let owned = |entry: Option<(&str, f64)>| entry.map(|(name, rate)| (name.to_string(), rate));
        CategoryInsights {
            strongest: owned(strongest_category(&self.profile, min_attempts)),
            weakest: owned(weakest_category(&self.profile, min_attempts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    /// Reads work, every write fails.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl LearningStore for ReadOnlyStore {
        async fn load_profile(&self, user_id: &str) -> StorageResult<Option<UserPerformanceProfile>> {
            self.0.load_profile(user_id).await
        }
        async fn save_profile(&self, _: &UserPerformanceProfile) -> StorageResult<i64> {
            Err(StorageError::Unavailable("read-only".into()))
        }
        async fn load_review_items(&self, user_id: &str) -> StorageResult<Vec<ReviewItem>> {
            self.0.load_review_items(user_id).await
        }
        async fn save_review_items(&self, _: &str, _: &[ReviewItem]) -> StorageResult<Vec<i64>> {
            Err(StorageError::Unavailable("read-only".into()))
        }
        async fn upsert_review_item(&self, _: &str, _: &ReviewItem) -> StorageResult<i64> {
            Err(StorageError::Unavailable("read-only".into()))
        }
    }

    #[tokio::test]
    async fn write_failure_keeps_in_memory_state() {
        let store: Arc<dyn LearningStore> = Arc::new(ReadOnlyStore(MemoryStore::new()));
        let mut session = CoachSession::open(store, AdaptiveEngine::default(), "u1", now()).await;
        let task = Task::new("t1", "Outline", 40).with_category("writing");
        let streak = StreakData::default();

        let outcome = session
            .complete_task(TaskCompletion {
                task: &task,
                streak: &streak,
                completed: true,
                time_spent_minutes: 20.0,
                quality: Some(4),
                now: now(),
            })
            .await;

        assert!(!outcome.persisted);
        assert_eq!(session.profile().total_tasks_completed, 1);
        assert_eq!(session.review_items().len(), 1);
        assert_eq!(session.review_items()[0].repetitions, 1);
    }

    #[tokio::test]
    async fn abandoned_attempt_creates_no_review_item() {
        let store: Arc<dyn LearningStore> = Arc::new(MemoryStore::new());
        let mut session = CoachSession::open(store.clone(), AdaptiveEngine::default(), "u1", now()).await;
        let task = Task::new("t1", "Outline", 40);
        let streak = StreakData::default();

        let outcome = session
            .complete_task(TaskCompletion {
                task: &task,
                streak: &streak,
                completed: false,
                time_spent_minutes: 5.0,
                quality: None,
                now: now(),
            })
            .await;

        assert!(outcome.persisted);
        assert_eq!(outcome.result.points_earned, 0);
        assert!(session.review_items().is_empty());
        let stored = store.load_profile("u1").await.unwrap().unwrap();
        assert_eq!(stored.total_tasks_attempted, 1);
        assert_eq!(stored.version, 1);
    }

    /// Every read fails, writes go through.
    struct UnreadableStore(MemoryStore);

    #[async_trait]
    impl LearningStore for UnreadableStore {
        async fn load_profile(&self, _: &str) -> StorageResult<Option<UserPerformanceProfile>> {
            Err(StorageError::Unavailable("disk offline".into()))
        }
        async fn save_profile(&self, profile: &UserPerformanceProfile) -> StorageResult<i64> {
            self.0.save_profile(profile).await
        }
        async fn load_review_items(&self, _: &str) -> StorageResult<Vec<ReviewItem>> {
            Err(StorageError::Unavailable("disk offline".into()))
        }
        async fn save_review_items(&self, user_id: &str, items: &[ReviewItem]) -> StorageResult<Vec<i64>> {
            self.0.save_review_items(user_id, items).await
        }
        async fn upsert_review_item(&self, user_id: &str, item: &ReviewItem) -> StorageResult<i64> {
            self.0.upsert_review_item(user_id, item).await
        }
    }

    #[tokio::test]
    async fn read_failure_opens_cold() {
        let store: Arc<dyn LearningStore> = Arc::new(UnreadableStore(MemoryStore::new()));
        let mut session = CoachSession::open(store, AdaptiveEngine::default(), "u1", now()).await;

        assert_eq!(session.profile(), &initialize_performance_profile("u1", now()));
        assert!(session.review_items().is_empty());

        let task = Task::new("t1", "Outline", 40);
        let outcome = session
            .complete_task(TaskCompletion {
                task: &task,
                streak: &StreakData::default(),
                completed: true,
                time_spent_minutes: 10.0,
                quality: Some(4),
                now: now(),
            })
            .await;
        assert!(outcome.persisted);
        assert_eq!(session.profile().version, 1);
    }
}
