//! End-to-end session flows over the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use adaptive_task_engine::engine::queue::ReviewType;
use adaptive_task_engine::engine::{AdaptiveEngine, StreakData, Task};
use adaptive_task_engine::session::{CoachSession, TaskCompletion};
use adaptive_task_engine::storage::{LearningStore, MemoryStore};

fn day(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + Duration::days(offset)
}

fn sales_task(id: &str) -> Task {
    Task::new(id, "Prospecting call", 100).with_category("sales")
}

async fn open(store: &Arc<dyn LearningStore>, now: DateTime<Utc>) -> CoachSession {
    CoachSession::open(Arc::clone(store), AdaptiveEngine::default(), "user-1", now).await
}

fn finished<'a>(task: &'a Task, streak: &'a StreakData, quality: u8, now: DateTime<Utc>) -> TaskCompletion<'a> {
    TaskCompletion {
        task,
        streak,
        completed: true,
        time_spent_minutes: 25.0,
        quality: Some(quality),
        now,
    }
}

#[tokio::test]
async fn perfect_reviews_grow_interval_and_survive_reopen() {
    let store: Arc<dyn LearningStore> = Arc::new(MemoryStore::new());
    let task = sales_task("call-1");
    let streak = StreakData::default();

    let mut session = open(&store, day(0)).await;
    let mut intervals = Vec::new();
    let mut at = day(0);
    for _ in 0..5 {
        let outcome = session.complete_task(finished(&task, &streak, 5, at)).await;
        assert!(outcome.persisted);
        let item = outcome.result.updated_review_item.expect("completed task has a review item");
        intervals.push(item.interval);
        at = item.next_review;
    }

    assert_eq!(intervals, vec![1, 6, 15, 38, 95]);

    let reopened = open(&store, at).await;
    assert_eq!(reopened.profile().total_tasks_completed, 5);
    assert_eq!(reopened.profile().version, 5);
    let items = reopened.review_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].repetitions, 5);
    assert_eq!(items[0].ease_factor, 2.5);
    assert_eq!(items[0].version, 5);
    assert!(!items[0].mastered);
}

#[tokio::test]
async fn stale_session_merges_instead_of_overwriting() {
    let store: Arc<dyn LearningStore> = Arc::new(MemoryStore::new());
    let streak = StreakData::default();
    let call = sales_task("call-1");
    let email = sales_task("email-1");

    let mut first = open(&store, day(0)).await;
    let mut second = open(&store, day(0)).await;

    first.complete_task(finished(&call, &streak, 5, day(0))).await;

    // `second` still holds version 0 of the profile.
    let outcome = second.complete_task(finished(&email, &streak, 5, day(0))).await;
    assert!(outcome.persisted);
    assert_eq!(outcome.result.updated_profile.total_tasks_attempted, 2);

    // `second` never saw the review item `first` created for this task.
    let outcome = second.complete_task(finished(&call, &streak, 5, day(1))).await;
    assert!(outcome.persisted);
    let merged = outcome.result.updated_review_item.unwrap();
    assert_eq!(merged.repetitions, 2);
    assert_eq!(merged.interval, 6);

    let stored = store.load_profile("user-1").await.unwrap().unwrap();
    assert_eq!(stored.total_tasks_attempted, 3);
    let items = store.load_review_items("user-1").await.unwrap();
    assert_eq!(items.len(), 2);
    let call_item = items.iter().find(|i| i.task_id == "call-1").unwrap();
    assert_eq!(call_item.repetitions, 2);
    assert_eq!(call_item.quality_history, vec![5, 5]);
}

#[tokio::test]
async fn failed_review_resets_schedule() {
    let store: Arc<dyn LearningStore> = Arc::new(MemoryStore::new());
    let task = sales_task("call-1");
    let streak = StreakData::default();
    let mut session = open(&store, day(0)).await;

    let mut at = day(0);
    for _ in 0..3 {
        let item = session
            .complete_task(finished(&task, &streak, 5, at))
            .await
            .result
            .updated_review_item
            .unwrap();
        at = item.next_review;
    }
    let before = session.review_items()[0].clone();
    assert_eq!(before.interval, 15);

    let after = session
        .complete_task(finished(&task, &streak, 1, at))
        .await
        .result
        .updated_review_item
        .unwrap();
    assert_eq!(after.interval, 1);
    assert_eq!(after.repetitions, 0);
    assert!((after.ease_factor - (before.ease_factor - 0.3)).abs() < 1e-9);
}

#[tokio::test]
async fn queue_puts_overdue_skills_ahead_of_new_ones() {
    let store: Arc<dyn LearningStore> = Arc::new(MemoryStore::new());
    let streak = StreakData::new(4, 10);
    let reviewed = sales_task("call-1");
    let fresh = Task::new("essay-1", "Draft essay", 60).with_category("writing");
    let done = Task::new("old-1", "Archived", 10).completed(true);
    let tasks = vec![fresh.clone(), reviewed.clone(), done];

    let mut session = open(&store, day(0)).await;
    session.complete_task(finished(&reviewed, &streak, 4, day(0))).await;

    // Due on day 1, looked at three days late.
    let queue = session.daily_queue(&tasks, &streak, None, day(4));
    assert_eq!(queue.total_items, queue.items.len());
    assert!(queue.items.len() >= 2);

    let first = &queue.items[0];
    assert_eq!(first.task.id, "call-1");
    assert!(matches!(first.review_type, ReviewType::Overdue | ReviewType::Weakened));
    assert!(first.priority >= 90);
    assert!(queue.items.iter().any(|i| i.task.id == "essay-1" && i.review_type == ReviewType::New));
    assert!(queue.items.iter().all(|i| i.task.id != "old-1"));
    assert!(queue.items.windows(2).all(|w| w[0].priority >= w[1].priority));

    let recommended = session.recommended_next(&tasks, &streak, day(4)).unwrap();
    assert_eq!(recommended.id, "call-1");
    let needing = session.tasks_needing_review(&tasks, &streak, day(4));
    assert_eq!(needing.len(), 1);
    assert_eq!(needing[0].task.id, "call-1");
}

#[tokio::test]
async fn streak_and_category_multipliers_stack() {
    let store: Arc<dyn LearningStore> = Arc::new(MemoryStore::new());
    let session = open(&store, day(0)).await;
    let task = sales_task("call-1");

    let difficulty = session.difficulty_for(&task, &StreakData::new(21, 21), day(0));
    assert_eq!(difficulty.category_multiplier, 1.5);
    assert_eq!(difficulty.streak_multiplier, 3.0);
    let after_category = (difficulty.difficulty_points as f64 * 1.5).round() as i64;
    assert_eq!(difficulty.points_after_category, after_category);
    assert_eq!(difficulty.final_points, (after_category as f64 * 3.0).round() as i64);
}

#[tokio::test]
async fn metrics_and_forecast_follow_session_state() {
    let store: Arc<dyn LearningStore> = Arc::new(MemoryStore::new());
    let streak = StreakData::default();
    let mut session = open(&store, day(0)).await;

    for (id, quality) in [("a", 5), ("b", 4), ("c", 2)] {
        let task = sales_task(id);
        session.complete_task(finished(&task, &streak, quality, day(0))).await;
    }

    let metrics = session.retention_metrics();
    assert_eq!(metrics.total_items, 3);
    assert_eq!(metrics.mastered_items, 0);

    let forecast = session.forecast(day(0), 3);
    assert_eq!(forecast.len(), 3);
    assert_eq!(forecast.iter().map(|d| d.due).sum::<usize>(), 3);
    assert_eq!(forecast[1].due, 3);

    let insights = session.category_insights();
    let (name, _) = insights.strongest.unwrap();
    assert_eq!(name, "sales");
}
