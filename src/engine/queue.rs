//! Daily review queue.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::integrator::{AdaptiveEngine, TaskWithDifficulty, UnifiedTaskDifficulty};
use crate::engine::performance::UserPerformanceProfile;
use crate::engine::scheduler::ReviewItem;
use crate::engine::types::{MasteryLevel, StreakData, Task};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewType {
    Overdue,
    Weakened,
    New,
    Practice,
    Mastery,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::Weakened => "weakened",
            Self::New => "new",
            Self::Practice => "practice",
            Self::Mastery => "mastery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueItem {
    pub task: Task,
    pub difficulty: UnifiedTaskDifficulty,
    pub priority: u8,
    pub review_type: ReviewType,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReviewQueue {
    pub user_id: String,
    pub items: Vec<ReviewQueueItem>,
    pub total_items: usize,
    pub overdue_count: usize,
    pub weakened_count: usize,
    pub new_count: usize,
    pub practice_count: usize,
    pub mastery_count: usize,
    pub estimated_minutes: i64,
    pub generated_at: DateTime<Utc>,
}

impl DailyReviewQueue {
    /// Items that should not wait: overdue plus weakened.
    pub fn urgent_count(&self) -> usize {
        self.overdue_count + self.weakened_count
    }

    pub fn needs_attention(&self) -> bool {
        self.overdue_count > 0 || self.weakened_count > 0
    }

    pub fn motivational_message(&self) -> String {
        if self.items.is_empty() {
            return "All caught up! No reviews due today.".to_string();
        }
        if self.overdue_count > 0 && self.weakened_count > 0 {
            return format!(
                "{} overdue and {} fading skills need you today. A short session puts you back on track.",
                self.overdue_count, self.weakened_count
            );
        }
        if self.overdue_count > 0 {
            return format!(
                "{} review{} overdue. Knock {} out first.",
                self.overdue_count,
                if self.overdue_count == 1 { " is" } else { "s are" },
                if self.overdue_count == 1 { "it" } else { "them" }
            );
        }
        if self.weakened_count > 0 {
            return format!(
                "{} skill{} starting to fade. A quick refresh keeps {} sharp.",
                self.weakened_count,
                if self.weakened_count == 1 { " is" } else { "s are" },
                if self.weakened_count == 1 { "it" } else { "them" }
            );
        }
        if self.new_count > 0 {
            return format!("{} new skill{} ready to learn today.", self.new_count, plural(self.new_count));
        }
        if self.mastery_count > 0 && self.practice_count == 0 {
            return "Only mastery check-ins today. Keep your best skills polished.".to_string();
        }
        format!(
            "{} practice item{} scheduled, about {} minutes.",
            self.total_items,
            plural(self.total_items),
            self.estimated_minutes
        )
    }

    pub fn priority_distribution(&self) -> PriorityDistribution {
        let mut by_type: HashMap<ReviewType, usize> = HashMap::new();
        for item in &self.items {
            *by_type.entry(item.review_type).or_insert(0) += 1;
        }
        if self.items.is_empty() {
            return PriorityDistribution {
                by_type,
                ..Default::default()
            };
        }
        let min = self.items.iter().map(|i| i.priority).min().unwrap_or(0);
        let max = self.items.iter().map(|i| i.priority).max().unwrap_or(0);
        let mean = self.items.iter().map(|i| f64::from(i.priority)).sum::<f64>() / self.items.len() as f64;
        PriorityDistribution { min, max, mean, by_type }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityDistribution {
    pub min: u8,
    pub max: u8,
    pub mean: f64,
    pub by_type: HashMap<ReviewType, usize>,
}

/// Review type and priority for one scored task, or `None` if it needs no review.
pub fn classify_review(
    task: &Task,
    difficulty: &UnifiedTaskDifficulty,
    mastery_window_days: i64,
) -> Option<(ReviewType, u8, String)> {
    let strength = &difficulty.skill_strength;
    let is_new = difficulty.mastery_level == MasteryLevel::New && !task.completed;
    let due = difficulty.needs_review || strength.is_overdue || strength.needs_review;
    if !due && !is_new {
        return None;
    }

    let (review_type, priority, reason) = if strength.is_overdue {
        let days_overdue = (strength.days_since_last_review - difficulty.review_interval).max(0);
        (
            ReviewType::Overdue,
            90 + days_overdue.min(10),
            format!("Overdue by {days_overdue} day{}", plural(days_overdue as usize)),
        )
    } else if difficulty.mastery_level == MasteryLevel::Weakened {
        (
            ReviewType::Weakened,
            75 + (strength.strength / 2.0).floor() as i64,
            format!("Skill strength down to {:.0}%", strength.strength),
        )
    } else if is_new {
        (ReviewType::New, 60, "New skill to learn".to_string())
    } else if difficulty.mastery_level != MasteryLevel::Mastered
        && strength.days_until_decay <= 2
    {
        let days = strength.days_until_decay.clamp(0, 2);
        (
            ReviewType::Practice,
            55 + (2 - days) * 5,
            if days == 0 {
                "Scheduled for review today".to_string()
            } else {
                format!("Scheduled for review in {days} day{}", plural(days as usize))
            },
        )
    } else if difficulty.mastery_level == MasteryLevel::Mastered
        && strength.days_until_decay <= mastery_window_days
    {
        (ReviewType::Mastery, 40, "Mastery check-in".to_string())
    } else {
        (ReviewType::Practice, 30, "Keep the skill fresh".to_string())
    };

    let priority = priority.clamp(i64::from(MIN_PRIORITY), i64::from(MAX_PRIORITY)) as u8;
    Some((review_type, priority, reason))
}

impl AdaptiveEngine {
    pub fn generate_daily_review_queue(
        &self,
        tasks: &[Task],
        user_id: &str,
        profile: &UserPerformanceProfile,
        streak: &StreakData,
        review_items: &[ReviewItem],
        max_items: Option<usize>,
        now: DateTime<Utc>,
    ) -> DailyReviewQueue {
        let params = &self.config().queue;
        let max_items = max_items.unwrap_or(params.max_items);

        let mut items: Vec<ReviewQueueItem> = self
            .get_tasks_with_difficulties(tasks, profile, streak, review_items, now)
            .into_iter()
            .filter_map(|TaskWithDifficulty { task, difficulty }| {
                let (review_type, priority, reason) =
                    classify_review(&task, &difficulty, params.mastery_window_days)?;
                Some(ReviewQueueItem {
                    task,
                    difficulty,
                    priority,
                    review_type,
                    reason,
                })
            })
            .collect();

        // Stable: equal priorities keep catalog order.
        items.sort_by(|a, b| b.priority.cmp(&a.priority));
        items.truncate(max_items);

        let count = |kind: ReviewType| items.iter().filter(|i| i.review_type == kind).count();
        let overdue_count = count(ReviewType::Overdue);
        let weakened_count = count(ReviewType::Weakened);
        let new_count = count(ReviewType::New);
        let practice_count = count(ReviewType::Practice);
        let mastery_count = count(ReviewType::Mastery);

        let estimated_minutes = items
            .iter()
            .map(|item| {
                profile
                    .category(item.task.category_key())
                    .map(|m| m.average_time)
                    .filter(|avg| avg.is_finite() && *avg > 0.0)
                    .unwrap_or(params.minutes_per_review)
            })
            .sum::<f64>()
            .round() as i64;

        tracing::debug!(
            user_id,
            total = items.len(),
            overdue_count,
            weakened_count,
            "daily review queue generated"
        );

        DailyReviewQueue {
            user_id: user_id.to_string(),
            total_items: items.len(),
            items,
            overdue_count,
            weakened_count,
            new_count,
            practice_count,
            mastery_count,
            estimated_minutes,
            generated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::performance::initialize_performance_profile;
    use crate::engine::scheduler::initialize_review_item;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn item(task_id: &str, interval: i64, repetitions: u32, last_review: DateTime<Utc>) -> ReviewItem {
        ReviewItem {
            interval,
            repetitions,
            next_review: last_review + Duration::days(interval),
            ..initialize_review_item("u1", task_id, "sales", &format!("sales-{task_id}"), last_review)
        }
    }

    fn sales(id: &str) -> Task {
        Task::new(id, id, 50).with_category("sales").completed(true)
    }

    #[test]
    fn queue_ranks_by_type_priority() {
        let engine = AdaptiveEngine::default();
        let profile = initialize_performance_profile("u1", t0());
        let now = t0() + Duration::days(40);

        let tasks = vec![
            sales("practice"),
            sales("overdue"),
            Task::new("fresh", "fresh", 30).with_category("content"),
            sales("weak"),
            sales("later"),
        ];
        let items = vec![
            // due in one day -> practice 60
            item("practice", 10, 3, now - Duration::days(9)),
            // 3 days past a 30-day interval -> overdue 93
            item("overdue", 30, 4, now - Duration::days(33)),
            // mastered and due today -> mastery check-in 40
            ReviewItem {
                mastered: true,
                ..item("weak", 400, 9, now - Duration::days(400))
            },
            // not due for weeks -> left out
            item("later", 60, 5, now - Duration::days(5)),
        ];

        let queue = engine.generate_daily_review_queue(&tasks, "u1", &profile, &StreakData::default(), &items, None, now);
        let order: Vec<(&str, ReviewType, u8)> = queue
            .items
            .iter()
            .map(|i| (i.task.id.as_str(), i.review_type, i.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                ("overdue", ReviewType::Overdue, 93),
                ("practice", ReviewType::Practice, 60),
                ("fresh", ReviewType::New, 60),
                ("weak", ReviewType::Mastery, 40),
            ]
        );
        assert_eq!(queue.total_items, 4);
        assert_eq!(queue.overdue_count, 1);
        assert_eq!(queue.estimated_minutes, 60);
        assert!(queue.needs_attention());
        assert_eq!(queue.urgent_count(), 1);
    }

    #[test]
    fn weakened_priority_scales_with_strength() {
        let engine = AdaptiveEngine::default();
        let profile = initialize_performance_profile("u1", t0());
        // Mastered, 30 days past a 400-day interval: strength 40 -> weakened.
        let now = t0() + Duration::days(430);
        let weak = ReviewItem {
            mastered: true,
            ..item("weak", 400, 9, t0())
        };
        let difficulty = engine.get_task_difficulty(&sales("weak"), &profile, &StreakData::default(), Some(&weak), now);
        let (kind, priority, _) = classify_review(&sales("weak"), &difficulty, 7).unwrap();
        // Overdue wins over weakened.
        assert_eq!(kind, ReviewType::Overdue);
        assert_eq!(priority, 100);

        let mut difficulty = difficulty;
        difficulty.skill_strength.is_overdue = false;
        let (kind, priority, reason) = classify_review(&sales("weak"), &difficulty, 7).unwrap();
        assert_eq!(kind, ReviewType::Weakened);
        assert_eq!(priority, 95);
        assert!(reason.contains("40%"));
    }

    #[test]
    fn queue_truncates_and_reports_distribution() {
        let engine = AdaptiveEngine::default();
        let profile = initialize_performance_profile("u1", t0());
        let tasks: Vec<Task> = (0..15)
            .map(|i| Task::new(format!("t{i}"), "new", 10).with_category("admin"))
            .collect();
        let queue = engine.generate_daily_review_queue(&tasks, "u1", &profile, &StreakData::default(), &[], None, t0());
        assert_eq!(queue.total_items, 10);
        assert_eq!(queue.new_count, 10);
        assert_eq!(queue.estimated_minutes, 150);

        let dist = queue.priority_distribution();
        assert_eq!((dist.min, dist.max), (60, 60));
        assert_eq!(dist.mean, 60.0);
        assert_eq!(dist.by_type.get(&ReviewType::New), Some(&10));
        assert!(queue.motivational_message().contains("10 new skills"));
    }

    #[test]
    fn empty_queue_is_caught_up() {
        let engine = AdaptiveEngine::default();
        let profile = initialize_performance_profile("u1", t0());
        let queue = engine.generate_daily_review_queue(&[], "u1", &profile, &StreakData::default(), &[], Some(5), t0());
        assert!(queue.items.is_empty());
        assert!(!queue.needs_attention());
        assert_eq!(queue.priority_distribution(), PriorityDistribution::default());
        assert_eq!(queue.motivational_message(), "All caught up! No reviews due today.");
    }
}
