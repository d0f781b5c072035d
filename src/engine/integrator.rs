//! Unified difficulty pipeline.
//!
//! Points flow through three stages, each rounded on its own:
//! adaptive difficulty, then the category multiplier, then the streak
//! multiplier. Completions are written back into the performance profile and
//! the skill's review item.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::config::EngineConfig;
use crate::engine::difficulty::{calculate_adaptive_difficulty, calculate_performance_score, AdaptiveDifficulty};
use crate::engine::performance::{update_performance_profile, Attempt, UserPerformanceProfile};
use crate::engine::scheduler::{initialize_review_item, process_review, DifficultyContext, ReviewItem};
use crate::engine::strength::{calculate_skill_strength, SkillStrength};
use crate::engine::types::{round_points, DifficultyTier, MasteryLevel, SkillKey, StreakData, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedTaskDifficulty {
    pub task_id: String,
    pub skill: SkillKey,
    pub base_points: i64,
    pub difficulty_points: i64,
    pub category_multiplier: f64,
    pub points_after_category: i64,
    pub streak_multiplier: f64,
    pub final_points: i64,
    pub difficulty_level: DifficultyTier,
    pub mastery_multiplier: f64,
    pub review_interval: i64,
    pub mastery_level: MasteryLevel,
    pub needs_review: bool,
    pub performance_score: f64,
    pub explanation: String,
    pub skill_strength: SkillStrength,
}

impl UnifiedTaskDifficulty {
    pub fn difficulty_context(&self) -> DifficultyContext {
        DifficultyContext {
            base_points: self.base_points,
            adjusted_points: self.difficulty_points,
            tier: self.difficulty_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithDifficulty {
    pub task: Task,
    pub difficulty: UnifiedTaskDifficulty,
}

/// Review items of one user, looked up by the task/skill pair they track.
pub struct ReviewIndex<'a> {
    items: HashMap<(&'a str, &'a str), &'a ReviewItem>,
}

impl<'a> ReviewIndex<'a> {
    pub fn new(items: &'a [ReviewItem]) -> Self {
        let items = items
            .iter()
            .map(|item| ((item.task_id.as_str(), item.skill.as_str()), item))
            .collect();
        Self { items }
    }

    pub fn for_task(&self, task: &Task) -> Option<&'a ReviewItem> {
        let skill = task.skill_key();
        self.items.get(&(task.id.as_str(), skill.as_str())).copied()
    }
}

pub fn find_review_item<'a>(items: &'a [ReviewItem], task: &Task) -> Option<&'a ReviewItem> {
    let skill = task.skill_key();
    items.iter().find(|item| item.matches(&task.id, skill.as_str()))
}

#[derive(Debug, Clone)]
pub struct CompletionInput<'a> {
    pub task: &'a Task,
    pub user_id: &'a str,
    pub profile: &'a UserPerformanceProfile,
    pub streak: &'a StreakData,
    pub review_item: Option<&'a ReviewItem>,
    pub completed: bool,
    pub time_spent_minutes: f64,
    pub quality: Option<u8>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub adjusted_quality: f64,
    pub interval_change: i64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub updated_profile: UserPerformanceProfile,
    pub updated_review_item: Option<ReviewItem>,
    pub points_earned: i64,
    pub difficulty: UnifiedTaskDifficulty,
    pub review: Option<ReviewSummary>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct AdaptiveEngine {
    config: EngineConfig,
}

impl AdaptiveEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn skill_strength(&self, review_item: Option<&ReviewItem>, now: DateTime<Utc>) -> SkillStrength {
        review_item
            .map(|item| calculate_skill_strength(item, now, &self.config.decay))
            .unwrap_or_else(SkillStrength::unreviewed)
    }

    pub fn get_task_difficulty(
        &self,
        task: &Task,
        profile: &UserPerformanceProfile,
        streak: &StreakData,
        review_item: Option<&ReviewItem>,
        now: DateTime<Utc>,
    ) -> UnifiedTaskDifficulty {
        let category = task.category_key();
        let performance_score = calculate_performance_score(profile, streak);
        let adaptive = calculate_adaptive_difficulty(
            task.base_points(),
            performance_score,
            category,
            profile.category(category),
        );

        let category_multiplier = self.config.scoring.category_multiplier(category);
        let streak_multiplier = self.config.scoring.streak_multiplier(streak.current_streak);
        let points_after_category = round_points(adaptive.adjusted_points as f64 * category_multiplier);
        let final_points = round_points(points_after_category as f64 * streak_multiplier);

        let skill_strength = self.skill_strength(review_item, now);
        let mastery_level = mastery_level(review_item, &skill_strength);
        let needs_review = review_item.map(|item| item.next_review <= now).unwrap_or(false)
            || skill_strength.is_overdue
            || skill_strength.needs_review;

        let explanation = explain(&adaptive, category, category_multiplier, streak, streak_multiplier);

        UnifiedTaskDifficulty {
            task_id: task.id.clone(),
            skill: task.skill_key(),
            base_points: adaptive.base_points,
            difficulty_points: adaptive.adjusted_points,
            category_multiplier,
            points_after_category,
            streak_multiplier,
            final_points,
            difficulty_level: adaptive.tier,
            mastery_multiplier: adaptive.multiplier,
            review_interval: review_item.map(|item| item.interval).unwrap_or(0),
            mastery_level,
            needs_review,
            performance_score,
            explanation,
            skill_strength,
        }
    }

    pub fn complete_task(&self, input: CompletionInput<'_>) -> CompletionResult {
        let CompletionInput {
            task,
            user_id,
            profile,
            streak,
            review_item,
            completed,
            time_spent_minutes,
            quality,
            now,
        } = input;

        let difficulty = self.get_task_difficulty(task, profile, streak, review_item, now);

        let attempt = completion_attempt(&difficulty, completed, time_spent_minutes, now);
        let updated_profile = update_performance_profile(profile, task, &attempt, &self.config.tracker);

        if !completed {
            return CompletionResult {
                updated_profile,
                updated_review_item: review_item.cloned(),
                points_earned: 0,
                difficulty,
                review: None,
                message: "Attempt recorded. Every attempt builds the skill.".to_string(),
            };
        }

        let item = review_item.cloned().unwrap_or_else(|| {
            initialize_review_item(
                user_id,
                &task.id,
                task.category_key(),
                difficulty.skill.as_str(),
                now,
            )
        });

        let (updated_item, review) = record_review(&item, quality, time_spent_minutes, &difficulty, now);

        let points_earned = difficulty.final_points;
        let message = match &review {
            Some(summary) => format!("+{points_earned} points! {}", summary.recommendation),
            None => format!("+{points_earned} points earned!"),
        };

        tracing::debug!(
            task_id = %task.id,
            skill = %difficulty.skill,
            points_earned,
            interval = updated_item.interval,
            "task completion processed"
        );

        CompletionResult {
            updated_profile,
            updated_review_item: Some(updated_item),
            points_earned,
            difficulty,
            review,
            message,
        }
    }

    pub fn get_tasks_with_difficulties(
        &self,
        tasks: &[Task],
        profile: &UserPerformanceProfile,
        streak: &StreakData,
        review_items: &[ReviewItem],
        now: DateTime<Utc>,
    ) -> Vec<TaskWithDifficulty> {
        let index = ReviewIndex::new(review_items);
        tasks
            .iter()
            .map(|task| TaskWithDifficulty {
                task: task.clone(),
                difficulty: self.get_task_difficulty(task, profile, streak, index.for_task(task), now),
            })
            .collect()
    }

    /// Tasks whose skill needs review, weakest skill first.
    pub fn get_tasks_needing_review(
        &self,
        tasks: &[Task],
        profile: &UserPerformanceProfile,
        streak: &StreakData,
        review_items: &[ReviewItem],
        now: DateTime<Utc>,
    ) -> Vec<TaskWithDifficulty> {
        let mut needing: Vec<TaskWithDifficulty> = self
            .get_tasks_with_difficulties(tasks, profile, streak, review_items, now)
            .into_iter()
            .filter(|t| t.difficulty.needs_review)
            .collect();
        needing.sort_by(|a, b| {
            let (sa, sb) = (&a.difficulty.skill_strength, &b.difficulty.skill_strength);
            sa.strength
                .total_cmp(&sb.strength)
                .then_with(|| sa.days_until_decay.cmp(&sb.days_until_decay))
        });
        needing
    }

    /// Next task to work on: due reviews with the shortest interval, then new
    /// skills, then skills still being learned, then anything unfinished.
    pub fn get_recommended_next_task<'a>(
        &self,
        tasks: &'a [Task],
        profile: &UserPerformanceProfile,
        streak: &StreakData,
        review_items: &[ReviewItem],
        now: DateTime<Utc>,
    ) -> Option<&'a Task> {
        let index = ReviewIndex::new(review_items);
        let scored: Vec<(&'a Task, UnifiedTaskDifficulty)> = tasks
            .iter()
            .map(|task| (task, self.get_task_difficulty(task, profile, streak, index.for_task(task), now)))
            .collect();

        let due = scored
            .iter()
            .filter(|(_, d)| d.needs_review)
            .fold(None::<&(&Task, UnifiedTaskDifficulty)>, |best, candidate| match best {
                Some(b) if b.1.review_interval <= candidate.1.review_interval => Some(b),
                _ => Some(candidate),
            });
        if let Some((task, _)) = due {
            return Some(*task);
        }

        for level in [MasteryLevel::New, MasteryLevel::Learning] {
            let best = highest_points(
                scored
                    .iter()
                    .filter(|(task, d)| !task.completed && d.mastery_level == level),
            );
            if let Some(task) = best {
                return Some(task);
            }
        }

        tasks.iter().find(|task| !task.completed)
    }
}

fn highest_points<'a, 'b, I>(candidates: I) -> Option<&'a Task>
where
    'a: 'b,
    I: Iterator<Item = &'b (&'a Task, UnifiedTaskDifficulty)>,
{
    candidates
        .fold(None::<&'b (&'a Task, UnifiedTaskDifficulty)>, |best, candidate| match best {
            Some(b) if b.1.final_points >= candidate.1.final_points => Some(b),
            _ => Some(candidate),
        })
        .map(|(task, _)| *task)
}

/// The profile attempt recorded for a completion scored at `difficulty`.
pub fn completion_attempt(
    difficulty: &UnifiedTaskDifficulty,
    completed: bool,
    time_spent_minutes: f64,
    now: DateTime<Utc>,
) -> Attempt {
    Attempt::new(completed, time_spent_minutes, now).with_difficulty(difficulty.mastery_multiplier)
}

/// Applies a finished task to its review item. Without a quality rating the
/// schedule is left alone and only `last_review` moves.
pub fn record_review(
    item: &ReviewItem,
    quality: Option<u8>,
    time_spent_minutes: f64,
    difficulty: &UnifiedTaskDifficulty,
    now: DateTime<Utc>,
) -> (ReviewItem, Option<ReviewSummary>) {
    match quality {
        Some(quality) => {
            let context = difficulty.difficulty_context();
            let outcome = process_review(item, quality, time_spent_minutes, Some(&context), now);
            let summary = ReviewSummary {
                adjusted_quality: outcome.adjusted_quality,
                interval_change: outcome.interval_change,
                recommendation: outcome.recommendation,
            };
            (outcome.item, Some(summary))
        }
        None => {
            let mut stamped = item.clone();
            stamped.last_review = now;
            (stamped, None)
        }
    }
}

pub fn mastery_level(review_item: Option<&ReviewItem>, strength: &SkillStrength) -> MasteryLevel {
    let Some(item) = review_item else {
        return MasteryLevel::New;
    };
    if strength.is_weakened() {
        MasteryLevel::Weakened
    } else if item.mastered {
        MasteryLevel::Mastered
    } else if item.repetitions >= 3 {
        MasteryLevel::Practiced
    } else {
        MasteryLevel::Learning
    }
}

fn explain(
    adaptive: &AdaptiveDifficulty,
    category: &str,
    category_multiplier: f64,
    streak: &StreakData,
    streak_multiplier: f64,
) -> String {
    let mut parts = vec![adaptive.explanation.clone()];
    if (category_multiplier - 1.0).abs() > f64::EPSILON {
        parts.push(format!("{category} tasks earn {category_multiplier}x"));
    }
    if streak_multiplier > 1.0 {
        parts.push(format!(
            "{}-day streak bonus {streak_multiplier}x",
            streak.current_streak
        ));
    }
    parts.join(". ")
}
