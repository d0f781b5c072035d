//! SM-2 style spaced-repetition scheduling.
//!
//! Ease factor moves within [1.3, 2.5]; intervals are whole days.
//! Recall quality is on the 0..=5 scale, with difficulty-adjusted qualities
//! allowed to be fractional.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::types::{days_between, round_points, DifficultyTier};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_EASE_FACTOR: f64 = 2.5;
pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const MASTERY_INTERVAL_DAYS: i64 = 365;
pub const MAX_INTERVAL_DAYS: i64 = 36_500;
pub const MAX_QUALITY: f64 = 5.0;
const PASSING_QUALITY: f64 = 3.0;
const SECOND_INTERVAL_DAYS: i64 = 6;
const EASY_TASK_PENALTY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub category: String,
    pub skill: String,
    pub ease_factor: f64,
    pub interval: i64,
    pub repetitions: u32,
    pub last_review: DateTime<Utc>,
    pub next_review: DateTime<Utc>,
    pub quality_history: Vec<u8>,
    pub average_quality: f64,
    pub mastered: bool,
    #[serde(default)]
    pub version: i64,
}

impl ReviewItem {
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.next_review <= as_of && !self.mastered
    }

    /// Whole days past the scheduled review, negative when not yet due.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        days_between(self.next_review, now)
    }

    pub fn matches(&self, task_id: &str, skill: &str) -> bool {
        self.task_id == task_id && self.skill == skill
    }
}

pub fn initialize_review_item(
    user_id: &str,
    task_id: &str,
    category: &str,
    skill: &str,
    now: DateTime<Utc>,
) -> ReviewItem {
    ReviewItem {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        task_id: task_id.to_string(),
        category: category.to_string(),
        skill: skill.to_string(),
        ease_factor: INITIAL_EASE_FACTOR,
        interval: 1,
        repetitions: 0,
        last_review: now,
        next_review: now + Duration::days(1),
        quality_history: Vec::new(),
        average_quality: 0.0,
        mastered: false,
        version: 0,
    }
}

/// Scheduling state produced by one SM-2 step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextReview {
    pub ease_factor: f64,
    pub interval: i64,
    pub repetitions: u32,
    pub mastered: bool,
}

pub fn clamp_ease_factor(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR)
    } else {
        INITIAL_EASE_FACTOR
    }
}

pub fn clamp_quality(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, MAX_QUALITY)
    } else {
        0.0
    }
}

pub fn calculate_next_review(item: &ReviewItem, quality: f64) -> NextReview {
    let quality = clamp_quality(quality);
    let ease = clamp_ease_factor(item.ease_factor);
    let current_interval = item.interval.clamp(1, MAX_INTERVAL_DAYS);

    if quality < PASSING_QUALITY {
        return NextReview {
            ease_factor: clamp_ease_factor(ease - 0.3),
            interval: 1,
            repetitions: 0,
            mastered: false,
        };
    }

    let ease_factor = if quality >= 5.0 {
        clamp_ease_factor(ease + 0.1)
    } else if quality >= 4.0 {
        ease
    } else {
        clamp_ease_factor(ease - 0.15)
    };

    let interval = match item.repetitions {
        0 => 1,
        1 => SECOND_INTERVAL_DAYS,
        _ => round_points(current_interval as f64 * ease_factor),
    }
    .clamp(current_interval, MAX_INTERVAL_DAYS);

    NextReview {
        ease_factor,
        interval,
        repetitions: item.repetitions.saturating_add(1),
        mastered: interval > MASTERY_INTERVAL_DAYS,
    }
}

/// Points context of the task being reviewed, used to reward harder work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyContext {
    pub base_points: i64,
    pub adjusted_points: i64,
    pub tier: DifficultyTier,
}

impl DifficultyContext {
    pub fn multiplier(&self) -> f64 {
        if self.base_points <= 0 {
            1.0
        } else {
            self.adjusted_points as f64 / self.base_points as f64
        }
    }
}

pub fn adjust_quality(quality: u8, difficulty: Option<&DifficultyContext>) -> f64 {
    let original = f64::from(quality);
    let Some(ctx) = difficulty else {
        return clamp_quality(original);
    };

    let adjustment = match ctx.tier {
        DifficultyTier::Hard | DifficultyTier::Expert => ((ctx.multiplier() - 1.0) * 2.0).clamp(0.0, 1.0),
        DifficultyTier::Easy => -EASY_TASK_PENALTY,
        DifficultyTier::Medium => 0.0,
    };
    clamp_quality(original + adjustment)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub item: ReviewItem,
    pub adjusted_quality: f64,
    pub interval_change: i64,
    pub recommendation: String,
}

pub fn process_review(
    item: &ReviewItem,
    quality: u8,
    time_spent_minutes: f64,
    difficulty: Option<&DifficultyContext>,
    now: DateTime<Utc>,
) -> ReviewOutcome {
    let quality = quality.min(MAX_QUALITY as u8);
    let adjusted_quality = adjust_quality(quality, difficulty);
    let next = calculate_next_review(item, adjusted_quality);

    let mut updated = item.clone();
    updated.ease_factor = next.ease_factor;
    updated.interval = next.interval;
    updated.repetitions = next.repetitions;
    updated.mastered = next.mastered;
    updated.last_review = now;
    updated.next_review = now + Duration::days(next.interval);
    updated.quality_history.push(quality);
    updated.average_quality = mean_quality(&updated.quality_history);

    let interval_change = next.interval - item.interval;

    tracing::debug!(
        skill = %updated.skill,
        quality,
        adjusted_quality,
        interval = next.interval,
        ease_factor = next.ease_factor,
        time_spent_minutes,
        "review processed"
    );

    let recommendation = review_recommendation(adjusted_quality, &updated);
    ReviewOutcome {
        item: updated,
        adjusted_quality,
        interval_change,
        recommendation,
    }
}

fn mean_quality(history: &[u8]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    history.iter().map(|q| f64::from(*q)).sum::<f64>() / history.len() as f64
}

fn review_recommendation(adjusted_quality: f64, item: &ReviewItem) -> String {
    if item.mastered {
        return format!("Skill mastered! Next check-in in {} days.", item.interval);
    }
    if adjusted_quality < PASSING_QUALITY {
        return "This skill needs reinforcement. Review it again tomorrow.".to_string();
    }
    if adjusted_quality >= 4.5 {
        format!("Excellent recall! Next review in {} days.", item.interval)
    } else if adjusted_quality >= 4.0 {
        format!("Good progress. Next review in {} days.", item.interval)
    } else {
        format!(
            "Recalled with effort. Review again in {} days to strengthen it.",
            item.interval
        )
    }
}

pub fn get_items_due_for_review(items: &[ReviewItem], as_of: DateTime<Utc>) -> Vec<&ReviewItem> {
    items.iter().filter(|item| item.is_due(as_of)).collect()
}

/// Orders two due items: clearly more overdue first, then clearly lower ease,
/// then the one reviewed longest ago.
fn compare_session_priority(a: &ReviewItem, b: &ReviewItem, now: DateTime<Utc>) -> Ordering {
    let overdue_a = (now - a.next_review).num_seconds() as f64 / 86_400.0;
    let overdue_b = (now - b.next_review).num_seconds() as f64 / 86_400.0;
    if (overdue_a - overdue_b).abs() > 1.0 {
        return overdue_b.total_cmp(&overdue_a);
    }
    if (a.ease_factor - b.ease_factor).abs() > 0.2 {
        return a.ease_factor.total_cmp(&b.ease_factor);
    }
    a.last_review.cmp(&b.last_review)
}

/// Due items in session order, at most `max_items` of them.
pub fn generate_daily_review_session(
    items: &[ReviewItem],
    max_items: usize,
    now: DateTime<Utc>,
) -> Vec<ReviewItem> {
    let mut due: Vec<ReviewItem> = get_items_due_for_review(items, now).into_iter().cloned().collect();
    // The threshold comparison is not transitive, so a plain insertion sort
    // is used instead of slice::sort_by.
    for i in 1..due.len() {
        let mut j = i;
        while j > 0 && compare_session_priority(&due[j], &due[j - 1], now) == Ordering::Less {
            due.swap(j, j - 1);
            j -= 1;
        }
    }
    due.truncate(max_items);
    due
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionMetrics {
    pub total_items: usize,
    pub mastered_items: usize,
    pub active_items: usize,
    pub average_ease_factor: f64,
    pub average_interval: f64,
    pub retention_rate: f64,
}

pub fn retention_metrics(items: &[ReviewItem]) -> RetentionMetrics {
    if items.is_empty() {
        return RetentionMetrics::default();
    }
    let total = items.len();
    let mastered = items.iter().filter(|i| i.mastered).count();
    let average_ease_factor = items.iter().map(|i| clamp_ease_factor(i.ease_factor)).sum::<f64>() / total as f64;
    let average_interval = items.iter().map(|i| i.interval as f64).sum::<f64>() / total as f64;

    let (quality_sum, quality_count) = items
        .iter()
        .flat_map(|i| i.quality_history.iter())
        .fold((0.0, 0_usize), |(sum, n), q| (sum + f64::from((*q).min(5)), n + 1));
    let retention_rate = if quality_count == 0 {
        0.0
    } else {
        (quality_sum / quality_count as f64 / MAX_QUALITY).clamp(0.0, 1.0)
    };

    RetentionMetrics {
        total_items: total,
        mastered_items: mastered,
        active_items: total - mastered,
        average_ease_factor,
        average_interval,
        retention_rate,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub due: usize,
}

/// Due counts for each of the next `days` days starting at `from`'s date.
/// Items already overdue land on the first day.
pub fn forecast_reviews(items: &[ReviewItem], from: DateTime<Utc>, days: usize) -> Vec<ForecastDay> {
    let start = from.date_naive();
    let mut forecast: Vec<ForecastDay> = (0..days)
        .map(|offset| ForecastDay {
            date: start + Duration::days(offset as i64),
            due: 0,
        })
        .collect();

    for item in items.iter().filter(|i| !i.mastered) {
        let offset = (item.next_review.date_naive() - start).num_days().max(0);
        if let Some(day) = forecast.get_mut(offset as usize) {
            day.due += 1;
        }
    }
    forecast
}
