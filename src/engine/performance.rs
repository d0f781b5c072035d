//! Per-user performance profile.
//!
//! Tracks attempt/completion counters per task category plus two
//! time-windowed signals: the week-over-week success trend and the share of
//! recent days with activity.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::config::TrackerParams;
use crate::engine::types::Task;

const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub attempts: u32,
    pub completions: u32,
    pub average_time: f64,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_fails: u32,
    pub consecutive_successes: u32,
    #[serde(default)]
    pub difficulty_history: Vec<f64>,
}

impl PerformanceMetrics {
    pub fn success_rate(&self) -> f64 {
        f64::from(self.completions.min(self.attempts)) / f64::from(self.attempts.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSample {
    pub at: DateTime<Utc>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPerformanceProfile {
    pub user_id: String,
    pub overall_success_rate: f64,
    pub categories: HashMap<String, PerformanceMetrics>,
    pub weekly_trend: f64,
    pub consistency_score: f64,
    pub total_tasks_attempted: u32,
    pub total_tasks_completed: u32,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub recent_attempts: VecDeque<AttemptSample>,
    #[serde(default)]
    pub version: i64,
}

impl UserPerformanceProfile {
    pub fn category(&self, category: &str) -> Option<&PerformanceMetrics> {
        self.categories.get(category)
    }
}

/// One attempt at a task, as reported by the caller.
#[derive(Debug, Clone, Copy)]
pub struct Attempt {
    pub completed: bool,
    pub time_spent_minutes: f64,
    pub difficulty_multiplier: Option<f64>,
    pub at: DateTime<Utc>,
}

impl Attempt {
    pub fn new(completed: bool, time_spent_minutes: f64, at: DateTime<Utc>) -> Self {
        Self {
            completed,
            time_spent_minutes,
            difficulty_multiplier: None,
            at,
        }
    }

    pub fn with_difficulty(mut self, multiplier: f64) -> Self {
        self.difficulty_multiplier = Some(multiplier);
        self
    }
}

pub fn initialize_performance_profile(user_id: &str, now: DateTime<Utc>) -> UserPerformanceProfile {
    UserPerformanceProfile {
        user_id: user_id.to_string(),
        overall_success_rate: NEUTRAL_SUCCESS_RATE,
        categories: HashMap::new(),
        weekly_trend: 0.0,
        consistency_score: 0.0,
        total_tasks_attempted: 0,
        total_tasks_completed: 0,
        last_updated: now,
        recent_attempts: VecDeque::new(),
        version: 0,
    }
}

/// Returns a new profile with `attempt` folded in. The input is left untouched.
pub fn update_performance_profile(
    profile: &UserPerformanceProfile,
    task: &Task,
    attempt: &Attempt,
    params: &TrackerParams,
) -> UserPerformanceProfile {
    let category = match task.category.as_deref().map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => params.default_category.clone(),
    };

    let previous = profile.categories.get(&category).cloned().unwrap_or_default();
    let metrics = next_metrics(previous, attempt, params);

    let mut updated = profile.clone();
    updated.categories.insert(category, metrics);

    updated.total_tasks_attempted = profile.total_tasks_attempted.saturating_add(1);
    if attempt.completed {
        updated.total_tasks_completed = profile.total_tasks_completed.saturating_add(1);
    }
    updated.overall_success_rate = (f64::from(updated.total_tasks_completed)
        / f64::from(updated.total_tasks_attempted.max(1)))
    .clamp(0.0, 1.0);

    updated.recent_attempts.push_back(AttemptSample {
        at: attempt.at,
        completed: attempt.completed,
    });
    while updated.recent_attempts.len() > params.recent_attempt_cap.max(1) {
        updated.recent_attempts.pop_front();
    }

    updated.weekly_trend = weekly_trend(&updated.recent_attempts, attempt.at, params.trend_window_days);
    updated.consistency_score =
        consistency_score(&updated.recent_attempts, attempt.at, params.trend_window_days);
    updated.last_updated = attempt.at;
    updated
}

fn next_metrics(
    previous: PerformanceMetrics,
    attempt: &Attempt,
    params: &TrackerParams,
) -> PerformanceMetrics {
    let time = sanitize_minutes(attempt.time_spent_minutes);
    let weight = params.time_ema_weight.clamp(0.0, 1.0);
    let average_time = if previous.average_time <= 0.0 || !previous.average_time.is_finite() {
        time
    } else {
        previous.average_time * (1.0 - weight) + time * weight
    };

    let (completions, consecutive_successes, consecutive_fails) = if attempt.completed {
        (
            previous.completions.saturating_add(1),
            previous.consecutive_successes.saturating_add(1),
            0,
        )
    } else {
        (
            previous.completions,
            0,
            previous.consecutive_fails.saturating_add(1),
        )
    };

    let mut difficulty_history = previous.difficulty_history;
    if let Some(multiplier) = attempt.difficulty_multiplier.filter(|m| m.is_finite()) {
        difficulty_history.push(multiplier);
        let cap = params.difficulty_history_cap.max(1);
        if difficulty_history.len() > cap {
            let excess = difficulty_history.len() - cap;
            difficulty_history.drain(..excess);
        }
    }

    PerformanceMetrics {
        attempts: previous.attempts.saturating_add(1),
        completions,
        average_time,
        last_attempt: Some(attempt.at),
        consecutive_fails,
        consecutive_successes,
        difficulty_history,
    }
}

fn sanitize_minutes(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Success rate over the last window minus the success rate over the window
/// before it. Zero unless both windows hold at least one attempt.
pub fn weekly_trend(samples: &VecDeque<AttemptSample>, now: DateTime<Utc>, window_days: i64) -> f64 {
    let window = Duration::days(window_days.max(1));
    let current_start = now - window;
    let previous_start = current_start - window;

    let mut current = (0_u32, 0_u32);
    let mut previous = (0_u32, 0_u32);
    for sample in samples {
        if sample.at > now {
            continue;
        }
        let bucket = if sample.at > current_start {
            &mut current
        } else if sample.at > previous_start {
            &mut previous
        } else {
            continue;
        };
        bucket.1 += 1;
        if sample.completed {
            bucket.0 += 1;
        }
    }

    if current.1 == 0 || previous.1 == 0 {
        return 0.0;
    }

    let current_rate = f64::from(current.0) / f64::from(current.1);
    let previous_rate = f64::from(previous.0) / f64::from(previous.1);
    (current_rate - previous_rate).clamp(-1.0, 1.0)
}

/// Share of the last `window_days` calendar days with at least one attempt.
pub fn consistency_score(
    samples: &VecDeque<AttemptSample>,
    now: DateTime<Utc>,
    window_days: i64,
) -> f64 {
    let window_days = window_days.max(1);
    let start = now - Duration::days(window_days);
    let active: HashSet<_> = samples
        .iter()
        .filter(|s| s.at > start && s.at <= now)
        .map(|s| s.at.date_naive())
        .collect();
    (active.len() as f64 / window_days as f64).clamp(0.0, 1.0)
}

/// Category with the highest success rate among those with enough attempts.
pub fn strongest_category(profile: &UserPerformanceProfile, min_attempts: u32) -> Option<(&str, f64)> {
    ranked_categories(profile, min_attempts).last().copied()
}

/// Category with the lowest success rate among those with enough attempts.
pub fn weakest_category(profile: &UserPerformanceProfile, min_attempts: u32) -> Option<(&str, f64)> {
    ranked_categories(profile, min_attempts).first().copied()
}

fn ranked_categories(profile: &UserPerformanceProfile, min_attempts: u32) -> Vec<(&str, f64)> {
    let mut ranked: Vec<(&str, f64)> = profile
        .categories
        .iter()
        .filter(|(_, m)| m.attempts >= min_attempts)
        .map(|(name, m)| (name.as_str(), m.success_rate()))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)));
    ranked
}
