use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::types::DEFAULT_CATEGORY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakThreshold {
    pub min_days: u32,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringTables {
    pub category_multipliers: HashMap<String, f64>,
    pub default_category_multiplier: f64,
    pub streak_thresholds: Vec<StreakThreshold>,
}

impl Default for ScoringTables {
    fn default() -> Self {
        let category_multipliers = [
            ("sales", 1.5),
            ("marketing", 1.3),
            ("content", 1.2),
            ("admin", 1.0),
            ("learning", 1.1),
            ("networking", 1.4),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let streak_thresholds = [
            (3, 1.5),
            (7, 2.0),
            (14, 2.5),
            (21, 3.0),
            (30, 3.5),
            (50, 4.0),
            (100, 5.0),
        ]
        .into_iter()
        .map(|(min_days, multiplier)| StreakThreshold { min_days, multiplier })
        .collect();

        Self {
            category_multipliers,
            default_category_multiplier: 1.0,
            streak_thresholds,
        }
    }
}

impl ScoringTables {
    pub fn category_multiplier(&self, category: &str) -> f64 {
        self.category_multipliers
            .get(category)
            .copied()
            .unwrap_or(self.default_category_multiplier)
    }

    /// Largest multiplier whose threshold the streak meets, 1.0 below every threshold.
    pub fn streak_multiplier(&self, current_streak: u32) -> f64 {
        self.streak_thresholds
            .iter()
            .filter(|t| current_streak >= t.min_days)
            .map(|t| t.multiplier)
            .fold(1.0, f64::max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerParams {
    pub default_category: String,
    pub time_ema_weight: f64,
    pub trend_window_days: i64,
    pub recent_attempt_cap: usize,
    pub difficulty_history_cap: usize,
    pub insight_min_attempts: u32,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            default_category: DEFAULT_CATEGORY.to_string(),
            time_ema_weight: 0.3,
            trend_window_days: 7,
            recent_attempt_cap: 200,
            difficulty_history_cap: 100,
            insight_min_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayParams {
    pub decay_rate_per_day: f64,
    pub mastered_decay_rate_per_day: f64,
    pub needs_review_window_days: i64,
    pub weakened_threshold: f64,
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            decay_rate_per_day: 10.0,
            mastered_decay_rate_per_day: 2.0,
            needs_review_window_days: 2,
            weakened_threshold: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueParams {
    pub max_items: usize,
    pub minutes_per_review: f64,
    pub mastery_window_days: i64,
}

impl Default for QueueParams {
    fn default() -> Self {
        Self {
            max_items: 10,
            minutes_per_review: 15.0,
            mastery_window_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub scoring: ScoringTables,
    pub tracker: TrackerParams,
    pub decay: DecayParams,
    pub queue: QueueParams,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides read through `var`; unparsable values are ignored.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let number = |key: &str| {
            var(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        if let Some(val) = number("ENGINE_DECAY_RATE") {
            config.decay.decay_rate_per_day = val.max(0.0);
        }
        if let Some(val) = number("ENGINE_MASTERED_DECAY_RATE") {
            config.decay.mastered_decay_rate_per_day = val.max(0.0);
        }
        if let Some(val) = number("ENGINE_REVIEW_MINUTES") {
            config.queue.minutes_per_review = val.max(1.0);
        }
        if let Some(max) = var("ENGINE_QUEUE_SIZE").and_then(|v| v.trim().parse::<usize>().ok()) {
            config.queue.max_items = max.max(1);
        }

        config
    }
}
