use serde::{Deserialize, Serialize};

use crate::engine::performance::{PerformanceMetrics, UserPerformanceProfile};
use crate::engine::types::{round_points, DifficultyTier, StreakData};

pub const MIN_MULTIPLIER: f64 = 0.7;
pub const MAX_MULTIPLIER: f64 = 1.5;

const CATEGORY_MASTERY_RATE: f64 = 0.9;
const CATEGORY_MASTERY_MIN_ATTEMPTS: u32 = 5;
const CATEGORY_STRUGGLE_RATE: f64 = 0.3;
const CATEGORY_STRUGGLE_MIN_ATTEMPTS: u32 = 3;

/// Which adjustment produced the final multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DifficultyRule {
    Excelling,
    Strong,
    Standard,
    Struggling,
    CategoryMastery,
    CategorySupport,
}

impl DifficultyRule {
    pub fn explanation(&self) -> &'static str {
        match self {
            Self::Excelling => "Difficulty increased - performing excellently",
            Self::Strong => "Slight challenge boost - strong recent performance",
            Self::Standard => "Standard difficulty",
            Self::Struggling => "Difficulty eased - building momentum",
            Self::CategoryMastery => "Category mastery bonus applied",
            Self::CategorySupport => "Extra support in this category - difficulty reduced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveDifficulty {
    pub base_points: i64,
    pub adjusted_points: i64,
    pub multiplier: f64,
    pub tier: DifficultyTier,
    pub performance_score: f64,
    pub rule: DifficultyRule,
    pub explanation: String,
}

fn normalize_trend(trend: f64) -> f64 {
    let trend = if trend.is_finite() { trend.clamp(-1.0, 1.0) } else { 0.0 };
    (trend + 1.0) / 2.0
}

/// `successRate x streakRatio x normalizedTrend`, in [0, 1].
pub fn calculate_performance_score(profile: &UserPerformanceProfile, streak: &StreakData) -> f64 {
    let success = if profile.overall_success_rate.is_finite() {
        profile.overall_success_rate.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (success * streak.ratio() * normalize_trend(profile.weekly_trend)).clamp(0.0, 1.0)
}

pub fn clamp_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() {
        multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
    } else {
        1.0
    }
}

pub fn calculate_adaptive_difficulty(
    base_points: i64,
    performance_score: f64,
    category: &str,
    category_metrics: Option<&PerformanceMetrics>,
) -> AdaptiveDifficulty {
    let base_points = base_points.max(0);
    let score = if performance_score.is_finite() { performance_score } else { 0.0 };

    let (mut multiplier, mut tier, mut rule) = if score > 0.8 {
        (1.15, DifficultyTier::Hard, DifficultyRule::Excelling)
    } else if score > 0.65 {
        (1.05, DifficultyTier::Medium, DifficultyRule::Strong)
    } else if score < 0.4 {
        (0.85, DifficultyTier::Easy, DifficultyRule::Struggling)
    } else {
        (1.0, DifficultyTier::Medium, DifficultyRule::Standard)
    };

    if let Some(metrics) = category_metrics {
        let success_rate = metrics.success_rate();
        if success_rate > CATEGORY_MASTERY_RATE && metrics.attempts >= CATEGORY_MASTERY_MIN_ATTEMPTS {
            multiplier *= 1.1;
            if tier == DifficultyTier::Hard {
                tier = DifficultyTier::Expert;
            }
            rule = DifficultyRule::CategoryMastery;
        } else if success_rate < CATEGORY_STRUGGLE_RATE && metrics.attempts >= CATEGORY_STRUGGLE_MIN_ATTEMPTS {
            multiplier *= 0.9;
            tier = DifficultyTier::Easy;
            rule = DifficultyRule::CategorySupport;
        }
    }

    let multiplier = clamp_multiplier(multiplier);
    let adjusted_points = round_points(base_points as f64 * multiplier);

    tracing::debug!(
        category,
        performance_score = score,
        multiplier,
        tier = tier.as_str(),
        "adaptive difficulty computed"
    );

    AdaptiveDifficulty {
        base_points,
        adjusted_points,
        multiplier,
        tier,
        performance_score: score,
        rule,
        explanation: rule.explanation().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::performance::initialize_performance_profile;
    use chrono::Utc;

    fn metrics(attempts: u32, completions: u32) -> PerformanceMetrics {
        PerformanceMetrics {
            attempts,
            completions,
            ..Default::default()
        }
    }

    #[test]
    fn performance_score_combines_rate_streak_and_trend() {
        let mut profile = initialize_performance_profile("u1", Utc::now());
        profile.overall_success_rate = 0.8;
        profile.weekly_trend = 0.5;
        let score = calculate_performance_score(&profile, &StreakData::new(5, 10));
        assert!((score - 0.8 * 0.5 * 0.75).abs() < 1e-9);

        assert_eq!(calculate_performance_score(&profile, &StreakData::default()), 0.0);
    }

    #[test]
    fn score_bands_choose_base_multiplier() {
        let cases = [
            (0.9, 1.15, DifficultyTier::Hard),
            (0.7, 1.05, DifficultyTier::Medium),
            (0.5, 1.0, DifficultyTier::Medium),
            (0.2, 0.85, DifficultyTier::Easy),
        ];
        for (score, multiplier, tier) in cases {
            let d = calculate_adaptive_difficulty(100, score, "sales", None);
            assert_eq!(d.multiplier, multiplier);
            assert_eq!(d.tier, tier);
        }
    }

    #[test]
    fn category_mastery_escalates_hard_to_expert() {
        let m = metrics(10, 10);
        let d = calculate_adaptive_difficulty(100, 0.85, "sales", Some(&m));
        assert!((d.multiplier - 1.265).abs() < 1e-9);
        assert_eq!(d.adjusted_points, 127);
        assert_eq!(d.tier, DifficultyTier::Expert);
        assert_eq!(d.explanation, "Category mastery bonus applied");
    }

    #[test]
    fn category_mastery_needs_enough_attempts() {
        let m = metrics(4, 4);
        let d = calculate_adaptive_difficulty(100, 0.85, "sales", Some(&m));
        assert_eq!(d.multiplier, 1.15);
        assert_eq!(d.tier, DifficultyTier::Hard);
    }

    #[test]
    fn struggling_category_forces_easy() {
        let m = metrics(5, 1);
        let d = calculate_adaptive_difficulty(100, 0.7, "admin", Some(&m));
        assert!((d.multiplier - 0.945).abs() < 1e-9);
        assert_eq!(d.tier, DifficultyTier::Easy);
        assert_eq!(d.adjusted_points, 95);
    }

    #[test]
    fn multiplier_is_clamped() {
        let m = metrics(3, 0);
        let d = calculate_adaptive_difficulty(100, 0.1, "admin", Some(&m));
        assert!((d.multiplier - 0.765).abs() < 1e-9);
        assert!(d.multiplier >= MIN_MULTIPLIER);
        assert_eq!(clamp_multiplier(3.0), MAX_MULTIPLIER);
        assert_eq!(clamp_multiplier(0.1), MIN_MULTIPLIER);
        assert_eq!(clamp_multiplier(f64::NAN), 1.0);
    }
}
