use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::config::DecayParams;
use crate::engine::scheduler::ReviewItem;
use crate::engine::types::{days_between, MasteryLevel};

const FULL_STRENGTH: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillStrength {
    pub strength: f64,
    pub level: MasteryLevel,
    pub days_since_last_review: i64,
    pub days_until_decay: i64,
    pub is_overdue: bool,
    pub needs_review: bool,
}

impl SkillStrength {
    /// Snapshot for a skill that has never been reviewed.
    pub fn unreviewed() -> Self {
        Self {
            strength: 0.0,
            level: MasteryLevel::New,
            days_since_last_review: 0,
            days_until_decay: 0,
            is_overdue: false,
            needs_review: false,
        }
    }

    pub fn is_weakened(&self) -> bool {
        self.level == MasteryLevel::Weakened
    }
}

/// Retention strength decays linearly once the scheduled interval has passed.
pub fn decayed_strength(days_since_last_review: i64, interval: i64, mastered: bool, params: &DecayParams) -> f64 {
    let rate = if mastered {
        params.mastered_decay_rate_per_day
    } else {
        params.decay_rate_per_day
    }
    .max(0.0);
    let past_due = (days_since_last_review - interval.max(0)).max(0) as f64;
    (FULL_STRENGTH - rate * past_due).clamp(0.0, FULL_STRENGTH)
}

pub fn calculate_skill_strength(item: &ReviewItem, now: DateTime<Utc>, params: &DecayParams) -> SkillStrength {
    let days_since_last_review = days_between(item.last_review, now).max(0);
    let interval = item.interval.max(1);
    let strength = decayed_strength(days_since_last_review, interval, item.mastered, params);

    let level = if strength < params.weakened_threshold {
        MasteryLevel::Weakened
    } else if item.mastered {
        MasteryLevel::Mastered
    } else {
        match item.repetitions {
            0 => MasteryLevel::New,
            1 | 2 => MasteryLevel::Learning,
            _ => MasteryLevel::Practiced,
        }
    };

    let days_until_decay = interval - days_since_last_review;
    let is_overdue = days_since_last_review > interval;
    let needs_review = is_overdue || days_until_decay <= params.needs_review_window_days;

    SkillStrength {
        strength,
        level,
        days_since_last_review,
        days_until_decay,
        is_overdue,
        needs_review,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scheduler::initialize_review_item;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn practiced(interval: i64) -> ReviewItem {
        ReviewItem {
            interval,
            repetitions: 4,
            ..initialize_review_item("u1", "t1", "sales", "sales-t1", t0())
        }
    }

    #[test]
    fn full_strength_right_after_review() {
        let s = calculate_skill_strength(&practiced(15), t0(), &DecayParams::default());
        assert_eq!(s.strength, 100.0);
        assert_eq!(s.level, MasteryLevel::Practiced);
        assert_eq!(s.days_until_decay, 15);
        assert!(!s.needs_review);
    }

    #[test]
    fn strength_decays_past_interval() {
        let params = DecayParams::default();
        let item = practiced(10);
        let at = |d| calculate_skill_strength(&item, t0() + Duration::days(d), &params);
        assert_eq!(at(10).strength, 100.0);
        assert!(!at(10).is_overdue);
        assert_eq!(at(13).strength, 70.0);
        assert!(at(13).is_overdue);
        assert_eq!(at(16).level, MasteryLevel::Weakened);
        assert_eq!(at(60).strength, 0.0);
    }

    #[test]
    fn needs_review_inside_window() {
        let params = DecayParams::default();
        let item = practiced(10);
        let s = calculate_skill_strength(&item, t0() + Duration::days(8), &params);
        assert_eq!(s.days_until_decay, 2);
        assert!(s.needs_review);
        assert!(!s.is_overdue);
    }

    #[test]
    fn mastered_skills_decay_slowly() {
        let params = DecayParams::default();
        let item = ReviewItem {
            mastered: true,
            interval: 400,
            ..practiced(400)
        };
        let s = calculate_skill_strength(&item, t0() + Duration::days(410), &params);
        assert_eq!(s.strength, 80.0);
        assert_eq!(s.level, MasteryLevel::Mastered);
    }

    #[test]
    fn level_follows_repetitions() {
        let params = DecayParams::default();
        let mut item = practiced(1);
        item.repetitions = 0;
        assert_eq!(calculate_skill_strength(&item, t0(), &params).level, MasteryLevel::New);
        item.repetitions = 2;
        assert_eq!(calculate_skill_strength(&item, t0(), &params).level, MasteryLevel::Learning);
    }

    #[test]
    fn clock_skew_counts_as_no_elapsed_time() {
        let s = calculate_skill_strength(&practiced(5), t0() - Duration::days(3), &DecayParams::default());
        assert_eq!(s.days_since_last_review, 0);
        assert_eq!(s.strength, 100.0);
    }
}
