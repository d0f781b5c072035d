use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum ImpactTier {
    High,
    #[default]
    Medium,
    Low,
}

impl ImpactTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub impact: ImpactTier,
    pub base_points: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, base_points: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: None,
            impact: ImpactTier::default(),
            base_points,
            completed: false,
            skill: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = Some(skill.into());
        self
    }

    pub fn with_impact(mut self, impact: ImpactTier) -> Self {
        self.impact = impact;
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Category used for every per-category lookup. Blank or missing
    /// categories collapse to [`DEFAULT_CATEGORY`].
    pub fn category_key(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => DEFAULT_CATEGORY,
        }
    }

    pub fn skill_key(&self) -> SkillKey {
        SkillKey::for_task(self)
    }

    pub fn base_points(&self) -> i64 {
        self.base_points.max(0)
    }
}

/// Normalized identity of the skill a task exercises.
///
/// An explicit skill tag wins; otherwise the key is `"{category}-{task id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillKey(String);

impl SkillKey {
    pub fn for_task(task: &Task) -> Self {
        match task.skill.as_deref().map(str::trim) {
            Some(skill) if !skill.is_empty() => Self(skill.to_string()),
            _ => Self(format!("{}-{}", task.category_key(), task.id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SkillKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SkillKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum DifficultyTier {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

impl DifficultyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Expert => "expert",
        }
    }

    pub fn is_challenging(&self) -> bool {
        matches!(self, Self::Hard | Self::Expert)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum MasteryLevel {
    #[default]
    New,
    Learning,
    Practiced,
    Mastered,
    Weakened,
}

impl MasteryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Practiced => "practiced",
            Self::Mastered => "mastered",
            Self::Weakened => "weakened",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakData {
    pub current_streak: u32,
    pub longest_streak: u32,
}

impl StreakData {
    pub fn new(current_streak: u32, longest_streak: u32) -> Self {
        Self {
            current_streak,
            longest_streak,
        }
    }

    /// Current streak relative to the best streak, in [0, 1].
    pub fn ratio(&self) -> f64 {
        // A current streak past the recorded best counts as the best, capping at 1.0.
        let longest = self.longest_streak.max(self.current_streak).max(1);
        f64::from(self.current_streak) / f64::from(longest)
    }
}

/// Round-half-away-from-zero, the single rounding rule for every points stage.
///
/// The value is first snapped to six decimals so that products such as
/// `100.0 * 1.265` (stored as `126.49999999999999`) round as their decimal
/// value would.
pub fn round_points(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let snapped = (value * 1e6).round() / 1e6;
    snapped.round() as i64
}

/// Whole days elapsed from `from` to `to`, truncated toward zero.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days()
}
