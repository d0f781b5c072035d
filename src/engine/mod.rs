pub mod config;
pub mod difficulty;
pub mod integrator;
pub mod performance;
pub mod queue;
pub mod scheduler;
pub mod strength;
pub mod types;

pub use config::EngineConfig;
pub use integrator::{AdaptiveEngine, CompletionInput, CompletionResult, TaskWithDifficulty, UnifiedTaskDifficulty};
pub use performance::{initialize_performance_profile, UserPerformanceProfile};
pub use queue::{DailyReviewQueue, ReviewQueueItem, ReviewType};
pub use scheduler::ReviewItem;
pub use strength::SkillStrength;
pub use types::{DifficultyTier, ImpactTier, MasteryLevel, SkillKey, StreakData, Task};
