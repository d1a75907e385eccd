mod ids;
mod preferences;
mod progress;
mod roadmap;
mod stats;
mod streak;

pub use ids::{ParseIdError, RoadmapId, UserId};
pub use preferences::{PreferencesError, ReminderFrequency, StudyPreferences, StudyTime};
pub use progress::{PersistedProgress, ProgressError, ProgressRecord, ProgressStatus};
pub use roadmap::{DifficultyLevel, Roadmap, RoadmapError, RoadmapStep, SkillCategory};
pub use stats::UserStats;
pub use streak::{Streak, StreakError};
