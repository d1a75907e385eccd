use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PreferencesError {
    #[error("weekly study goal must be at least one hour")]
    InvalidStudyGoal,
}

//
// ─── PREFERENCES ───────────────────────────────────────────────────────────────
//

/// How often the learner wants to be nudged about a roadmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderFrequency {
    Daily,
    Weekly,
    Monthly,
    Never,
}

/// Rough part of the day the learner prefers to study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyTime {
    Morning,
    Afternoon,
    Evening,
}

/// Per-roadmap study preferences.
///
/// Purely informational for the engine; only the weekly goal is
/// validated so downstream consumers can rely on it being positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPreferences {
    reminder_frequency: ReminderFrequency,
    study_goal_hours_per_week: u32,
    preferred_study_time: StudyTime,
}

impl StudyPreferences {
    /// Creates preferences, validating the weekly goal.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesError::InvalidStudyGoal` if the weekly goal
    /// is zero.
    pub fn new(
        reminder_frequency: ReminderFrequency,
        study_goal_hours_per_week: u32,
        preferred_study_time: StudyTime,
    ) -> Result<Self, PreferencesError> {
        if study_goal_hours_per_week == 0 {
            return Err(PreferencesError::InvalidStudyGoal);
        }
        Ok(Self {
            reminder_frequency,
            study_goal_hours_per_week,
            preferred_study_time,
        })
    }

    /// The defaults every new progress record starts with: a weekly
    /// reminder, five hours per week, evening study.
    #[must_use]
    pub fn default_weekly() -> Self {
        Self {
            reminder_frequency: ReminderFrequency::Weekly,
            study_goal_hours_per_week: 5,
            preferred_study_time: StudyTime::Evening,
        }
    }

    #[must_use]
    pub fn reminder_frequency(&self) -> ReminderFrequency {
        self.reminder_frequency
    }

    #[must_use]
    pub fn study_goal_hours_per_week(&self) -> u32 {
        self.study_goal_hours_per_week
    }

    #[must_use]
    pub fn preferred_study_time(&self) -> StudyTime {
        self.preferred_study_time
    }
}

impl Default for StudyPreferences {
    fn default() -> Self {
        Self::default_weekly()
    }
}
