use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::ids::{RoadmapId, UserId};
use crate::model::preferences::StudyPreferences;
use crate::model::streak::{Streak, StreakError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("difficulty rating must be between 1.0 and 5.0, got {value}")]
    DifficultyOutOfRange { value: f32 },

    #[error("invalid persisted progress state: {0}")]
    InvalidPersistedState(String),

    #[error(transparent)]
    Streak(#[from] StreakError),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle status of a learner's progress through one roadmap.
///
/// `Paused` is only ever set by the explicit pause operation; the
/// derivation rule never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
    Paused,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Paused => "paused",
        }
    }

    /// True for statuses that show up on a learner's active list.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, ProgressStatus::NotStarted | ProgressStatus::InProgress)
    }
}

//
// ─── PERSISTED SHAPE ───────────────────────────────────────────────────────────
//

/// Field-for-field persisted shape of a progress record.
///
/// Storage backends fill this in and hand it to
/// [`ProgressRecord::from_persisted`], which re-checks the derivation
/// invariants before the record re-enters the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedProgress {
    pub user_id: UserId,
    pub roadmap_id: RoadmapId,
    pub step_progress: Vec<bool>,
    pub total_steps: usize,
    pub completed_steps: u32,
    pub completion_percentage: u8,
    pub status: ProgressStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: u32,
    pub estimated_minutes_remaining: Option<u32>,
    pub notes: Option<String>,
    pub step_notes: BTreeMap<u32, String>,
    pub difficulty_rating: Option<f32>,
    pub step_difficulties: BTreeMap<u32, f32>,
    pub preferences: StudyPreferences,
    pub streak_current: u32,
    pub streak_longest: u32,
    pub last_study_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// One learner's completion state for one roadmap.
///
/// All derived fields (`completed_steps`, `completion_percentage`,
/// `status`) are recomputed from `step_progress` by explicit method
/// calls; callers never set them directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    user_id: UserId,
    roadmap_id: RoadmapId,
    step_progress: Vec<bool>,
    total_steps: usize,
    completed_steps: u32,
    completion_percentage: u8,
    status: ProgressStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    time_spent_minutes: u32,
    estimated_minutes_remaining: Option<u32>,
    notes: Option<String>,
    step_notes: BTreeMap<u32, String>,
    difficulty_rating: Option<f32>,
    step_difficulties: BTreeMap<u32, f32>,
    preferences: StudyPreferences,
    streak: Streak,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Creates a fresh record for a roadmap with `step_count` steps,
    /// all incomplete.
    #[must_use]
    pub fn new(
        user_id: UserId,
        roadmap_id: RoadmapId,
        step_count: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            roadmap_id,
            step_progress: vec![false; step_count],
            total_steps: step_count,
            completed_steps: 0,
            completion_percentage: 0,
            status: ProgressStatus::NotStarted,
            started_at: None,
            completed_at: None,
            paused_at: None,
            time_spent_minutes: 0,
            estimated_minutes_remaining: None,
            notes: None,
            step_notes: BTreeMap::new(),
            difficulty_rating: None,
            step_difficulties: BTreeMap::new(),
            preferences: StudyPreferences::default_weekly(),
            streak: Streak::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrates a record from storage, re-checking every invariant
    /// the engine maintains.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` when the stored
    /// derived fields disagree with `step_progress`, or
    /// `ProgressError::Streak` when the streak counters are inconsistent.
    pub fn from_persisted(parts: PersistedProgress) -> Result<Self, ProgressError> {
        if parts.step_progress.len() != parts.total_steps {
            return Err(ProgressError::InvalidPersistedState(format!(
                "step_progress has {} entries but total_steps is {}",
                parts.step_progress.len(),
                parts.total_steps
            )));
        }

        let counted = count_completed(&parts.step_progress);
        if counted != parts.completed_steps {
            return Err(ProgressError::InvalidPersistedState(format!(
                "completed_steps is {} but {} steps are marked complete",
                parts.completed_steps, counted
            )));
        }

        let percentage = percentage_of(parts.completed_steps, parts.total_steps);
        if percentage != parts.completion_percentage {
            return Err(ProgressError::InvalidPersistedState(format!(
                "completion_percentage is {} but derives to {percentage}",
                parts.completion_percentage
            )));
        }

        let completed = parts.status == ProgressStatus::Completed;
        if completed != (percentage == 100) {
            return Err(ProgressError::InvalidPersistedState(format!(
                "status {} does not match completion percentage {percentage}",
                parts.status.as_str()
            )));
        }

        if let Some(value) = parts.difficulty_rating {
            validate_difficulty(value)?;
        }

        let streak = Streak::from_persisted(
            parts.streak_current,
            parts.streak_longest,
            parts.last_study_date,
        )?;

        Ok(Self {
            user_id: parts.user_id,
            roadmap_id: parts.roadmap_id,
            step_progress: parts.step_progress,
            total_steps: parts.total_steps,
            completed_steps: parts.completed_steps,
            completion_percentage: parts.completion_percentage,
            status: parts.status,
            started_at: parts.started_at,
            completed_at: parts.completed_at,
            paused_at: parts.paused_at,
            time_spent_minutes: parts.time_spent_minutes,
            estimated_minutes_remaining: parts.estimated_minutes_remaining,
            notes: parts.notes,
            step_notes: parts.step_notes,
            difficulty_rating: parts.difficulty_rating,
            step_difficulties: parts.step_difficulties,
            preferences: parts.preferences,
            streak,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        })
    }

    /// Converts the record back into its persisted shape.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedProgress {
        PersistedProgress {
            user_id: self.user_id,
            roadmap_id: self.roadmap_id,
            step_progress: self.step_progress.clone(),
            total_steps: self.total_steps,
            completed_steps: self.completed_steps,
            completion_percentage: self.completion_percentage,
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            paused_at: self.paused_at,
            time_spent_minutes: self.time_spent_minutes,
            estimated_minutes_remaining: self.estimated_minutes_remaining,
            notes: self.notes.clone(),
            step_notes: self.step_notes.clone(),
            difficulty_rating: self.difficulty_rating,
            step_difficulties: self.step_difficulties.clone(),
            preferences: self.preferences,
            streak_current: self.streak.current(),
            streak_longest: self.streak.longest(),
            last_study_date: self.streak.last_study_date(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    //
    // ─── STEP COMPLETION ───────────────────────────────────────────────────────
    //

    /// Marks one step complete or incomplete and re-derives everything.
    ///
    /// An index past the end extends `step_progress` with incomplete
    /// entries (and grows `total_steps` to match) rather than erroring;
    /// a roadmap may have grown since this record was created. The
    /// sequence is never truncated.
    ///
    /// The streak is touched on every call, which keeps the operation
    /// idempotent within a calendar day: the same-day guard absorbs
    /// repeats.
    pub fn set_step_completion(&mut self, step_index: usize, completed: bool, now: DateTime<Utc>) {
        if step_index >= self.step_progress.len() {
            self.step_progress.resize(step_index + 1, false);
            self.total_steps = self.step_progress.len();
        }
        self.step_progress[step_index] = completed;

        self.recompute_derived(now);
        self.streak.record(now.date_naive());
        self.updated_at = now;
    }

    /// Recomputes `completed_steps`, `completion_percentage`, and
    /// `status` from scratch. Counting from scratch rather than
    /// incrementally keeps the counts exact under out-of-order or
    /// repeated calls.
    fn recompute_derived(&mut self, now: DateTime<Utc>) {
        self.completed_steps = count_completed(&self.step_progress);
        self.completion_percentage = percentage_of(self.completed_steps, self.total_steps);

        match self.completion_percentage {
            100 => {
                self.status = ProgressStatus::Completed;
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
            }
            0 => {
                if self.status != ProgressStatus::Paused {
                    self.status = ProgressStatus::NotStarted;
                }
            }
            _ => match self.status {
                ProgressStatus::NotStarted => {
                    self.status = ProgressStatus::InProgress;
                    if self.started_at.is_none() {
                        self.started_at = Some(now);
                    }
                }
                // A step was unchecked after completion; completed_at
                // stays as a historical marker.
                ProgressStatus::Completed => {
                    self.status = ProgressStatus::InProgress;
                }
                ProgressStatus::InProgress | ProgressStatus::Paused => {}
            },
        }
    }

    //
    // ─── TIME & ANNOTATIONS ────────────────────────────────────────────────────
    //

    /// Adds study minutes. `time_spent_minutes` only ever grows; the
    /// streak and status are untouched.
    pub fn add_study_time(&mut self, minutes: u32, now: DateTime<Utc>) {
        self.time_spent_minutes = self.time_spent_minutes.saturating_add(minutes);
        self.updated_at = now;
    }

    /// Replaces the overall free-text notes.
    pub fn set_notes(&mut self, notes: impl Into<String>, now: DateTime<Utc>) {
        self.notes = Some(notes.into());
        self.updated_at = now;
    }

    /// Sets the note for one step, overwriting any existing entry.
    pub fn add_step_note(&mut self, step_index: u32, note: impl Into<String>, now: DateTime<Utc>) {
        self.step_notes.insert(step_index, note.into());
        self.updated_at = now;
    }

    /// Sets the learner's overall difficulty rating.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::DifficultyOutOfRange` unless
    /// `1.0 <= rating <= 5.0`.
    pub fn rate_difficulty(&mut self, rating: f32, now: DateTime<Utc>) -> Result<(), ProgressError> {
        validate_difficulty(rating)?;
        self.difficulty_rating = Some(rating);
        self.updated_at = now;
        Ok(())
    }

    /// Sets the difficulty rating for one step, overwriting any
    /// existing entry. Per-step ratings are stored as given; only the
    /// overall rating is range-checked.
    pub fn rate_step_difficulty(&mut self, step_index: u32, rating: f32, now: DateTime<Utc>) {
        self.step_difficulties.insert(step_index, rating);
        self.updated_at = now;
    }

    /// Replaces the per-roadmap study preferences.
    pub fn set_preferences(&mut self, preferences: StudyPreferences, now: DateTime<Utc>) {
        self.preferences = preferences;
        self.updated_at = now;
    }

    /// Updates the cached catalog-derived time estimate.
    pub fn set_estimated_minutes_remaining(&mut self, estimate: Option<u32>) {
        self.estimated_minutes_remaining = estimate;
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Explicitly pauses the roadmap. Pausing a completed roadmap is a
    /// no-op. `paused_at` records the first pause and keeps that value
    /// across later pauses.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.status == ProgressStatus::Completed {
            return;
        }
        self.status = ProgressStatus::Paused;
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
        self.updated_at = now;
    }

    /// Leaves the paused state, re-deriving the status from the current
    /// completion percentage. Has no effect on records that are not
    /// paused.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.status != ProgressStatus::Paused {
            return;
        }
        self.status = ProgressStatus::NotStarted;
        self.recompute_derived(now);
        self.updated_at = now;
    }

    /// Resets progression: every step back to incomplete, derived
    /// fields recomputed, `started_at`/`completed_at` cleared.
    ///
    /// Engagement history survives a reset: time spent, the streak,
    /// notes, and difficulty ratings all keep their values. A paused
    /// record comes back as `NotStarted`; `paused_at` keeps its
    /// first-pause timestamp.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.step_progress = vec![false; self.total_steps];
        self.started_at = None;
        self.completed_at = None;
        self.status = ProgressStatus::NotStarted;
        self.recompute_derived(now);
        self.updated_at = now;
    }

    //
    // ─── GETTERS ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn roadmap_id(&self) -> RoadmapId {
        self.roadmap_id
    }

    #[must_use]
    pub fn step_progress(&self) -> &[bool] {
        &self.step_progress
    }

    /// Whether the given step is complete. Out-of-range indices read as
    /// incomplete.
    #[must_use]
    pub fn is_step_completed(&self, step_index: usize) -> bool {
        self.step_progress.get(step_index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    #[must_use]
    pub fn completed_steps(&self) -> u32 {
        self.completed_steps
    }

    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        self.completion_percentage
    }

    #[must_use]
    pub fn status(&self) -> ProgressStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        self.paused_at
    }

    #[must_use]
    pub fn time_spent_minutes(&self) -> u32 {
        self.time_spent_minutes
    }

    #[must_use]
    pub fn estimated_minutes_remaining(&self) -> Option<u32> {
        self.estimated_minutes_remaining
    }

    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    #[must_use]
    pub fn step_notes(&self) -> &BTreeMap<u32, String> {
        &self.step_notes
    }

    #[must_use]
    pub fn difficulty_rating(&self) -> Option<f32> {
        self.difficulty_rating
    }

    #[must_use]
    pub fn step_difficulties(&self) -> &BTreeMap<u32, f32> {
        &self.step_difficulties
    }

    #[must_use]
    pub fn preferences(&self) -> &StudyPreferences {
        &self.preferences
    }

    #[must_use]
    pub fn streak(&self) -> &Streak {
        &self.streak
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

//
// ─── DERIVATION HELPERS ────────────────────────────────────────────────────────
//

fn count_completed(step_progress: &[bool]) -> u32 {
    u32::try_from(step_progress.iter().filter(|done| **done).count()).unwrap_or(u32::MAX)
}

/// Completion percentage, rounded half away from zero. Zero steps means
/// zero percent.
fn percentage_of(completed: u32, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = f64::from(completed) * 100.0 / total as f64;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        ratio.round() as u8
    }
}

fn validate_difficulty(value: f32) -> Result<(), ProgressError> {
    if !(1.0..=5.0).contains(&value) {
        return Err(ProgressError::DifficultyOutOfRange { value });
    }
    Ok(())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
