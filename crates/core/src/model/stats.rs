use crate::model::progress::ProgressRecord;

/// Aggregate learning statistics across all of one user's records.
///
/// Built purely from a slice of records so the aggregation is testable
/// without a store; a user with no records gets the zero struct, never
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UserStats {
    total_roadmaps: u32,
    completed_steps: u32,
    average_completion: f64,
    time_spent_minutes: u64,
    best_streak: u32,
}

impl UserStats {
    /// Aggregates counts across the given records.
    #[must_use]
    pub fn from_records(records: &[ProgressRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let mut completed_steps = 0_u32;
        let mut percentage_sum = 0_u64;
        let mut time_spent_minutes = 0_u64;
        let mut best_streak = 0_u32;

        for record in records {
            completed_steps = completed_steps.saturating_add(record.completed_steps());
            percentage_sum += u64::from(record.completion_percentage());
            time_spent_minutes += u64::from(record.time_spent_minutes());
            best_streak = best_streak.max(record.streak().longest());
        }

        #[allow(clippy::cast_precision_loss)]
        let average_completion = percentage_sum as f64 / records.len() as f64;

        Self {
            total_roadmaps: u32::try_from(records.len()).unwrap_or(u32::MAX),
            completed_steps,
            average_completion,
            time_spent_minutes,
            best_streak,
        }
    }

    #[must_use]
    pub fn total_roadmaps(&self) -> u32 {
        self.total_roadmaps
    }

    #[must_use]
    pub fn completed_steps(&self) -> u32 {
        self.completed_steps
    }

    /// Mean completion percentage across roadmaps, 0.0 with no records.
    #[must_use]
    pub fn average_completion(&self) -> f64 {
        self.average_completion
    }

    #[must_use]
    pub fn time_spent_minutes(&self) -> u64 {
        self.time_spent_minutes
    }

    #[must_use]
    pub fn best_streak(&self) -> u32 {
        self.best_streak
    }
}
