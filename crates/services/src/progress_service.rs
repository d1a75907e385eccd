use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use roadmap_core::model::{
    ProgressRecord, ProgressStatus, RoadmapId, StudyPreferences, UserId, UserStats,
};
use roadmap_core::time::Clock;
use storage::repository::{ProgressRepository, RoadmapCatalog, StorageError};

use crate::error::ProgressServiceError;

/// The progress tracking engine.
///
/// Every mutating operation is a read-modify-write cycle: load the
/// record, run the derivation on it in `roadmap-core`, write it back.
/// Two concurrent mutations of the same pair race at the store with
/// last-writer-wins semantics; step toggles are idempotent per index
/// and streak math is day-granular, so collisions stay low-impact.
pub struct ProgressService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    roadmaps: Arc<dyn RoadmapCatalog>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        roadmaps: Arc<dyn RoadmapCatalog>,
    ) -> Self {
        Self {
            clock,
            progress,
            roadmaps,
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    //
    // ─── FIND OR CREATE ────────────────────────────────────────────────────────
    //

    /// Returns the learner's record for a roadmap, creating an empty
    /// one on first interaction.
    ///
    /// The create path races safely: when a concurrent call wins the
    /// insert, the store reports a conflict and this call re-fetches
    /// and returns the winning record instead of propagating the error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the catalog has
    /// no roadmap with this ID, or other storage errors.
    pub async fn find_or_create(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        if let Some(existing) = self.progress.get(user_id, roadmap_id).await? {
            return Ok(existing);
        }

        let step_count = self
            .roadmaps
            .step_count(roadmap_id)
            .await?
            .ok_or(StorageError::NotFound)?;

        let record = ProgressRecord::new(user_id, roadmap_id, step_count, self.clock.now());
        match self.progress.insert_new(&record).await {
            Ok(()) => {
                info!(%user_id, %roadmap_id, steps = step_count, "created progress record");
                Ok(record)
            }
            // Lost a concurrent first-interaction race; the stored
            // record is authoritative.
            Err(StorageError::Conflict) => {
                debug!(%user_id, %roadmap_id, "creation raced, returning existing record");
                Ok(self
                    .progress
                    .get(user_id, roadmap_id)
                    .await?
                    .ok_or(StorageError::NotFound)?)
            }
            Err(err) => Err(err.into()),
        }
    }

    //
    // ─── STEP COMPLETION ───────────────────────────────────────────────────────
    //

    /// Marks a step complete or incomplete, re-deriving counts,
    /// percentage, status, and streak, then persists the record.
    ///
    /// First interaction with a roadmap creates the record. An index
    /// past the roadmap's length extends the completion vector rather
    /// than erroring.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the load or write-back; the
    /// derivation itself cannot fail.
    pub async fn set_step_completion(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
        step_index: usize,
        completed: bool,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.find_or_create(user_id, roadmap_id).await?;
        record.set_step_completion(step_index, completed, self.clock.now());
        self.refresh_estimate(&mut record).await?;
        self.progress.upsert(&record).await?;

        debug!(
            %user_id,
            %roadmap_id,
            step_index,
            completed,
            percentage = record.completion_percentage(),
            status = record.status().as_str(),
            "step completion recorded"
        );
        Ok(record)
    }

    /// Re-derives the catalog-based time estimate for the record.
    async fn refresh_estimate(
        &self,
        record: &mut ProgressRecord,
    ) -> Result<(), ProgressServiceError> {
        if let Some(roadmap) = self.roadmaps.get_roadmap(record.roadmap_id()).await? {
            let estimate = roadmap.estimated_minutes_remaining(record.step_progress());
            record.set_estimated_minutes_remaining(estimate);
        }
        Ok(())
    }

    //
    // ─── TIME & ANNOTATIONS ────────────────────────────────────────────────────
    //

    /// Adds study minutes to an existing record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the pair has no
    /// record; time logging never creates one.
    pub async fn add_study_time(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
        minutes: u32,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.add_study_time(minutes, self.clock.now());
        self.progress.upsert(&record).await?;
        Ok(record)
    }

    /// Replaces the overall notes on an existing record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the pair has no
    /// record.
    pub async fn set_notes(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
        notes: impl Into<String> + Send,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.set_notes(notes, self.clock.now());
        self.progress.upsert(&record).await?;
        Ok(record)
    }

    /// Attaches a note to one step, overwriting any previous note for
    /// that index.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the pair has no
    /// record.
    pub async fn add_step_note(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
        step_index: u32,
        note: impl Into<String> + Send,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.add_step_note(step_index, note, self.clock.now());
        self.progress.upsert(&record).await?;
        Ok(record)
    }

    /// Sets the learner's overall difficulty rating for the roadmap.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::DifficultyOutOfRange` (wrapped) for a
    /// rating outside 1.0–5.0, or `StorageError::NotFound` when the
    /// pair has no record.
    pub async fn rate_difficulty(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
        rating: f32,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.rate_difficulty(rating, self.clock.now())?;
        self.progress.upsert(&record).await?;
        Ok(record)
    }

    /// Sets the difficulty rating for one step.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the pair has no
    /// record.
    pub async fn rate_step_difficulty(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
        step_index: u32,
        rating: f32,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.rate_step_difficulty(step_index, rating, self.clock.now());
        self.progress.upsert(&record).await?;
        Ok(record)
    }

    /// Replaces the per-roadmap study preferences.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the pair has no
    /// record.
    pub async fn set_preferences(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
        preferences: StudyPreferences,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.set_preferences(preferences, self.clock.now());
        self.progress.upsert(&record).await?;
        Ok(record)
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Explicitly pauses a roadmap. The derivation rule never pauses on
    /// its own; this operation is the only source of the paused state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the pair has no
    /// record.
    pub async fn pause(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.pause(self.clock.now());
        self.progress.upsert(&record).await?;
        info!(%user_id, %roadmap_id, "roadmap paused");
        Ok(record)
    }

    /// Resumes a paused roadmap, re-deriving its status from the
    /// completion percentage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the pair has no
    /// record.
    pub async fn resume(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.resume(self.clock.now());
        self.progress.upsert(&record).await?;
        info!(%user_id, %roadmap_id, status = record.status().as_str(), "roadmap resumed");
        Ok(record)
    }

    /// Resets a roadmap's progression: all steps incomplete, derived
    /// fields recomputed, start/completion timestamps cleared. Time
    /// spent, streak history, notes, and ratings survive.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` (wrapped) when the pair has no
    /// record.
    pub async fn reset(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let mut record = self.load(user_id, roadmap_id).await?;
        record.reset(self.clock.now());
        self.refresh_estimate(&mut record).await?;
        self.progress.upsert(&record).await?;
        info!(%user_id, %roadmap_id, "roadmap progress reset");
        Ok(record)
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    /// A learner's not-yet-finished roadmaps, most recently updated
    /// first.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying query.
    pub async fn active_roadmaps(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProgressRecord>, ProgressServiceError> {
        let records = self
            .progress
            .list_by_user(
                user_id,
                Some(&[ProgressStatus::NotStarted, ProgressStatus::InProgress]),
            )
            .await?;
        Ok(records)
    }

    /// Aggregate statistics across all of a learner's roadmaps; the
    /// zero struct when there are none.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying query.
    pub async fn user_stats(&self, user_id: UserId) -> Result<UserStats, ProgressServiceError> {
        let records = self.progress.list_by_user(user_id, None).await?;
        Ok(UserStats::from_records(&records))
    }

    async fn load(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        Ok(self
            .progress
            .get(user_id, roadmap_id)
            .await?
            .ok_or(StorageError::NotFound)?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use roadmap_core::model::{
        DifficultyLevel, ProgressError, Roadmap, RoadmapStep, SkillCategory,
    };
    use roadmap_core::time::{fixed_clock, fixed_now};
    use std::sync::atomic::{AtomicBool, Ordering};
    use storage::repository::InMemoryRepository;

    fn build_roadmap(steps: usize, estimated_minutes: Option<u32>) -> Roadmap {
        let steps = (0..steps)
            .map(|i| RoadmapStep {
                title: format!("Step {i}"),
                description: String::new(),
                resources: Vec::new(),
                estimated_minutes,
            })
            .collect();
        Roadmap::new(
            RoadmapId::generate(),
            "Guitar Fundamentals",
            None,
            "Guitar",
            SkillCategory::Creative,
            DifficultyLevel::Beginner,
            steps,
            fixed_now(),
        )
        .unwrap()
    }

    fn build_service(repo: &InMemoryRepository, clock: Clock) -> ProgressService {
        ProgressService::new(clock, Arc::new(repo.clone()), Arc::new(repo.clone()))
    }

    async fn seed_roadmap(repo: &InMemoryRepository, steps: usize) -> Roadmap {
        let roadmap = build_roadmap(steps, Some(60));
        repo.upsert_roadmap(&roadmap).await.unwrap();
        roadmap
    }

    #[tokio::test]
    async fn find_or_create_requires_a_catalog_entry() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());

        let err = service
            .find_or_create(UserId::generate(), RoadmapId::generate())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::Storage(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn find_or_create_is_stable_across_calls() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());
        let roadmap = seed_roadmap(&repo, 4).await;
        let user = UserId::generate();

        let first = service.find_or_create(user, roadmap.id()).await.unwrap();
        assert_eq!(first.total_steps(), 4);
        assert_eq!(first.status(), ProgressStatus::NotStarted);

        let second = service.find_or_create(user, roadmap.id()).await.unwrap();
        assert_eq!(second, first);
    }

    /// Progress repository whose first `get` misses, simulating the
    /// window where two first-time calls race: the loser's initial
    /// lookup sees nothing, its insert conflicts, and recovery must
    /// return the winner's record.
    #[derive(Clone)]
    struct FirstGetMisses {
        inner: InMemoryRepository,
        missed: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ProgressRepository for FirstGetMisses {
        async fn insert_new(&self, record: &ProgressRecord) -> Result<(), StorageError> {
            self.inner.insert_new(record).await
        }

        async fn upsert(&self, record: &ProgressRecord) -> Result<(), StorageError> {
            self.inner.upsert(record).await
        }

        async fn get(
            &self,
            user_id: UserId,
            roadmap_id: RoadmapId,
        ) -> Result<Option<ProgressRecord>, StorageError> {
            if !self.missed.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get(user_id, roadmap_id).await
        }

        async fn list_by_user(
            &self,
            user_id: UserId,
            statuses: Option<&[ProgressStatus]>,
        ) -> Result<Vec<ProgressRecord>, StorageError> {
            self.inner.list_by_user(user_id, statuses).await
        }
    }

    #[tokio::test]
    async fn find_or_create_recovers_from_a_creation_race() {
        let repo = InMemoryRepository::new();
        let roadmap = seed_roadmap(&repo, 3).await;
        let user = UserId::generate();

        // The "winner" already persisted a record with progress.
        let mut winner = ProgressRecord::new(user, roadmap.id(), 3, fixed_now());
        winner.set_step_completion(0, true, fixed_now());
        repo.insert_new(&winner).await.unwrap();

        let racing = FirstGetMisses {
            inner: repo.clone(),
            missed: Arc::new(AtomicBool::new(false)),
        };
        let service = ProgressService::new(
            fixed_clock(),
            Arc::new(racing),
            Arc::new(repo.clone()),
        );

        let resolved = service.find_or_create(user, roadmap.id()).await.unwrap();
        assert_eq!(resolved, winner);
    }

    #[tokio::test]
    async fn first_step_completion_creates_the_record() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());
        let roadmap = seed_roadmap(&repo, 4).await;
        let user = UserId::generate();

        let record = service
            .set_step_completion(user, roadmap.id(), 0, true)
            .await
            .unwrap();

        assert_eq!(record.status(), ProgressStatus::InProgress);
        assert_eq!(record.completion_percentage(), 25);
        assert_eq!(record.streak().current(), 1);
        // Three 60-minute steps left.
        assert_eq!(record.estimated_minutes_remaining(), Some(180));

        let stored = repo.get(user, roadmap.id()).await.unwrap().unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn estimate_is_absent_without_catalog_estimates() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());
        let roadmap = build_roadmap(3, None);
        repo.upsert_roadmap(&roadmap).await.unwrap();

        let record = service
            .set_step_completion(UserId::generate(), roadmap.id(), 0, true)
            .await
            .unwrap();
        assert_eq!(record.estimated_minutes_remaining(), None);
    }

    #[tokio::test]
    async fn annotations_require_an_existing_record() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());
        let roadmap = seed_roadmap(&repo, 2).await;
        let user = UserId::generate();

        let err = service
            .add_step_note(user, roadmap.id(), 0, "missing")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::Storage(StorageError::NotFound)
        ));

        let err = service
            .add_study_time(user, roadmap.id(), 30)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::Storage(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn rate_difficulty_validates_range() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());
        let roadmap = seed_roadmap(&repo, 2).await;
        let user = UserId::generate();
        service.find_or_create(user, roadmap.id()).await.unwrap();

        let err = service
            .rate_difficulty(user, roadmap.id(), 6.0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::Progress(ProgressError::DifficultyOutOfRange { .. })
        ));

        let record = service
            .rate_difficulty(user, roadmap.id(), 2.5)
            .await
            .unwrap();
        assert_eq!(record.difficulty_rating(), Some(2.5));
    }

    #[tokio::test]
    async fn streak_extends_across_consecutive_days() {
        let repo = InMemoryRepository::new();
        let roadmap = seed_roadmap(&repo, 5).await;
        let user = UserId::generate();

        let day_one = build_service(&repo, fixed_clock());
        day_one
            .set_step_completion(user, roadmap.id(), 0, true)
            .await
            .unwrap();

        let day_two = build_service(
            &repo,
            Clock::fixed(fixed_now() + Duration::days(1)),
        );
        let record = day_two
            .set_step_completion(user, roadmap.id(), 1, true)
            .await
            .unwrap();
        assert_eq!(record.streak().current(), 2);

        // A three-day gap resets the run but not the record.
        let after_gap = build_service(
            &repo,
            Clock::fixed(fixed_now() + Duration::days(4)),
        );
        let record = after_gap
            .set_step_completion(user, roadmap.id(), 2, true)
            .await
            .unwrap();
        assert_eq!(record.streak().current(), 1);
        assert_eq!(record.streak().longest(), 2);
    }

    #[tokio::test]
    async fn pause_resume_and_reset_round_trip() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());
        let roadmap = seed_roadmap(&repo, 2).await;
        let user = UserId::generate();

        service
            .set_step_completion(user, roadmap.id(), 0, true)
            .await
            .unwrap();

        let paused = service.pause(user, roadmap.id()).await.unwrap();
        assert_eq!(paused.status(), ProgressStatus::Paused);
        assert!(paused.paused_at().is_some());

        let resumed = service.resume(user, roadmap.id()).await.unwrap();
        assert_eq!(resumed.status(), ProgressStatus::InProgress);

        service
            .add_study_time(user, roadmap.id(), 50)
            .await
            .unwrap();
        let reset = service.reset(user, roadmap.id()).await.unwrap();
        assert_eq!(reset.status(), ProgressStatus::NotStarted);
        assert_eq!(reset.completed_steps(), 0);
        assert!(reset.started_at().is_none());
        assert_eq!(reset.time_spent_minutes(), 50);
        // The full roadmap is ahead of the learner again.
        assert_eq!(reset.estimated_minutes_remaining(), Some(120));
    }

    #[tokio::test]
    async fn active_roadmaps_excludes_finished_and_paused() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());
        let user = UserId::generate();

        let active = seed_roadmap(&repo, 2).await;
        service
            .set_step_completion(user, active.id(), 0, true)
            .await
            .unwrap();

        let finished = seed_roadmap(&repo, 1).await;
        service
            .set_step_completion(user, finished.id(), 0, true)
            .await
            .unwrap();

        let paused = seed_roadmap(&repo, 2).await;
        service.find_or_create(user, paused.id()).await.unwrap();
        service.pause(user, paused.id()).await.unwrap();

        let listed = service.active_roadmaps(user).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].roadmap_id(), active.id());
    }

    #[tokio::test]
    async fn user_stats_are_zero_for_unknown_users() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());

        let stats = service.user_stats(UserId::generate()).await.unwrap();
        assert_eq!(stats.total_roadmaps(), 0);
        assert_eq!(stats.completed_steps(), 0);
        assert_eq!(stats.average_completion(), 0.0);
        assert_eq!(stats.time_spent_minutes(), 0);
        assert_eq!(stats.best_streak(), 0);
    }

    #[tokio::test]
    async fn user_stats_aggregate_across_roadmaps() {
        let repo = InMemoryRepository::new();
        let service = build_service(&repo, fixed_clock());
        let user = UserId::generate();

        let first = seed_roadmap(&repo, 1).await;
        service
            .set_step_completion(user, first.id(), 0, true)
            .await
            .unwrap();
        service.add_study_time(user, first.id(), 30).await.unwrap();

        let second = seed_roadmap(&repo, 4).await;
        service
            .set_step_completion(user, second.id(), 0, true)
            .await
            .unwrap();

        let stats = service.user_stats(user).await.unwrap();
        assert_eq!(stats.total_roadmaps(), 2);
        assert_eq!(stats.completed_steps(), 2);
        // 100% and 25% average to 62.5%.
        assert!((stats.average_completion() - 62.5).abs() < f64::EPSILON);
        assert_eq!(stats.time_spent_minutes(), 30);
        assert_eq!(stats.best_streak(), 1);
    }
}
