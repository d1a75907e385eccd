use async_trait::async_trait;
use roadmap_core::model::{ProgressRecord, ProgressStatus, Roadmap, RoadmapId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for progress records.
///
/// One record exists per `(user, roadmap)` pair; the backend enforces
/// that uniqueness, not the caller.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist a brand-new record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a record for the pair
    /// already exists, or other storage errors.
    async fn insert_new(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Write back a record loaded earlier in the same operation.
    ///
    /// Last writer wins; there is no version check.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Fetch the record for a `(user, roadmap)` pair.
    ///
    /// Returns `Ok(None)` when the pair has no record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// List a user's records, most recently updated first, optionally
    /// restricted to the given statuses.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_by_user(
        &self,
        user_id: UserId,
        statuses: Option<&[ProgressStatus]>,
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

/// Read contract against the roadmap catalog.
///
/// The engine only ever needs step counts and per-step time estimates;
/// the catalog's content is owned elsewhere.
#[async_trait]
pub trait RoadmapCatalog: Send + Sync {
    /// Persist or update a roadmap definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the roadmap cannot be stored.
    async fn upsert_roadmap(&self, roadmap: &Roadmap) -> Result<(), StorageError>;

    /// Fetch a roadmap by ID. Returns `Ok(None)` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_roadmap(&self, id: RoadmapId) -> Result<Option<Roadmap>, StorageError>;

    /// Number of steps in a roadmap, `Ok(None)` when the roadmap is
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn step_count(&self, id: RoadmapId) -> Result<Option<usize>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(UserId, RoadmapId), ProgressRecord>>>,
    roadmaps: Arc<Mutex<HashMap<RoadmapId, Roadmap>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            progress: Arc::new(Mutex::new(HashMap::new())),
            roadmaps: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn insert_new(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (record.user_id(), record.roadmap_id());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.insert(key, record.clone());
        Ok(())
    }

    async fn upsert(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((record.user_id(), record.roadmap_id()), record.clone());
        Ok(())
    }

    async fn get(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(user_id, roadmap_id)).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        statuses: Option<&[ProgressStatus]>,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut records: Vec<ProgressRecord> = guard
            .values()
            .filter(|record| record.user_id() == user_id)
            .filter(|record| {
                statuses.is_none_or(|wanted| wanted.contains(&record.status()))
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        Ok(records)
    }
}

#[async_trait]
impl RoadmapCatalog for InMemoryRepository {
    async fn upsert_roadmap(&self, roadmap: &Roadmap) -> Result<(), StorageError> {
        let mut guard = self
            .roadmaps
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(roadmap.id(), roadmap.clone());
        Ok(())
    }

    async fn get_roadmap(&self, id: RoadmapId) -> Result<Option<Roadmap>, StorageError> {
        let guard = self
            .roadmaps
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn step_count(&self, id: RoadmapId) -> Result<Option<usize>, StorageError> {
        let guard = self
            .roadmaps
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).map(Roadmap::step_count))
    }
}

/// Aggregates the progress store and roadmap catalog behind trait
/// objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub roadmaps: Arc<dyn RoadmapCatalog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let roadmaps: Arc<dyn RoadmapCatalog> = Arc::new(repo);
        Self { progress, roadmaps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use roadmap_core::model::{DifficultyLevel, RoadmapStep, SkillCategory};
    use roadmap_core::time::fixed_now;

    fn build_roadmap(steps: usize) -> Roadmap {
        let steps = (0..steps)
            .map(|i| RoadmapStep {
                title: format!("Step {i}"),
                description: String::new(),
                resources: Vec::new(),
                estimated_minutes: Some(30),
            })
            .collect();
        Roadmap::new(
            RoadmapId::generate(),
            "Watercolor Basics",
            None,
            "Watercolor",
            SkillCategory::Creative,
            DifficultyLevel::Beginner,
            steps,
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn round_trips_progress_with_derived_fields() {
        let repo = InMemoryRepository::new();
        let user = UserId::generate();
        let roadmap = build_roadmap(3);
        repo.upsert_roadmap(&roadmap).await.unwrap();

        let mut record = ProgressRecord::new(user, roadmap.id(), 3, fixed_now());
        record.set_step_completion(0, true, fixed_now());
        repo.insert_new(&record).await.unwrap();

        let fetched = repo.get(user, roadmap.id()).await.unwrap().unwrap();
        assert_eq!(fetched.completed_steps(), 1);
        assert_eq!(fetched.completion_percentage(), 33);
        assert_eq!(fetched.streak().current(), 1);
    }

    #[tokio::test]
    async fn insert_new_rejects_duplicate_pairs() {
        let repo = InMemoryRepository::new();
        let record = ProgressRecord::new(UserId::generate(), RoadmapId::generate(), 2, fixed_now());
        repo.insert_new(&record).await.unwrap();

        let err = repo.insert_new(&record).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn list_by_user_filters_and_orders_by_recency() {
        let repo = InMemoryRepository::new();
        let user = UserId::generate();
        let now = fixed_now();

        let stale = ProgressRecord::new(user, RoadmapId::generate(), 2, now);
        repo.insert_new(&stale).await.unwrap();

        let mut fresh = ProgressRecord::new(user, RoadmapId::generate(), 2, now);
        fresh.set_step_completion(0, true, now + Duration::hours(1));
        repo.insert_new(&fresh).await.unwrap();

        let mut done = ProgressRecord::new(user, RoadmapId::generate(), 1, now);
        done.set_step_completion(0, true, now + Duration::hours(2));
        repo.insert_new(&done).await.unwrap();

        let active = repo
            .list_by_user(
                user,
                Some(&[ProgressStatus::NotStarted, ProgressStatus::InProgress]),
            )
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].roadmap_id(), fresh.roadmap_id());
        assert_eq!(active[1].roadmap_id(), stale.roadmap_id());

        let all = repo.list_by_user(user, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].roadmap_id(), done.roadmap_id());
    }

    #[tokio::test]
    async fn step_count_reads_from_the_catalog() {
        let repo = InMemoryRepository::new();
        let roadmap = build_roadmap(4);
        repo.upsert_roadmap(&roadmap).await.unwrap();

        assert_eq!(repo.step_count(roadmap.id()).await.unwrap(), Some(4));
        assert_eq!(repo.step_count(RoadmapId::generate()).await.unwrap(), None);
    }
}
