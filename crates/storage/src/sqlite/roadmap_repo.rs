use roadmap_core::model::{Roadmap, RoadmapId};

use super::{SqliteRepository, mapping};
use crate::repository::{RoadmapCatalog, StorageError};

#[async_trait::async_trait]
impl RoadmapCatalog for SqliteRepository {
    async fn upsert_roadmap(&self, roadmap: &Roadmap) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO roadmaps (
                id, title, description, skill_name, category, difficulty_level,
                steps, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                skill_name = excluded.skill_name,
                category = excluded.category,
                difficulty_level = excluded.difficulty_level,
                steps = excluded.steps
            ",
        )
        .bind(roadmap.id().to_string())
        .bind(roadmap.title().to_owned())
        .bind(roadmap.description().map(str::to_owned))
        .bind(roadmap.skill_name().to_owned())
        .bind(roadmap.category().as_str())
        .bind(roadmap.difficulty_level().as_str())
        .bind(mapping::to_json(&roadmap.steps().to_vec())?)
        .bind(roadmap.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_roadmap(&self, id: RoadmapId) -> Result<Option<Roadmap>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, description, skill_name, category, difficulty_level,
                   steps, created_at
            FROM roadmaps
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(mapping::map_roadmap_row).transpose()
    }

    async fn step_count(&self, id: RoadmapId) -> Result<Option<usize>, StorageError> {
        let roadmap = self.get_roadmap(id).await?;
        Ok(roadmap.map(|r| r.step_count()))
    }
}
