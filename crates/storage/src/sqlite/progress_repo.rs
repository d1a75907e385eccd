use roadmap_core::model::{ProgressRecord, ProgressStatus, RoadmapId, UserId};

use super::{SqliteRepository, mapping};
use crate::repository::{ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = r"
    user_id, roadmap_id, step_progress, total_steps, completed_steps,
    completion_percentage, status, started_at, completed_at, paused_at,
    time_spent_minutes, estimated_minutes_remaining, notes, step_notes,
    difficulty_rating, step_difficulties, preferences, streak_current,
    streak_longest, last_study_date, created_at, updated_at
";

fn bind_record<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    record: &ProgressRecord,
) -> Result<sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>, StorageError>
{
    let parts = record.to_persisted();
    Ok(query
        .bind(parts.user_id.to_string())
        .bind(parts.roadmap_id.to_string())
        .bind(mapping::to_json(&parts.step_progress)?)
        .bind(i64::try_from(parts.total_steps).map_err(mapping::ser)?)
        .bind(i64::from(parts.completed_steps))
        .bind(i64::from(parts.completion_percentage))
        .bind(parts.status.as_str())
        .bind(parts.started_at)
        .bind(parts.completed_at)
        .bind(parts.paused_at)
        .bind(i64::from(parts.time_spent_minutes))
        .bind(parts.estimated_minutes_remaining.map(i64::from))
        .bind(parts.notes)
        .bind(mapping::to_json(&parts.step_notes)?)
        .bind(parts.difficulty_rating)
        .bind(mapping::to_json(&parts.step_difficulties)?)
        .bind(mapping::to_json(&parts.preferences)?)
        .bind(i64::from(parts.streak_current))
        .bind(i64::from(parts.streak_longest))
        .bind(parts.last_study_date)
        .bind(parts.created_at)
        .bind(parts.updated_at))
}

fn connection_or_conflict(e: sqlx::Error) -> StorageError {
    if e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        StorageError::Conflict
    } else {
        StorageError::Connection(e.to_string())
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn insert_new(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let sql = format!(
            r"
            INSERT INTO progress ({PROGRESS_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                    ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            "
        );
        bind_record(sqlx::query(&sql), record)?
            .execute(&self.pool)
            .await
            .map_err(connection_or_conflict)?;
        Ok(())
    }

    async fn upsert(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let sql = format!(
            r"
            INSERT INTO progress ({PROGRESS_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                    ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            ON CONFLICT(user_id, roadmap_id) DO UPDATE SET
                -- keep created_at from the original insert; only update mutable fields
                step_progress = excluded.step_progress,
                total_steps = excluded.total_steps,
                completed_steps = excluded.completed_steps,
                completion_percentage = excluded.completion_percentage,
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                paused_at = excluded.paused_at,
                time_spent_minutes = excluded.time_spent_minutes,
                estimated_minutes_remaining = excluded.estimated_minutes_remaining,
                notes = excluded.notes,
                step_notes = excluded.step_notes,
                difficulty_rating = excluded.difficulty_rating,
                step_difficulties = excluded.step_difficulties,
                preferences = excluded.preferences,
                streak_current = excluded.streak_current,
                streak_longest = excluded.streak_longest,
                last_study_date = excluded.last_study_date,
                updated_at = excluded.updated_at
            "
        );
        bind_record(sqlx::query(&sql), record)?
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn get(
        &self,
        user_id: UserId,
        roadmap_id: RoadmapId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let sql = format!(
            r"
            SELECT {PROGRESS_COLUMNS}
            FROM progress
            WHERE user_id = ?1 AND roadmap_id = ?2
            "
        );
        let row = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(roadmap_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(mapping::map_progress_row).transpose()
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        statuses: Option<&[ProgressStatus]>,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let mut sql = format!(
            r"
            SELECT {PROGRESS_COLUMNS}
            FROM progress
            WHERE user_id = ?1
            "
        );

        if let Some(wanted) = statuses {
            if wanted.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str("AND status IN (");
            for i in 0..wanted.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
                sql.push_str(&(i + 2).to_string());
            }
            sql.push_str(")\n");
        }
        sql.push_str("ORDER BY updated_at DESC\n");

        let mut query = sqlx::query(&sql).bind(user_id.to_string());
        if let Some(wanted) = statuses {
            for status in wanted {
                query = query.bind(status.as_str());
            }
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(mapping::map_progress_row).collect()
    }
}
