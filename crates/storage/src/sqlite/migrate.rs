use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema: roadmaps, progress records with the
/// one-record-per-(user, roadmap) constraint, and the query indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS roadmaps (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT,
                    skill_name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    difficulty_level TEXT NOT NULL,
                    steps TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress (
                    user_id TEXT NOT NULL,
                    roadmap_id TEXT NOT NULL,
                    step_progress TEXT NOT NULL,
                    total_steps INTEGER NOT NULL CHECK (total_steps >= 0),
                    completed_steps INTEGER NOT NULL CHECK (completed_steps >= 0),
                    completion_percentage INTEGER NOT NULL
                        CHECK (completion_percentage BETWEEN 0 AND 100),
                    status TEXT NOT NULL,
                    started_at TEXT,
                    completed_at TEXT,
                    paused_at TEXT,
                    time_spent_minutes INTEGER NOT NULL CHECK (time_spent_minutes >= 0),
                    estimated_minutes_remaining INTEGER,
                    notes TEXT,
                    step_notes TEXT NOT NULL,
                    difficulty_rating REAL,
                    step_difficulties TEXT NOT NULL,
                    preferences TEXT NOT NULL,
                    streak_current INTEGER NOT NULL CHECK (streak_current >= 0),
                    streak_longest INTEGER NOT NULL
                        CHECK (streak_longest >= streak_current),
                    last_study_date TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, roadmap_id),
                    FOREIGN KEY (roadmap_id) REFERENCES roadmaps(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_user
                    ON progress(user_id, updated_at DESC);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_status
                    ON progress(status);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_last_study
                    ON progress(last_study_date);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
            .bind(1_i64)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
    }

    Ok(())
}
