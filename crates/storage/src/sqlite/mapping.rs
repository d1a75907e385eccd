use roadmap_core::model::{
    DifficultyLevel, PersistedProgress, ProgressRecord, ProgressStatus, Roadmap, RoadmapId,
    RoadmapStep, SkillCategory, UserId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn user_id_from_str(raw: &str) -> Result<UserId, StorageError> {
    raw.parse::<UserId>()
        .map_err(|_| StorageError::Serialization(format!("invalid user_id: {raw}")))
}

pub(crate) fn roadmap_id_from_str(raw: &str) -> Result<RoadmapId, StorageError> {
    raw.parse::<RoadmapId>()
        .map_err(|_| StorageError::Serialization(format!("invalid roadmap_id: {raw}")))
}

pub(crate) fn parse_status(s: &str) -> Result<ProgressStatus, StorageError> {
    match s {
        "not_started" => Ok(ProgressStatus::NotStarted),
        "in_progress" => Ok(ProgressStatus::InProgress),
        "completed" => Ok(ProgressStatus::Completed),
        "paused" => Ok(ProgressStatus::Paused),
        _ => Err(StorageError::Serialization(format!("invalid status: {s}"))),
    }
}

pub(crate) fn parse_category(s: &str) -> Result<SkillCategory, StorageError> {
    match s {
        "technology" => Ok(SkillCategory::Technology),
        "creative" => Ok(SkillCategory::Creative),
        "business" => Ok(SkillCategory::Business),
        "health_wellness" => Ok(SkillCategory::HealthWellness),
        "academic" => Ok(SkillCategory::Academic),
        "lifestyle" => Ok(SkillCategory::Lifestyle),
        "custom" => Ok(SkillCategory::Custom),
        _ => Err(StorageError::Serialization(format!(
            "invalid category: {s}"
        ))),
    }
}

pub(crate) fn parse_difficulty_level(s: &str) -> Result<DifficultyLevel, StorageError> {
    match s {
        "beginner" => Ok(DifficultyLevel::Beginner),
        "intermediate" => Ok(DifficultyLevel::Intermediate),
        "advanced" => Ok(DifficultyLevel::Advanced),
        "expert" => Ok(DifficultyLevel::Expert),
        _ => Err(StorageError::Serialization(format!(
            "invalid difficulty_level: {s}"
        ))),
    }
}

/// Encodes a value into the JSON text columns used for vectors and
/// integer-keyed maps.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

pub(crate) fn from_json<T: DeserializeOwned>(
    field: &'static str,
    raw: &str,
) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field}: {e}")))
}

pub(crate) fn map_progress_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, StorageError> {
    let total_steps_i64: i64 = row.try_get("total_steps").map_err(ser)?;
    let total_steps = usize::try_from(total_steps_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid total_steps: {total_steps_i64}"))
    })?;

    let completed_steps_i64: i64 = row.try_get("completed_steps").map_err(ser)?;
    let completed_steps = u32::try_from(completed_steps_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid completed_steps: {completed_steps_i64}"))
    })?;

    let percentage_i64: i64 = row.try_get("completion_percentage").map_err(ser)?;
    let completion_percentage = u8::try_from(percentage_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid completion_percentage: {percentage_i64}"))
    })?;

    let time_spent_i64: i64 = row.try_get("time_spent_minutes").map_err(ser)?;
    let time_spent_minutes = u32::try_from(time_spent_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid time_spent_minutes: {time_spent_i64}"))
    })?;

    let estimate_i64: Option<i64> = row.try_get("estimated_minutes_remaining").map_err(ser)?;
    let estimated_minutes_remaining = estimate_i64
        .map(|v| {
            u32::try_from(v).map_err(|_| {
                StorageError::Serialization(format!("invalid estimated_minutes_remaining: {v}"))
            })
        })
        .transpose()?;

    let streak_current_i64: i64 = row.try_get("streak_current").map_err(ser)?;
    let streak_current = u32::try_from(streak_current_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid streak_current: {streak_current_i64}"))
    })?;

    let streak_longest_i64: i64 = row.try_get("streak_longest").map_err(ser)?;
    let streak_longest = u32::try_from(streak_longest_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid streak_longest: {streak_longest_i64}"))
    })?;

    let status_str: String = row.try_get("status").map_err(ser)?;

    let parts = PersistedProgress {
        user_id: user_id_from_str(row.try_get::<String, _>("user_id").map_err(ser)?.as_str())?,
        roadmap_id: roadmap_id_from_str(
            row.try_get::<String, _>("roadmap_id").map_err(ser)?.as_str(),
        )?,
        step_progress: from_json(
            "step_progress",
            row.try_get::<String, _>("step_progress").map_err(ser)?.as_str(),
        )?,
        total_steps,
        completed_steps,
        completion_percentage,
        status: parse_status(status_str.as_str())?,
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        paused_at: row.try_get("paused_at").map_err(ser)?,
        time_spent_minutes,
        estimated_minutes_remaining,
        notes: row.try_get("notes").map_err(ser)?,
        step_notes: from_json(
            "step_notes",
            row.try_get::<String, _>("step_notes").map_err(ser)?.as_str(),
        )?,
        difficulty_rating: row.try_get("difficulty_rating").map_err(ser)?,
        step_difficulties: from_json(
            "step_difficulties",
            row.try_get::<String, _>("step_difficulties")
                .map_err(ser)?
                .as_str(),
        )?,
        preferences: from_json(
            "preferences",
            row.try_get::<String, _>("preferences").map_err(ser)?.as_str(),
        )?,
        streak_current,
        streak_longest,
        last_study_date: row.try_get("last_study_date").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    };

    ProgressRecord::from_persisted(parts).map_err(ser)
}

pub(crate) fn map_roadmap_row(row: &sqlx::sqlite::SqliteRow) -> Result<Roadmap, StorageError> {
    let category_str: String = row.try_get("category").map_err(ser)?;
    let level_str: String = row.try_get("difficulty_level").map_err(ser)?;
    let steps: Vec<RoadmapStep> = from_json(
        "steps",
        row.try_get::<String, _>("steps").map_err(ser)?.as_str(),
    )?;

    Roadmap::new(
        roadmap_id_from_str(row.try_get::<String, _>("id").map_err(ser)?.as_str())?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get("description").map_err(ser)?,
        row.try_get::<String, _>("skill_name").map_err(ser)?,
        parse_category(category_str.as_str())?,
        parse_difficulty_level(level_str.as_str())?,
        steps,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}
