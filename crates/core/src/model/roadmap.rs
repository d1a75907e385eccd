use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::RoadmapId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RoadmapError {
    #[error("roadmap title cannot be empty")]
    EmptyTitle,

    #[error("roadmap must have at least one step")]
    NoSteps,

    #[error("step {index} must have a title")]
    EmptyStepTitle { index: usize },
}

//
// ─── CATALOG TYPES ─────────────────────────────────────────────────────────────
//

/// Broad subject area of a roadmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Technology,
    Creative,
    Business,
    HealthWellness,
    Academic,
    Lifestyle,
    Custom,
}

impl SkillCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::Technology => "technology",
            SkillCategory::Creative => "creative",
            SkillCategory::Business => "business",
            SkillCategory::HealthWellness => "health_wellness",
            SkillCategory::Academic => "academic",
            SkillCategory::Lifestyle => "lifestyle",
            SkillCategory::Custom => "custom",
        }
    }
}

/// Overall difficulty of a roadmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl DifficultyLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Beginner => "beginner",
            DifficultyLevel::Intermediate => "intermediate",
            DifficultyLevel::Advanced => "advanced",
            DifficultyLevel::Expert => "expert",
        }
    }
}

/// One unit of a roadmap, addressed by zero-based index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapStep {
    pub title: String,
    pub description: String,
    pub resources: Vec<String>,
    pub estimated_minutes: Option<u32>,
}

/// An immutable ordered list of learning steps for a skill.
///
/// Roadmap content lives in the catalog; the progress engine only reads
/// the step count and per-step time estimates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roadmap {
    id: RoadmapId,
    title: String,
    description: Option<String>,
    skill_name: String,
    category: SkillCategory,
    difficulty_level: DifficultyLevel,
    steps: Vec<RoadmapStep>,
    created_at: DateTime<Utc>,
}

impl Roadmap {
    /// Creates a roadmap, validating the title and step list.
    ///
    /// # Errors
    ///
    /// Returns `RoadmapError::EmptyTitle` if the title is blank,
    /// `RoadmapError::NoSteps` if the step list is empty, or
    /// `RoadmapError::EmptyStepTitle` for a step with a blank title.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: RoadmapId,
        title: impl Into<String>,
        description: Option<String>,
        skill_name: impl Into<String>,
        category: SkillCategory,
        difficulty_level: DifficultyLevel,
        steps: Vec<RoadmapStep>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, RoadmapError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(RoadmapError::EmptyTitle);
        }
        if steps.is_empty() {
            return Err(RoadmapError::NoSteps);
        }
        for (index, step) in steps.iter().enumerate() {
            if step.title.trim().is_empty() {
                return Err(RoadmapError::EmptyStepTitle { index });
            }
        }

        Ok(Self {
            id,
            title,
            description,
            skill_name: skill_name.into(),
            category,
            difficulty_level,
            steps,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> RoadmapId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn skill_name(&self) -> &str {
        &self.skill_name
    }

    #[must_use]
    pub fn category(&self) -> SkillCategory {
        self.category
    }

    #[must_use]
    pub fn difficulty_level(&self) -> DifficultyLevel {
        self.difficulty_level
    }

    #[must_use]
    pub fn steps(&self) -> &[RoadmapStep] {
        &self.steps
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Sums the time estimates of steps not yet completed in the given
    /// completion vector. Indices beyond the vector count as incomplete.
    ///
    /// Returns `None` when no step in the roadmap carries an estimate,
    /// so callers can distinguish "no estimate" from "nothing left".
    #[must_use]
    pub fn estimated_minutes_remaining(&self, step_progress: &[bool]) -> Option<u32> {
        if self.steps.iter().all(|s| s.estimated_minutes.is_none()) {
            return None;
        }

        let remaining = self
            .steps
            .iter()
            .enumerate()
            .filter(|(index, _)| !step_progress.get(*index).copied().unwrap_or(false))
            .filter_map(|(_, step)| step.estimated_minutes)
            .sum();
        Some(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn step(title: &str, estimated_minutes: Option<u32>) -> RoadmapStep {
        RoadmapStep {
            title: title.to_string(),
            description: format!("{title} description"),
            resources: vec!["https://example.com".to_string()],
            estimated_minutes,
        }
    }

    fn build_roadmap(steps: Vec<RoadmapStep>) -> Result<Roadmap, RoadmapError> {
        Roadmap::new(
            RoadmapId::generate(),
            "Learn Rust",
            None,
            "Rust",
            SkillCategory::Technology,
            DifficultyLevel::Beginner,
            steps,
            fixed_now(),
        )
    }

    #[test]
    fn roadmap_requires_at_least_one_step() {
        let err = build_roadmap(vec![]).unwrap_err();
        assert_eq!(err, RoadmapError::NoSteps);
    }

    #[test]
    fn roadmap_rejects_blank_step_title() {
        let err = build_roadmap(vec![step("Basics", None), step("  ", None)]).unwrap_err();
        assert_eq!(err, RoadmapError::EmptyStepTitle { index: 1 });
    }

    #[test]
    fn roadmap_rejects_blank_title() {
        let err = Roadmap::new(
            RoadmapId::generate(),
            "   ",
            None,
            "Rust",
            SkillCategory::Technology,
            DifficultyLevel::Beginner,
            vec![step("Basics", None)],
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, RoadmapError::EmptyTitle);
    }

    #[test]
    fn estimate_sums_only_incomplete_steps() {
        let roadmap = build_roadmap(vec![
            step("Basics", Some(60)),
            step("Ownership", Some(120)),
            step("Async", Some(180)),
        ])
        .unwrap();

        assert_eq!(
            roadmap.estimated_minutes_remaining(&[true, false, false]),
            Some(300)
        );
        assert_eq!(
            roadmap.estimated_minutes_remaining(&[true, true, true]),
            Some(0)
        );
    }

    #[test]
    fn estimate_treats_missing_indices_as_incomplete() {
        let roadmap = build_roadmap(vec![step("Basics", Some(30)), step("Ownership", Some(45))])
            .unwrap();
        assert_eq!(roadmap.estimated_minutes_remaining(&[true]), Some(45));
    }

    #[test]
    fn estimate_is_none_without_any_step_estimates() {
        let roadmap = build_roadmap(vec![step("Basics", None), step("Ownership", None)]).unwrap();
        assert_eq!(roadmap.estimated_minutes_remaining(&[]), None);
    }
}
