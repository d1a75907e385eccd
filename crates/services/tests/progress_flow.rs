use std::sync::Arc;

use chrono::Duration;
use roadmap_core::model::{
    DifficultyLevel, ProgressStatus, ReminderFrequency, Roadmap, RoadmapId, RoadmapStep,
    SkillCategory, StudyPreferences, StudyTime, UserId,
};
use roadmap_core::time::fixed_now;
use services::{Clock, ProgressService};
use storage::repository::{InMemoryRepository, ProgressRepository, RoadmapCatalog};

fn build_roadmap(step_count: usize) -> Roadmap {
    let steps = (0..step_count)
        .map(|i| RoadmapStep {
            title: format!("Step {}", i + 1),
            description: format!("Practice item {}", i + 1),
            resources: vec!["https://example.com/lesson".to_string()],
            estimated_minutes: Some(60),
        })
        .collect();
    Roadmap::new(
        RoadmapId::generate(),
        "Conversational French",
        Some("From greetings to small talk".to_string()),
        "French",
        SkillCategory::Academic,
        DifficultyLevel::Beginner,
        steps,
        fixed_now(),
    )
    .unwrap()
}

fn service_at(repo: &InMemoryRepository, clock: Clock) -> ProgressService {
    ProgressService::new(clock, Arc::new(repo.clone()), Arc::new(repo.clone()))
}

#[tokio::test]
async fn learner_journey_across_days() {
    let repo = InMemoryRepository::new();
    let roadmap = build_roadmap(4);
    repo.upsert_roadmap(&roadmap).await.unwrap();
    let user = UserId::generate();

    // Day 1: first interaction creates the record, one step done.
    let day1 = fixed_now();
    let svc = service_at(&repo, Clock::fixed(day1));
    let record = svc
        .set_step_completion(user, roadmap.id(), 0, true)
        .await
        .unwrap();
    assert_eq!(record.status(), ProgressStatus::InProgress);
    assert_eq!(record.completion_percentage(), 25);
    assert_eq!(record.started_at(), Some(day1));
    assert_eq!(record.streak().current(), 1);
    assert_eq!(record.estimated_minutes_remaining(), Some(180));

    svc.add_study_time(user, roadmap.id(), 40).await.unwrap();
    svc.add_step_note(user, roadmap.id(), 0, "pronunciation needs work")
        .await
        .unwrap();
    svc.rate_difficulty(user, roadmap.id(), 2.0).await.unwrap();
    svc.set_preferences(
        user,
        roadmap.id(),
        StudyPreferences::new(ReminderFrequency::Daily, 7, StudyTime::Morning).unwrap(),
    )
    .await
    .unwrap();

    // Day 2: another step, streak extends.
    let day2 = day1 + Duration::days(1);
    let svc = service_at(&repo, Clock::fixed(day2));
    let record = svc
        .set_step_completion(user, roadmap.id(), 1, true)
        .await
        .unwrap();
    assert_eq!(record.streak().current(), 2);
    assert_eq!(record.time_spent_minutes(), 40);

    // Day 2, later: annotations do not move the streak.
    svc.add_study_time(user, roadmap.id(), 25).await.unwrap();
    let record = svc.pause(user, roadmap.id()).await.unwrap();
    assert_eq!(record.status(), ProgressStatus::Paused);
    assert_eq!(record.streak().current(), 2);

    // Day 5: back from a break; resume re-derives the status, and the
    // next completion restarts the streak after the gap.
    let day5 = day1 + Duration::days(4);
    let svc = service_at(&repo, Clock::fixed(day5));
    let record = svc.resume(user, roadmap.id()).await.unwrap();
    assert_eq!(record.status(), ProgressStatus::InProgress);

    let record = svc
        .set_step_completion(user, roadmap.id(), 2, true)
        .await
        .unwrap();
    assert_eq!(record.streak().current(), 1);
    assert_eq!(record.streak().longest(), 2);

    // Finishing the last step completes the roadmap.
    let record = svc
        .set_step_completion(user, roadmap.id(), 3, true)
        .await
        .unwrap();
    assert_eq!(record.status(), ProgressStatus::Completed);
    assert_eq!(record.completed_at(), Some(day5));
    assert_eq!(record.started_at(), Some(day1));
    assert_eq!(record.estimated_minutes_remaining(), Some(0));

    // Stats reflect the single finished roadmap.
    let stats = svc.user_stats(user).await.unwrap();
    assert_eq!(stats.total_roadmaps(), 1);
    assert_eq!(stats.completed_steps(), 4);
    assert_eq!(stats.time_spent_minutes(), 65);
    assert_eq!(stats.best_streak(), 2);

    // A finished roadmap no longer shows as active.
    assert!(svc.active_roadmaps(user).await.unwrap().is_empty());

    // Reset starts the progression over but keeps engagement history.
    let record = svc.reset(user, roadmap.id()).await.unwrap();
    assert_eq!(record.status(), ProgressStatus::NotStarted);
    assert!(record.started_at().is_none());
    assert!(record.completed_at().is_none());
    assert_eq!(record.time_spent_minutes(), 65);
    assert_eq!(record.streak().longest(), 2);
    assert_eq!(
        record.notes(),
        None,
        "overall notes were never set in this journey"
    );
    assert_eq!(record.estimated_minutes_remaining(), Some(240));
}

#[tokio::test]
async fn concurrent_writers_land_last_writer_wins() {
    // The engine deliberately carries no optimistic-lock version: two
    // read-modify-write cycles over the same record overwrite each
    // other field-by-field, and the second writer's snapshot sticks.
    let repo = InMemoryRepository::new();
    let roadmap = build_roadmap(3);
    repo.upsert_roadmap(&roadmap).await.unwrap();
    let user = UserId::generate();

    let svc = service_at(&repo, Clock::fixed(fixed_now()));
    svc.find_or_create(user, roadmap.id()).await.unwrap();

    // Both "requests" load the same snapshot...
    let mut first = repo.get(user, roadmap.id()).await.unwrap().unwrap();
    let mut second = first.clone();

    // ...mutate independently...
    first.set_step_completion(0, true, fixed_now());
    second.add_study_time(30, fixed_now());

    // ...and write back in order. The step toggle is lost because the
    // time-logging snapshot never saw it.
    repo.upsert(&first).await.unwrap();
    repo.upsert(&second).await.unwrap();

    let stored = repo.get(user, roadmap.id()).await.unwrap().unwrap();
    assert_eq!(stored.time_spent_minutes(), 30);
    assert_eq!(stored.completed_steps(), 0);

    // Re-applying the idempotent toggle converges the record again.
    let record = svc
        .set_step_completion(user, roadmap.id(), 0, true)
        .await
        .unwrap();
    assert_eq!(record.completed_steps(), 1);
    assert_eq!(record.time_spent_minutes(), 30);
}
