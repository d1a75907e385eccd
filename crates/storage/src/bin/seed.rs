use std::fmt;

use chrono::{DateTime, Utc};
use roadmap_core::model::{
    DifficultyLevel, ProgressRecord, Roadmap, RoadmapId, RoadmapStep, SkillCategory, UserId,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user_id: UserId,
    roadmap_id: RoadmapId,
    steps: u32,
    completed: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidRoadmapId { raw: String },
    InvalidSteps { raw: String },
    InvalidCompleted { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user-id value: {raw}"),
            ArgsError::InvalidRoadmapId { raw } => write!(f, "invalid --roadmap-id value: {raw}"),
            ArgsError::InvalidSteps { raw } => write!(f, "invalid --steps value: {raw}"),
            ArgsError::InvalidCompleted { raw } => write!(f, "invalid --completed value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("ROADMAP_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut user_id = UserId::generate();
        let mut roadmap_id = RoadmapId::generate();
        let mut steps = 5_u32;
        let mut completed = 2_u32;
        let mut now = None;

        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--db" => db_url = require_value(&mut iter, "--db")?,
                "--user-id" => {
                    let raw = require_value(&mut iter, "--user-id")?;
                    user_id = raw
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw })?;
                }
                "--roadmap-id" => {
                    let raw = require_value(&mut iter, "--roadmap-id")?;
                    roadmap_id = raw
                        .parse()
                        .map_err(|_| ArgsError::InvalidRoadmapId { raw })?;
                }
                "--steps" => {
                    let raw = require_value(&mut iter, "--steps")?;
                    steps = raw.parse().map_err(|_| ArgsError::InvalidSteps { raw })?;
                }
                "--completed" => {
                    let raw = require_value(&mut iter, "--completed")?;
                    completed = raw
                        .parse()
                        .map_err(|_| ArgsError::InvalidCompleted { raw })?;
                }
                "--now" => {
                    let raw = require_value(&mut iter, "--now")?;
                    now = Some(
                        DateTime::parse_from_rfc3339(&raw)
                            .map(|t| t.with_timezone(&Utc))
                            .map_err(|_| ArgsError::InvalidNow { raw })?,
                    );
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                other => return Err(ArgsError::UnknownArg(other.to_string())),
            }
        }

        Ok(Self {
            db_url,
            user_id,
            roadmap_id,
            steps,
            completed,
            now,
        })
    }
}

fn print_help() {
    eprintln!("Seed a roadmap-progress database with sample data.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <url>          Database URL (default: $ROADMAP_DB_URL or sqlite:dev.sqlite3)");
    eprintln!("  --user-id <uuid>    Learner to seed progress for (default: random)");
    eprintln!("  --roadmap-id <uuid> Roadmap to upsert (default: random)");
    eprintln!("  --steps <n>         Number of roadmap steps (default: 5)");
    eprintln!("  --completed <n>     Steps to mark complete (default: 2)");
    eprintln!("  --now <rfc3339>     Timestamp to seed with (default: current time)");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse()?;
    let now = args.now.unwrap_or_else(Utc::now);

    let storage = Storage::sqlite(&args.db_url).await?;

    let steps = (0..args.steps)
        .map(|i| RoadmapStep {
            title: format!("Milestone {}", i + 1),
            description: format!("Work through milestone {} of the sample roadmap", i + 1),
            resources: vec!["https://doc.rust-lang.org/book/".to_string()],
            estimated_minutes: Some(90),
        })
        .collect();

    let roadmap = Roadmap::new(
        args.roadmap_id,
        "Learn Rust",
        Some("Sample roadmap seeded for local development".to_string()),
        "Rust",
        SkillCategory::Technology,
        DifficultyLevel::Beginner,
        steps,
        now,
    )?;
    storage.roadmaps.upsert_roadmap(&roadmap).await?;

    let mut record = match storage.progress.get(args.user_id, roadmap.id()).await? {
        Some(existing) => existing,
        None => {
            let fresh =
                ProgressRecord::new(args.user_id, roadmap.id(), roadmap.step_count(), now);
            storage.progress.insert_new(&fresh).await?;
            fresh
        }
    };

    for index in 0..args.completed.min(args.steps) {
        record.set_step_completion(index as usize, true, now);
    }
    let estimate = roadmap.estimated_minutes_remaining(record.step_progress());
    record.set_estimated_minutes_remaining(estimate);
    storage.progress.upsert(&record).await?;

    println!(
        "Seeded roadmap {} ({} steps) for user {} at {}% complete into {}",
        roadmap.id(),
        roadmap.step_count(),
        args.user_id,
        record.completion_percentage(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
