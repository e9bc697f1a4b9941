//! `proctor`: drive a simulated candidate through a proctored exam attempt.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use proctor_core::model::{CheckKind, ExamId, format_remaining};
use services::{AppServices, Clock};
use storage::demo::demo_exams;
use storage::repository::Storage;

mod config;
mod runner;

#[derive(Parser, Debug)]
#[command(name = "proctor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./proctor.toml when present)
    #[arg(short, long, env = "PROCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overrides `log_level` from the config
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the exam dashboard
    #[command(alias = "ls")]
    Exams,

    /// Sign in, pass the lobby checks and sit an exam
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, default_value = "student@university.edu")]
    email: String,

    #[arg(long, default_value = "password")]
    password: String,

    /// Exam id from `proctor exams`
    #[arg(long, default_value = "2")]
    exam: ExamId,

    /// Override the exam length in seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Submit after this many seconds instead of waiting for time to run out
    #[arg(long)]
    submit_after: Option<u64>,

    /// Seed for the incident generator
    #[arg(long)]
    seed: Option<u64>,

    /// Make a readiness check fail on its first run (repeatable)
    #[arg(long = "fail")]
    fail: Vec<CheckKind>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        if !path.exists() {
            bail!("config file not found: {}", path.display());
        }
    }
    let mut config =
        config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Commands::Exams => {
            let services = AppServices::in_memory(&config.services(), Clock::default_clock())?;
            list_exams(&services).await
        }
        Commands::Run(args) => {
            if args.seed.is_some() {
                config.incidents.seed = args.seed;
            }
            config.readiness.fail.extend(args.fail.iter().copied());

            let storage = Storage::in_memory();
            let exam_id = args.exam;
            if let Some(seconds) = args.duration_secs {
                override_duration(&storage, exam_id, seconds).await?;
            }
            let services =
                AppServices::with_storage(&config.services(), Clock::default_clock(), storage)?;
            runner::run(
                &services,
                &runner::Candidate {
                    email: args.email,
                    password: args.password,
                    exam_id,
                    submit_after: args.submit_after,
                },
            )
            .await
        }
    }
}

async fn list_exams(services: &AppServices) -> Result<()> {
    let overview = services.dashboard().overview().await?;
    let groups = [
        ("Available", &overview.available),
        ("Upcoming", &overview.upcoming),
        ("Completed", &overview.completed),
    ];
    for (label, exams) in groups {
        println!("{label}:");
        if exams.is_empty() {
            println!("  (none)");
        }
        for exam in exams {
            println!(
                "  [{}] {} {:<34} {}  {} min",
                exam.id,
                exam.course,
                exam.title,
                exam.scheduled_at.format("%Y-%m-%d %H:%M"),
                exam.duration_minutes,
            );
        }
    }
    Ok(())
}

async fn override_duration(storage: &Storage, exam_id: ExamId, seconds: u64) -> Result<()> {
    if seconds == 0 {
        bail!("--duration-secs must be positive");
    }
    let record = demo_exams()
        .into_iter()
        .find(|record| record.listing.id == exam_id)
        .with_context(|| format!("exam {exam_id} does not exist"))?
        .with_duration_seconds(seconds);
    storage.exams.upsert_exam(record).await?;
    tracing::info!(exam = %exam_id, length = %format_remaining(seconds), "exam length overridden");
    Ok(())
}
