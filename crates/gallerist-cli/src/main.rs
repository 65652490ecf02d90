use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use gallerist_core::Tier;
use gallerist_sync::{
    batch_brief_markdown, BatchOptions, Collector, CollectorConfig, StorageMode, TierSelection,
};
use gallerist_web::AppState;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "gallerist")]
#[command(about = "Exhibition and venue collector")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one batch crawl over a tier selection (default command).
    Crawl(CrawlArgs),
    /// Run the cron scheduler and operator API until interrupted.
    Schedule,
    /// Trigger one registered job through the scheduler wrapper.
    RunJob { name: String },
    /// Recompute exhibition status once.
    Sweep,
    /// Print one health snapshot as JSON.
    Health,
    /// Apply database migrations.
    Migrate,
}

#[derive(Debug, Default, Args)]
struct CrawlArgs {
    #[arg(long, group = "selection")]
    tier1: bool,
    #[arg(long, group = "selection")]
    tier2: bool,
    #[arg(long, group = "selection")]
    tier3: bool,
    #[arg(long, group = "selection")]
    tier4: bool,
    #[arg(long, group = "selection")]
    all: bool,
    /// Crawl every listing kind with the full venue cap.
    #[arg(long)]
    full: bool,
    /// Restart from this city id, re-crawling it and the cities after it.
    #[arg(long, value_name = "CITY")]
    resume: Option<String>,
    /// Forget completed cities and start a new cycle.
    #[arg(long)]
    fresh: bool,
    /// Crawl without touching the database or the progress file.
    #[arg(long)]
    dry_run: bool,
}

impl CrawlArgs {
    fn selection(&self) -> TierSelection {
        match (self.all, self.tier2, self.tier3, self.tier4) {
            (true, ..) => TierSelection::All,
            (_, true, ..) => TierSelection::Tier(Tier::Two),
            (_, _, true, _) => TierSelection::Tier(Tier::Three),
            (_, _, _, true) => TierSelection::Tier(Tier::Four),
            _ => TierSelection::Tier(Tier::One),
        }
    }

    fn options(&self) -> BatchOptions {
        let mut options = BatchOptions::new(self.selection());
        options.full = self.full;
        options.fresh = self.fresh;
        options.resume_from = self.resume.clone();
        options
    }
}

/// Ctrl-C cancels the collector's stop token; crawls finish the current venue and return.
fn spawn_interrupt_handler(collector: &Collector) {
    let stop = collector.stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping");
            stop.cancel();
        }
    });
}

fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gallerist=info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    match std::env::var("GALLERIST_LOG_FORMAT").as_deref() {
        Ok("json") => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("initialising json logging")?,
        _ => registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("initialising logging")?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let config = CollectorConfig::from_env();

    match cli.command.unwrap_or_else(|| Commands::Crawl(CrawlArgs::default())) {
        Commands::Crawl(args) => {
            let mode = if args.dry_run {
                StorageMode::InMemory
            } else {
                StorageMode::Postgres
            };
            let collector = Collector::connect(config, mode).await?;
            spawn_interrupt_handler(&collector);

            let summary = collector.runner.run_batch(&args.options(), &collector.stop).await?;
            println!("{}", batch_brief_markdown(&summary));
            println!(
                "crawl complete: run_id={} succeeded={} failed={} skipped={} success_rate={:.2}% reports={}",
                summary.run_id,
                summary.successful_cities.len(),
                summary.failed_cities.len(),
                summary.skipped_cities.len(),
                summary.success_rate(),
                summary.reports_dir.as_deref().unwrap_or("n/a"),
            );
        }
        Commands::Schedule => {
            let port = config.web_port;
            if !config.scheduler_enabled {
                info!("GALLERIST_SCHEDULER_ENABLED is off; starting anyway for the schedule command");
            }
            let collector = Collector::connect(config, StorageMode::Postgres).await?;
            spawn_interrupt_handler(&collector);
            collector.register_default_jobs()?;
            collector.scheduler.start().await?;

            let state = AppState::new(collector.scheduler.clone(), collector.health.clone());
            let web = tokio::spawn(gallerist_web::serve(state, port, collector.stop.clone()));

            collector.stop.cancelled().await;
            collector.scheduler.stop().await?;
            match web.await {
                Ok(result) => result?,
                Err(err) => warn!(error = %err, "operator api task ended abnormally"),
            }
            info!("scheduler stopped");
        }
        Commands::RunJob { name } => {
            let collector = Collector::connect(config, StorageMode::Postgres).await?;
            spawn_interrupt_handler(&collector);
            collector.register_default_jobs()?;
            let outcome = collector.scheduler.run_task_manually(&name).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if let Some(stats) = collector.scheduler.stats(&name) {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
        }
        Commands::Sweep => {
            let today = Utc::now().with_timezone(&config.timezone).date_naive();
            let collector = Collector::connect(config, StorageMode::Postgres).await?;
            let changed = collector.catalog.sweep_exhibition_status(today).await?;
            println!("status sweep complete: day={today} changed={changed}");
        }
        Commands::Health => {
            let collector = Collector::connect(config, StorageMode::Postgres).await?;
            let snapshot = collector.health.check().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            anyhow::ensure!(snapshot.is_healthy(), "system unhealthy");
        }
        Commands::Migrate => {
            let collector = Collector::connect(config, StorageMode::Postgres).await?;
            collector.migrate().await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
