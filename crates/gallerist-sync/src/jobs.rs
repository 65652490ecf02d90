//! Built-in scheduled tasks and the default job table.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use gallerist_core::Tier;
use gallerist_storage::CatalogStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::batch::{BatchOptions, BatchRunner};
use crate::config::TierSelection;
use crate::health::HealthMonitor;
use crate::scheduler::{JobSpec, ScheduledTask, Scheduler, SchedulerError};

pub const TIER1_DAILY_JOB: &str = "artmap-tier1-daily";
pub const FULL_WEEKLY_JOB: &str = "artmap-full-weekly";
pub const STATUS_SWEEP_JOB: &str = "status-sweep-weekly";
pub const HEALTH_MONITOR_JOB: &str = "health-monitor";
pub const DAILY_STATS_JOB: &str = "daily-stats";

fn today_in(timezone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

/// One batch run; fails only when every attempted city failed.
pub struct BatchCrawlTask {
    runner: Arc<BatchRunner>,
    options: BatchOptions,
    stop: CancellationToken,
}

impl BatchCrawlTask {
    pub fn new(runner: Arc<BatchRunner>, options: BatchOptions, stop: CancellationToken) -> Self {
        Self { runner, options, stop }
    }
}

#[async_trait]
impl ScheduledTask for BatchCrawlTask {
    async fn run(&self) -> anyhow::Result<()> {
        let summary = self.runner.run_batch(&self.options, &self.stop).await?;
        if summary.attempted() > 0 && summary.successful_cities.is_empty() {
            anyhow::bail!(
                "no city succeeded in the {} run ({} failed)",
                summary.selection,
                summary.failed_cities.len()
            );
        }
        Ok(())
    }
}

pub struct StatusSweepTask {
    catalog: Arc<dyn CatalogStore>,
    timezone: Tz,
}

impl StatusSweepTask {
    pub fn new(catalog: Arc<dyn CatalogStore>, timezone: Tz) -> Self {
        Self { catalog, timezone }
    }
}

#[async_trait]
impl ScheduledTask for StatusSweepTask {
    async fn run(&self) -> anyhow::Result<()> {
        let today = today_in(self.timezone);
        let changed = self
            .catalog
            .sweep_exhibition_status(today)
            .await
            .context("sweeping exhibition status")?;
        info!(%today, changed, "exhibition status sweep finished");
        Ok(())
    }
}

pub struct HealthCheckTask {
    monitor: Arc<HealthMonitor>,
}

impl HealthCheckTask {
    pub fn new(monitor: Arc<HealthMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl ScheduledTask for HealthCheckTask {
    async fn run(&self) -> anyhow::Result<()> {
        let snapshot = self.monitor.check().await;
        if !snapshot.is_healthy() {
            anyhow::bail!(
                "system unhealthy: {}",
                snapshot.database.error.as_deref().unwrap_or("database unreachable")
            );
        }
        Ok(())
    }
}

/// Aggregates the previous calendar day in the configured timezone.
pub struct DailyStatsTask {
    catalog: Arc<dyn CatalogStore>,
    timezone: Tz,
}

impl DailyStatsTask {
    pub fn new(catalog: Arc<dyn CatalogStore>, timezone: Tz) -> Self {
        Self { catalog, timezone }
    }
}

#[async_trait]
impl ScheduledTask for DailyStatsTask {
    async fn run(&self) -> anyhow::Result<()> {
        let today = today_in(self.timezone);
        let day = today.pred_opt().unwrap_or(today);
        let stats = self
            .catalog
            .aggregate_daily_stats(day)
            .await
            .with_context(|| format!("aggregating stats for {day}"))?;
        info!(
            %day,
            venues = stats.total_venues,
            exhibitions = stats.total_exhibitions,
            collected = stats.exhibitions_collected,
            "daily stats aggregated"
        );
        Ok(())
    }
}

/// Everything the default job table needs to build its tasks.
pub struct DefaultJobs {
    pub runner: Arc<BatchRunner>,
    pub catalog: Arc<dyn CatalogStore>,
    pub monitor: Arc<HealthMonitor>,
    pub timezone: Tz,
    pub stop: CancellationToken,
}

pub fn register_default_jobs(scheduler: &Scheduler, jobs: DefaultJobs) -> Result<(), SchedulerError> {
    let tz = jobs.timezone;

    scheduler.register_job(
        JobSpec::new(TIER1_DAILY_JOB, "0 14 * * *", tz).critical().exclusive(),
        Arc::new(BatchCrawlTask::new(
            jobs.runner.clone(),
            BatchOptions::new(TierSelection::Tier(Tier::One)),
            jobs.stop.clone(),
        )),
    )?;

    let mut full = BatchOptions::new(TierSelection::All);
    full.full = true;
    scheduler.register_job(
        JobSpec::new(FULL_WEEKLY_JOB, "0 3 * * 0", tz).critical().exclusive(),
        Arc::new(BatchCrawlTask::new(jobs.runner, full, jobs.stop)),
    )?;

    scheduler.register_job(
        JobSpec::new(STATUS_SWEEP_JOB, "0 23 * * 6", tz),
        Arc::new(StatusSweepTask::new(jobs.catalog.clone(), tz)),
    )?;
    scheduler.register_job(
        JobSpec::new(HEALTH_MONITOR_JOB, "0 * * * *", tz),
        Arc::new(HealthCheckTask::new(jobs.monitor)),
    )?;
    scheduler.register_job(
        JobSpec::new(DAILY_STATS_JOB, "0 0 * * *", tz),
        Arc::new(DailyStatsTask::new(jobs.catalog, tz)),
    )?;
    Ok(())
}
