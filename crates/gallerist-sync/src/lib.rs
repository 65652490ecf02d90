//! Crawl orchestration, batch runs, scheduling and health monitoring for the gallerist collector.

use std::sync::Arc;

use anyhow::{Context, Result};
use gallerist_adapters::{source_for_id, VenueSource};
use gallerist_storage::{
    ArtifactStore, CatalogStore, HttpFetcher, InMemoryCatalogStore, InMemoryProgressStore,
    JsonFileProgressStore, PgCatalogStore, ProgressStore, TaskLogSink,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod batch;
pub mod config;
pub mod crawl;
pub mod health;
pub mod jobs;
pub mod notify;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use batch::{batch_brief_markdown, BatchError, BatchOptions, BatchRunner};
pub use config::{CityCatalog, CollectorConfig, CrawlProfile, TierSelection};
pub use crawl::{CityCrawler, CrawlError};
pub use health::{ComponentStatus, HealthMonitor, HealthSnapshot, QualityReport};
pub use jobs::{register_default_jobs, DefaultJobs};
pub use notify::{Alert, LogNotifier, Notifier, WebhookNotifier};
pub use scheduler::{ExecutionOutcome, JobSpec, ScheduledTask, Scheduler, SchedulerError, SchedulerStatus};

pub const CRATE_NAME: &str = "gallerist-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Postgres,
    /// Nothing is persisted; progress is read but never written back.
    InMemory,
}

/// The wired collector: catalog, batch runner, scheduler and health monitor sharing one stop token.
pub struct Collector {
    pub config: CollectorConfig,
    pub catalog: Arc<dyn CatalogStore>,
    pub runner: Arc<BatchRunner>,
    pub scheduler: Scheduler,
    pub health: Arc<HealthMonitor>,
    pub stop: CancellationToken,
    postgres: Option<PgCatalogStore>,
}

impl Collector {
    pub async fn connect(config: CollectorConfig, mode: StorageMode) -> Result<Self> {
        let city_catalog = CityCatalog::load(&config.workspace_root)?;

        let catalog: Arc<dyn CatalogStore>;
        let task_log: Arc<dyn TaskLogSink>;
        let progress: Arc<dyn ProgressStore>;
        let mut postgres = None;
        match mode {
            StorageMode::Postgres => {
                let pg = PgCatalogStore::connect(&config.database_url)
                    .await
                    .context("connecting to the catalog database")?;
                catalog = Arc::new(pg.clone());
                task_log = Arc::new(pg.clone());
                progress = Arc::new(JsonFileProgressStore::new(config.progress_path.clone()));
                postgres = Some(pg);
            }
            StorageMode::InMemory => {
                let memory = Arc::new(InMemoryCatalogStore::new());
                let current = JsonFileProgressStore::new(config.progress_path.clone())
                    .load()
                    .await?;
                catalog = memory.clone();
                task_log = memory;
                progress = Arc::new(InMemoryProgressStore::new(current));
            }
        }

        let source: Arc<dyn VenueSource> = source_for_id("artmap", Some(&config.artmap_base_url))
            .context("artmap source is not registered")?
            .into();
        let fetcher = Arc::new(HttpFetcher::new(config.http_client_config())?);
        let crawler = CityCrawler::new(source, fetcher, catalog.clone())
            .with_snapshots(ArtifactStore::new(config.artifacts_dir.clone()))
            .with_timezone(config.timezone);
        let city_count = city_catalog.city_count();
        let runner = Arc::new(
            BatchRunner::new(crawler, city_catalog, progress)
                .with_reports(ArtifactStore::new(config.reports_dir.clone()))
                .with_city_delay(config.city_delay),
        );

        let notifier: Arc<dyn Notifier> = match &config.alert_webhook {
            Some(url) => Arc::new(WebhookNotifier::new(
                url.clone(),
                std::time::Duration::from_secs(config.http_timeout_secs),
            )?),
            None => Arc::new(LogNotifier),
        };
        let scheduler = Scheduler::new(notifier, Some(task_log));
        let health = Arc::new(
            HealthMonitor::new(catalog.clone(), scheduler.clone(), city_count).with_thresholds(
                health::HealthThresholds {
                    quality_threshold: config.quality_threshold,
                    ..Default::default()
                },
            ),
        );

        info!(?mode, cities = city_count, timezone = %config.timezone, "collector ready");
        Ok(Self {
            config,
            catalog,
            runner,
            scheduler,
            health,
            stop: CancellationToken::new(),
            postgres,
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        match &self.postgres {
            Some(pg) => Ok(pg.migrate().await?),
            None => anyhow::bail!("migrations need a database connection"),
        }
    }

    pub fn register_default_jobs(&self) -> Result<(), SchedulerError> {
        register_default_jobs(
            &self.scheduler,
            DefaultJobs {
                runner: self.runner.clone(),
                catalog: self.catalog.clone(),
                monitor: self.health.clone(),
                timezone: self.config.timezone,
                stop: self.stop.clone(),
            },
        )
    }
}
