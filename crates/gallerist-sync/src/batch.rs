//! Resumable multi-city batch runs with per-city progress persistence.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use gallerist_core::{City, FailedCity, ListingKind, RunSummary};
use gallerist_storage::{ArtifactStore, ProgressStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{CityCatalog, CrawlProfile, TierSelection};
use crate::crawl::CityCrawler;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub selection: TierSelection,
    /// Start at this city, re-crawling it and everything after it.
    pub resume_from: Option<String>,
    /// Use the catalog's full profile for every city.
    pub full: bool,
    /// Forget completed cities of the selection before starting.
    pub fresh: bool,
    pub max_venues_per_type: Option<usize>,
    pub listing_kinds: Option<Vec<ListingKind>>,
}

impl BatchOptions {
    pub fn new(selection: TierSelection) -> Self {
        Self {
            selection,
            resume_from: None,
            full: false,
            fresh: false,
            max_venues_per_type: None,
            listing_kinds: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("city `{city}` is not part of the {selection} selection")]
    UnknownResumeCity { city: String, selection: String },
    #[error("crawl progress could not be persisted: {0:#}")]
    Progress(anyhow::Error),
}

pub struct BatchRunner {
    crawler: CityCrawler,
    catalog: CityCatalog,
    progress: Arc<dyn ProgressStore>,
    reports: Option<ArtifactStore>,
    city_delay: Duration,
}

impl BatchRunner {
    pub fn new(crawler: CityCrawler, catalog: CityCatalog, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            crawler,
            catalog,
            progress,
            reports: None,
            city_delay: Duration::from_secs(10),
        }
    }

    pub fn with_reports(mut self, reports: ArtifactStore) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_city_delay(mut self, city_delay: Duration) -> Self {
        self.city_delay = city_delay;
        self
    }

    pub fn catalog(&self) -> &CityCatalog {
        &self.catalog
    }

    fn profile_for(&self, city: &City, options: &BatchOptions) -> CrawlProfile {
        let mut profile = if options.full {
            self.catalog.full_profile.clone()
        } else {
            self.catalog
                .profile_for(city)
                .cloned()
                .unwrap_or_else(|| self.catalog.full_profile.clone())
        };
        if let Some(max) = options.max_venues_per_type {
            profile.max_venues_per_type = max;
        }
        if let Some(kinds) = &options.listing_kinds {
            profile.listing_kinds = kinds.clone();
        }
        profile
    }

    pub async fn run_batch(
        &self,
        options: &BatchOptions,
        stop: &CancellationToken,
    ) -> Result<RunSummary, BatchError> {
        let run_id = Uuid::new_v4();
        let selection = options.selection.to_string();
        let cities = self.catalog.cities_for(options.selection);
        let mut summary = RunSummary::new(run_id, selection.clone(), Utc::now());
        let mut progress = self.progress.load().await.map_err(BatchError::Progress)?;

        let start_index = match &options.resume_from {
            Some(city_id) => cities
                .iter()
                .position(|c| &c.id == city_id)
                .ok_or_else(|| BatchError::UnknownResumeCity {
                    city: city_id.clone(),
                    selection: selection.clone(),
                })?,
            None => 0,
        };

        let all_completed = cities.iter().all(|c| progress.is_completed(&c.id));
        if options.fresh || (options.resume_from.is_none() && all_completed) {
            info!(%selection, "starting a new crawl cycle");
            progress.restart_cycle(cities.iter().map(|c| c.id.as_str()));
        }

        let mut queue = Vec::new();
        for (index, city) in cities.iter().enumerate() {
            let skip = match options.resume_from {
                Some(_) => index < start_index,
                None => progress.is_completed(&city.id),
            };
            if skip {
                summary.skipped_cities.push(city.id.clone());
            } else {
                queue.push(city);
            }
        }
        info!(
            %run_id,
            %selection,
            queued = queue.len(),
            skipped = summary.skipped_cities.len(),
            "batch started"
        );

        for (index, city) in queue.iter().enumerate() {
            if stop.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            let profile = self.profile_for(city, options);
            match self.crawler.crawl_city(city, &profile, stop).await {
                Ok(report) => {
                    if report.interrupted {
                        summary.interrupted = true;
                    } else {
                        progress.mark_completed(&city.id);
                        summary.successful_cities.push(city.id.clone());
                    }
                    progress.totals.absorb(&report);
                    summary.totals.absorb(&report);
                    summary.cities.push((&report).into());
                }
                Err(err) => {
                    error!(city = %city.id, error = %err, "city failed");
                    summary.failed_cities.push(FailedCity {
                        city: city.id.clone(),
                        error: err.to_string(),
                    });
                    progress.totals.errors += 1;
                    summary.totals.errors += 1;
                }
            }

            progress.last_run = Some(Utc::now());
            self.progress.save(&progress).await.map_err(BatchError::Progress)?;

            if summary.interrupted {
                break;
            }
            if index + 1 < queue.len() && !self.city_delay.is_zero() {
                tokio::select! {
                    _ = stop.cancelled() => {
                        summary.interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.city_delay) => {}
                }
            }
        }

        summary.finish(Utc::now());
        if let Some(reports) = &self.reports {
            if let Err(err) = write_reports(reports, &mut summary).await {
                warn!(error = %format!("{err:#}"), "could not write batch reports");
            }
        }

        info!(
            %run_id,
            successful = summary.successful_cities.len(),
            failed = summary.failed_cities.len(),
            skipped = summary.skipped_cities.len(),
            venues = summary.totals.venues_processed,
            exhibitions_saved = summary.totals.exhibitions_saved,
            success_rate = summary.success_rate(),
            interrupted = summary.interrupted,
            "batch finished"
        );
        Ok(summary)
    }
}

async fn write_reports(reports: &ArtifactStore, summary: &mut RunSummary) -> anyhow::Result<()> {
    let run_dir = format!("{}-{}", summary.started_at.format("%Y%m%d_%H%M%S"), summary.run_id);
    summary.reports_dir = Some(reports.root().join(&run_dir).display().to_string());

    let json = serde_json::to_vec_pretty(summary).context("serializing batch summary")?;
    reports.write_report(&run_dir, "batch_summary.json", &json).await?;
    reports
        .write_report(&run_dir, "batch_brief.md", batch_brief_markdown(summary).as_bytes())
        .await?;
    Ok(())
}

pub fn batch_brief_markdown(summary: &RunSummary) -> String {
    let mut lines = vec![
        "# Gallerist Batch Brief".to_string(),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Selection: {}", summary.selection),
        format!("- Started: {}", summary.started_at),
        format!(
            "- Finished: {}",
            summary
                .finished_at
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("- Duration: {:.1}s", summary.duration_secs),
        format!("- Interrupted: {}", if summary.interrupted { "yes" } else { "no" }),
        String::new(),
        "## Totals".to_string(),
        format!("- Venues processed: {}", summary.totals.venues_processed),
        format!("- Exhibitions found: {}", summary.totals.exhibitions_found),
        format!("- Exhibitions saved: {}", summary.totals.exhibitions_saved),
        format!("- Errors: {}", summary.totals.errors),
        format!("- City success rate: {:.2}%", summary.success_rate()),
        String::new(),
        "## Cities".to_string(),
        "| City | Venues | Found | Saved | Errors | Seconds |".to_string(),
        "|---|---|---|---|---|---|".to_string(),
    ];
    for city in &summary.cities {
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {:.1} |",
            city.city,
            city.venues_processed,
            city.exhibitions_found,
            city.exhibitions_saved,
            city.errors,
            city.duration_secs
        ));
    }
    if !summary.failed_cities.is_empty() {
        lines.push(String::new());
        lines.push("## Failed".to_string());
        for failed in &summary.failed_cities {
            lines.push(format!("- {}: {}", failed.city, failed.error));
        }
    }
    if !summary.skipped_cities.is_empty() {
        lines.push(String::new());
        lines.push(format!("## Skipped\n- {}", summary.skipped_cities.join(", ")));
    }
    lines.push(String::new());
    lines.join("\n")
}
