//! Periodic health snapshot: database, storage, query latency, credentials and catalog quality.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gallerist_core::round2;
use gallerist_storage::{CatalogMetrics, CatalogStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::notify::{Alert, Notifier};
use crate::scheduler::Scheduler;

/// Environment variables holding API keys for the auxiliary sources.
pub const CREDENTIAL_VARS: &[&str] = &[
    "CULTURE_API_KEY",
    "NAVER_CLIENT_ID",
    "RIJKS_API_KEY",
    "GOOGLE_PLACES_API_KEY",
];

const COMPLETENESS_WEIGHT: f64 = 0.30;
const SUCCESS_WEIGHT: f64 = 0.30;
const COVERAGE_WEIGHT: f64 = 0.20;
const FRESHNESS_WEIGHT: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Warning,
    Partial,
    Slow,
    Unhealthy,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Partial => "partial",
            Self::Slow => "slow",
            Self::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub storage_warning_bytes: i64,
    pub slow_query: Duration,
    pub quality_threshold: f64,
    pub freshness_window: chrono::Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            storage_warning_bytes: 10 * 1024 * 1024 * 1024,
            slow_query: Duration::from_millis(1000),
            quality_threshold: 0.6,
            freshness_window: chrono::Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseHealth {
    pub status: ComponentStatus,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageHealth {
    pub status: ComponentStatus,
    pub bytes: Option<i64>,
    pub exhibitions: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceHealth {
    pub status: ComponentStatus,
    pub sample_query_ms: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialHealth {
    pub status: ComponentStatus,
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

/// Weighted catalog quality, every part in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub score: f64,
    pub completeness: f64,
    pub success_rate: f64,
    pub coverage: f64,
    pub freshness: f64,
    pub threshold: f64,
    pub below_threshold: bool,
    pub metrics: CatalogMetrics,
}

impl QualityReport {
    pub fn compute(metrics: CatalogMetrics, success_rate_pct: f64, catalog_cities: usize, threshold: f64) -> Self {
        let ratio = |part: i64, whole: i64| {
            if whole <= 0 {
                0.0
            } else {
                (part as f64 / whole as f64).clamp(0.0, 1.0)
            }
        };
        let completeness = (ratio(metrics.exhibitions_complete, metrics.total_exhibitions)
            + ratio(metrics.venues_with_coordinates, metrics.total_venues))
            / 2.0;
        let success_rate = (success_rate_pct / 100.0).clamp(0.0, 1.0);
        let coverage = ratio(metrics.cities_with_exhibitions, catalog_cities as i64);
        let freshness = ratio(metrics.venues_fresh, metrics.total_venues);
        let score = COMPLETENESS_WEIGHT * completeness
            + SUCCESS_WEIGHT * success_rate
            + COVERAGE_WEIGHT * coverage
            + FRESHNESS_WEIGHT * freshness;

        Self {
            score: round2(score),
            completeness: round2(completeness),
            success_rate: round2(success_rate),
            coverage: round2(coverage),
            freshness: round2(freshness),
            threshold,
            below_threshold: score < threshold,
            metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub checked_at: DateTime<Utc>,
    pub status: ComponentStatus,
    pub database: DatabaseHealth,
    pub storage: StorageHealth,
    pub performance: PerformanceHealth,
    pub credentials: CredentialHealth,
    pub quality: Option<QualityReport>,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.status != ComponentStatus::Unhealthy
    }
}

fn millis(d: Duration) -> f64 {
    round2(d.as_secs_f64() * 1000.0)
}

pub struct HealthMonitor {
    catalog: Arc<dyn CatalogStore>,
    scheduler: Scheduler,
    notifier: Arc<dyn Notifier>,
    catalog_cities: usize,
    thresholds: HealthThresholds,
    credentials: Vec<String>,
    env: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl HealthMonitor {
    /// Alerts go through the scheduler's notifier.
    pub fn new(catalog: Arc<dyn CatalogStore>, scheduler: Scheduler, catalog_cities: usize) -> Self {
        Self {
            catalog,
            notifier: scheduler.notifier(),
            scheduler,
            catalog_cities,
            thresholds: HealthThresholds::default(),
            credentials: CREDENTIAL_VARS.iter().map(|v| v.to_string()).collect(),
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Replace the environment lookup used for credential checks.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Take a snapshot, persist it and raise the quality alert when it is below threshold.
    pub async fn check(&self) -> HealthSnapshot {
        let snapshot = self.snapshot().await;
        self.report(&snapshot).await;
        snapshot
    }

    /// Compute the current snapshot without recording it or alerting.
    pub async fn snapshot(&self) -> HealthSnapshot {
        let checked_at = Utc::now();

        let database = match self.catalog.ping().await {
            Ok(latency) => DatabaseHealth {
                status: ComponentStatus::Healthy,
                latency_ms: Some(millis(latency)),
                error: None,
            },
            Err(err) => DatabaseHealth {
                status: ComponentStatus::Unhealthy,
                latency_ms: None,
                error: Some(err.to_string()),
            },
        };

        let storage = match self.catalog.footprint().await {
            Ok(footprint) => StorageHealth {
                status: if footprint.bytes > self.thresholds.storage_warning_bytes {
                    ComponentStatus::Warning
                } else {
                    ComponentStatus::Healthy
                },
                bytes: Some(footprint.bytes),
                exhibitions: Some(footprint.exhibitions),
                error: None,
            },
            Err(err) => StorageHealth {
                status: ComponentStatus::Unhealthy,
                bytes: None,
                exhibitions: None,
                error: Some(err.to_string()),
            },
        };

        let performance = match self.catalog.sample_query_latency().await {
            Ok(latency) => PerformanceHealth {
                status: if latency > self.thresholds.slow_query {
                    ComponentStatus::Slow
                } else {
                    ComponentStatus::Healthy
                },
                sample_query_ms: Some(millis(latency)),
                error: None,
            },
            Err(err) => PerformanceHealth {
                status: ComponentStatus::Unhealthy,
                sample_query_ms: None,
                error: Some(err.to_string()),
            },
        };

        let (present, missing): (Vec<_>, Vec<_>) = self
            .credentials
            .iter()
            .cloned()
            .partition(|name| (self.env)(name.as_str()).is_some_and(|v| !v.trim().is_empty()));
        let credentials = CredentialHealth {
            status: if missing.is_empty() {
                ComponentStatus::Healthy
            } else {
                ComponentStatus::Partial
            },
            present,
            missing,
        };

        let fresh_since = checked_at - self.thresholds.freshness_window;
        let quality = match self.catalog.catalog_metrics(fresh_since).await {
            Ok(metrics) => Some(QualityReport::compute(
                metrics,
                self.scheduler.mean_success_rate(),
                self.catalog_cities,
                self.thresholds.quality_threshold,
            )),
            Err(err) => {
                warn!(error = %err, "catalog metrics unavailable");
                None
            }
        };

        let status = if database.status == ComponentStatus::Unhealthy {
            ComponentStatus::Unhealthy
        } else if [storage.status, performance.status, credentials.status]
            .iter()
            .any(|s| *s != ComponentStatus::Healthy)
            || quality.as_ref().map_or(true, |q| q.below_threshold)
        {
            ComponentStatus::Warning
        } else {
            ComponentStatus::Healthy
        };

        HealthSnapshot {
            checked_at,
            status,
            database,
            storage,
            performance,
            credentials,
            quality,
        }
    }

    async fn report(&self, snapshot: &HealthSnapshot) {
        for (component, status) in [
            ("database", snapshot.database.status),
            ("storage", snapshot.storage.status),
            ("performance", snapshot.performance.status),
            ("credentials", snapshot.credentials.status),
        ] {
            if status != ComponentStatus::Healthy {
                warn!(component, status = status.as_str(), "component not healthy");
            }
        }

        match serde_json::to_value(snapshot) {
            Ok(json) => {
                if let Err(err) = self.catalog.record_health_snapshot(snapshot.status.as_str(), &json).await {
                    warn!(error = %err, "could not persist health snapshot");
                }
            }
            Err(err) => warn!(error = %err, "could not serialize health snapshot"),
        }

        if let Some(quality) = snapshot.quality.as_ref().filter(|q| q.below_threshold) {
            let alert = Alert::quality_degraded(quality.score, quality.threshold);
            if let Err(err) = self.notifier.send(&alert).await {
                warn!(error = %format!("{err:#}"), "quality alert delivery failed");
            }
        }

        info!(
            status = snapshot.status.as_str(),
            quality = snapshot.quality.as_ref().map(|q| q.score),
            "health check finished"
        );
    }
}
