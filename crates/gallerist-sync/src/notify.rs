//! Operator alerts for failed critical jobs and degraded catalog quality.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    TaskFailure,
    QualityDegraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub subject: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn task_failure(job_name: &str, error: &str) -> Self {
        Self {
            kind: AlertKind::TaskFailure,
            subject: format!("critical job `{job_name}` failed"),
            message: error.to_string(),
            raised_at: Utc::now(),
        }
    }

    pub fn quality_degraded(score: f64, threshold: f64) -> Self {
        Self {
            kind: AlertKind::QualityDegraded,
            subject: "catalog quality below threshold".to_string(),
            message: format!("quality score {score:.2} is below {threshold:.2}"),
            raised_at: Utc::now(),
        }
    }
}

/// Delivery channel for alerts. Callers log delivery errors and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<()> {
        warn!(kind = ?alert.kind, subject = %alert.subject, message = %alert.message, "alert raised");
        Ok(())
    }
}

/// Posts alerts as JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, alert: &Alert) -> Result<()> {
        self.client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .with_context(|| format!("posting alert to {}", self.url))?
            .error_for_status()
            .context("alert webhook rejected the request")?;
        Ok(())
    }
}
