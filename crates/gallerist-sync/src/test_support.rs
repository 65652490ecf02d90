use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use gallerist_core::{City, ListingKind};
use gallerist_storage::{FetchError, PageFetcher};

use crate::notify::{Alert, Notifier};
use crate::scheduler::ScheduledTask;

pub(crate) const BASE_URL: &str = "https://artmap.test";

/// Serves registered pages and answers 404 for everything else.
#[derive(Default)]
pub(crate) struct FixtureFetcher {
    pages: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub(crate) fn insert(&self, url: impl Into<String>, html: impl Into<String>) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), html.into());
    }

    pub(crate) fn remove(&self, url: &str) {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner).remove(url);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

pub(crate) fn test_city(id: &str, tier: u8) -> City {
    let mut city = City::new(id, id, id, "XX");
    city.tier = tier;
    city
}

fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

/// Registers one listing page for `kind` and a detail page per venue, each with one ongoing show.
pub(crate) fn seed_city(fetcher: &FixtureFetcher, city: &City, kind: ListingKind, venues: &[String]) {
    let rows = venues
        .iter()
        .map(|name| {
            format!(
                "<tr class=\"venuesListTableRow\"><td><a href=\"/{}\">{name}</a></td><td>1 Main Street</td></tr>",
                slug(name)
            )
        })
        .collect::<String>();
    fetcher.insert(
        format!("{BASE_URL}/{}/venues/{}", city.slug, kind.path_segment()),
        format!("<html><body><table>{rows}</table></body></html>"),
    );

    for name in venues {
        fetcher.insert(
            format!("{BASE_URL}/{}", slug(name)),
            format!(
                "<html><body><h1 class=\"venue-name\">{name}</h1>\
                 <div class=\"current-exhibitions\"><div class=\"exhibition-item\">\
                 <h3 class=\"exhibition-title\">{name} Annual</h3>\
                 <div class=\"exhibition-dates\">1 January 2020 – 31 December 2099</div>\
                 </div></div></body></html>"
            ),
        );
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
    broken: bool,
}

impl RecordingNotifier {
    pub(crate) fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub(crate) fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        if self.broken {
            anyhow::bail!("webhook unreachable");
        }
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
        Ok(())
    }
}

pub(crate) struct StaticTask {
    failure: Option<String>,
}

impl StaticTask {
    pub(crate) fn ok() -> Self {
        Self { failure: None }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl ScheduledTask for StaticTask {
    async fn run(&self) -> anyhow::Result<()> {
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }
}
