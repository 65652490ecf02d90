//! Per-city crawl: listing pages, venue detail pages, catalog upserts.

use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use gallerist_adapters::{ParseError, VenueSource};
use gallerist_core::{
    City, CityCrawlReport, CrawlIssue, ExhibitionRecord, ExhibitionStatus, VenueCandidate, VenueRecord,
};
use gallerist_storage::{ArtifactStore, CatalogStore, PageFetcher};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{CrawlProfile, DEFAULT_TIMEZONE};

const PROGRESS_LOG_EVERY: usize = 5;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("no venue listing could be fetched for {city}")]
    ListingUnavailable { city: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub struct CityCrawler {
    source: Arc<dyn VenueSource>,
    fetcher: Arc<dyn PageFetcher>,
    catalog: Arc<dyn CatalogStore>,
    snapshots: Option<ArtifactStore>,
    timezone: Tz,
}

impl CityCrawler {
    pub fn new(
        source: Arc<dyn VenueSource>,
        fetcher: Arc<dyn PageFetcher>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            source,
            fetcher,
            catalog,
            snapshots: None,
            timezone: DEFAULT_TIMEZONE,
        }
    }

    /// Write a JSON snapshot of every city report under this store.
    pub fn with_snapshots(mut self, snapshots: ArtifactStore) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Timezone whose calendar date decides exhibition status.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub async fn crawl_city(
        &self,
        city: &City,
        profile: &CrawlProfile,
        stop: &CancellationToken,
    ) -> Result<CityCrawlReport, CrawlError> {
        let span = info_span!("crawl_city", city = %city.id);
        self.crawl_city_inner(city, profile, stop).instrument(span).await
    }

    async fn crawl_city_inner(
        &self,
        city: &City,
        profile: &CrawlProfile,
        stop: &CancellationToken,
    ) -> Result<CityCrawlReport, CrawlError> {
        let mut report = CityCrawlReport::new(&city.id, Utc::now());
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let mut attempted = 0usize;
        info!(
            name = %city.name,
            max_venues_per_type = profile.max_venues_per_type,
            kinds = profile.listing_kinds.len(),
            "city crawl started"
        );

        'kinds: for kind in &profile.listing_kinds {
            if stop.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let url = self.source.listing_url(city, *kind);
            let html = match self.fetcher.fetch(&url).await {
                Ok(html) => {
                    report.listings_fetched += 1;
                    html
                }
                Err(err) => {
                    warn!(%kind, %url, error = %err, "listing fetch failed");
                    report.listings_failed += 1;
                    report.errors.push(CrawlIssue {
                        venue: format!("listing:{kind}"),
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            let candidates = self.source.parse_venue_listing(&html, city, *kind)?;
            info!(%kind, found = candidates.len(), "parsed venue listing");

            for candidate in candidates.into_iter().take(profile.max_venues_per_type) {
                if stop.is_cancelled() {
                    report.interrupted = true;
                    break 'kinds;
                }

                let name = candidate.name.clone();
                match self.crawl_venue(city, candidate, today, &mut report).await {
                    Ok(()) => report.venues_processed += 1,
                    Err(err) => {
                        warn!(venue = %name, error = %format!("{err:#}"), "venue failed");
                        report.errors.push(CrawlIssue {
                            venue: name,
                            message: format!("{err:#}"),
                        });
                    }
                }

                attempted += 1;
                if attempted % PROGRESS_LOG_EVERY == 0 {
                    info!(
                        attempted,
                        processed = report.venues_processed,
                        exhibitions_saved = report.exhibitions_saved,
                        errors = report.errors.len(),
                        "crawl progress"
                    );
                }
            }
        }

        if report.listings_fetched == 0 && report.listings_failed > 0 {
            return Err(CrawlError::ListingUnavailable {
                city: city.id.clone(),
            });
        }

        report.finished_at = Some(Utc::now());
        info!(
            venues = report.venues_processed,
            exhibitions_found = report.exhibitions_found,
            exhibitions_saved = report.exhibitions_saved,
            upcoming = report.upcoming_exhibitions,
            errors = report.errors.len(),
            interrupted = report.interrupted,
            seconds = report.duration_secs(),
            "city crawl finished"
        );
        self.write_snapshot(&report).await;
        Ok(report)
    }

    async fn crawl_venue(
        &self,
        city: &City,
        candidate: VenueCandidate,
        today: NaiveDate,
        report: &mut CityCrawlReport,
    ) -> anyhow::Result<()> {
        let page = match candidate.detail_url.as_deref() {
            Some(url) => {
                let html = self
                    .fetcher
                    .fetch(url)
                    .await
                    .with_context(|| format!("fetching venue page {url}"))?;
                Some(self.source.parse_venue_detail(&html, url)?)
            }
            None => None,
        };
        let (details, exhibitions) = match page {
            Some(page) => (Some(page.details), page.exhibitions),
            None => (None, Vec::new()),
        };

        let venue = VenueRecord::from_candidate(city, candidate, details, Utc::now());
        let venue_id = self
            .catalog
            .upsert_venue(&venue)
            .await
            .with_context(|| format!("saving venue {}", venue.name))?;
        if venue.coordinates.is_some() {
            report.venues_with_coordinates += 1;
        }

        for found in exhibitions {
            report.exhibitions_found += 1;
            let record =
                ExhibitionRecord::from_candidate(&venue, found, self.source.source_id(), today, Utc::now());
            match self.catalog.upsert_exhibition(&record, venue_id).await {
                Ok(Some(_)) => {
                    report.exhibitions_saved += 1;
                    if record.status == ExhibitionStatus::Upcoming {
                        report.upcoming_exhibitions += 1;
                    }
                    report.exhibitions.push(record);
                }
                Ok(None) => debug!(venue = %venue.name, "skipped untitled exhibition"),
                Err(err) => {
                    warn!(venue = %venue.name, title = %record.title, error = %err, "exhibition not saved");
                    report.errors.push(CrawlIssue {
                        venue: format!("{} / {}", venue.name, record.title),
                        message: err.to_string(),
                    });
                }
            }
        }

        report.venues.push(venue);
        Ok(())
    }

    async fn write_snapshot(&self, report: &CityCrawlReport) {
        let Some(store) = &self.snapshots else {
            return;
        };
        match store.store_json(report.started_at, &report.city, report).await {
            Ok(stored) => debug!(path = %stored.relative_path.display(), "wrote city snapshot"),
            Err(err) => warn!(error = %format!("{err:#}"), "could not write city snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_city, test_city, FixtureFetcher, BASE_URL};
    use gallerist_adapters::ArtmapSource;
    use gallerist_core::ListingKind;
    use gallerist_storage::InMemoryCatalogStore;
    use tempfile::tempdir;

    fn crawler(fetcher: Arc<FixtureFetcher>, catalog: Arc<InMemoryCatalogStore>) -> CityCrawler {
        CityCrawler::new(Arc::new(ArtmapSource::new(BASE_URL)), fetcher, catalog)
    }

    fn institutions(max: usize) -> CrawlProfile {
        CrawlProfile::new(max, &[ListingKind::Institutions])
    }

    fn venue_names(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("Venue {i:02}")).collect()
    }

    #[tokio::test]
    async fn failing_venue_is_isolated_from_the_rest() {
        let fetcher = Arc::new(FixtureFetcher::default());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let city = test_city("citya", 1);
        let names = venue_names(10);
        seed_city(&fetcher, &city, ListingKind::Institutions, &names);
        fetcher.remove(&format!("{BASE_URL}/venue-03"));

        let report = crawler(fetcher.clone(), catalog.clone())
            .crawl_city(&city, &institutions(20), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.venues_processed, 9);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].venue, "Venue 03");
        assert_eq!(report.exhibitions_found, 9);
        assert_eq!(report.exhibitions_saved, 9);
        assert_eq!(catalog.venues().len(), 9);
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn storage_rejection_counts_as_a_venue_error() {
        let fetcher = Arc::new(FixtureFetcher::default());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let city = test_city("citya", 1);
        seed_city(&fetcher, &city, ListingKind::Institutions, &venue_names(3));
        catalog.reject_venue("Venue 02");

        let report = crawler(fetcher, catalog.clone())
            .crawl_city(&city, &institutions(20), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.venues_processed, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].message.contains("saving venue Venue 02"));
    }

    #[tokio::test]
    async fn unsaved_upcoming_shows_are_not_counted() {
        let fetcher = Arc::new(FixtureFetcher::default());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let city = test_city("citya", 1);
        seed_city(&fetcher, &city, ListingKind::Institutions, &venue_names(1));
        fetcher.insert(
            format!("{BASE_URL}/venue-01"),
            "<html><body><h1 class=\"venue-name\">Venue 01</h1>\
             <div class=\"upcoming-exhibitions\">\
             <div class=\"exhibition-item\"><h3 class=\"exhibition-title\">Spring Opening</h3>\
             <div class=\"exhibition-dates\">1 March 2099 – 30 May 2099</div></div>\
             <div class=\"exhibition-item\"><h3 class=\"exhibition-title\">Autumn Opening</h3>\
             <div class=\"exhibition-dates\">1 September 2099 – 30 November 2099</div></div>\
             </div></body></html>",
        );
        catalog.reject_exhibition("Autumn Opening");

        let report = crawler(fetcher, catalog.clone())
            .crawl_city(&city, &institutions(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.exhibitions_found, 2);
        assert_eq!(report.exhibitions_saved, 1);
        assert_eq!(report.upcoming_exhibitions, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].venue, "Venue 01 / Autumn Opening");
        assert_eq!(catalog.exhibitions().len(), 1);
    }

    #[tokio::test]
    async fn venue_cap_limits_detail_fetches() {
        let fetcher = Arc::new(FixtureFetcher::default());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let city = test_city("citya", 1);
        seed_city(&fetcher, &city, ListingKind::Institutions, &venue_names(6));

        let report = crawler(fetcher.clone(), catalog)
            .crawl_city(&city, &institutions(4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.venues_processed, 4);
        assert_eq!(fetcher.requests().len(), 5, "one listing plus four venue pages");
    }

    #[tokio::test]
    async fn missing_listings_fail_the_city() {
        let fetcher = Arc::new(FixtureFetcher::default());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let city = test_city("cityb", 1);

        let err = crawler(fetcher, catalog)
            .crawl_city(
                &city,
                &CrawlProfile::new(5, &[ListingKind::Institutions, ListingKind::Galleries]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::ListingUnavailable { ref city } if city == "cityb"));
    }

    #[tokio::test]
    async fn one_missing_listing_kind_is_only_an_issue() {
        let fetcher = Arc::new(FixtureFetcher::default());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let city = test_city("citya", 1);
        seed_city(&fetcher, &city, ListingKind::Institutions, &venue_names(2));

        let report = crawler(fetcher, catalog)
            .crawl_city(
                &city,
                &CrawlProfile::new(5, &[ListingKind::Institutions, ListingKind::Galleries]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.listings_fetched, 1);
        assert_eq!(report.listings_failed, 1);
        assert_eq!(report.errors[0].venue, "listing:galleries");
        assert_eq!(report.venues_processed, 2);
    }

    #[tokio::test]
    async fn stop_signal_interrupts_between_venues() {
        let fetcher = Arc::new(FixtureFetcher::default());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let city = test_city("citya", 1);
        seed_city(&fetcher, &city, ListingKind::Institutions, &venue_names(3));
        let stop = CancellationToken::new();
        stop.cancel();

        let report = crawler(fetcher, catalog)
            .crawl_city(&city, &institutions(5), &stop)
            .await
            .unwrap();
        assert!(report.interrupted);
        assert_eq!(report.venues_processed, 0);
    }

    #[tokio::test]
    async fn snapshot_is_written_per_city() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(FixtureFetcher::default());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let city = test_city("citya", 1);
        seed_city(&fetcher, &city, ListingKind::Institutions, &venue_names(1));

        let report = crawler(fetcher, catalog)
            .with_snapshots(ArtifactStore::new(dir.path()))
            .crawl_city(&city, &institutions(5), &CancellationToken::new())
            .await
            .unwrap();

        let stamp = report.started_at.format("%Y%m%d_%H%M%S").to_string();
        let city_dir = dir.path().join(stamp).join("citya");
        let files = std::fs::read_dir(city_dir).unwrap().count();
        assert_eq!(files, 1);
    }
}
