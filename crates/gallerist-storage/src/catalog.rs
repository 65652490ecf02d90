//! Venue/exhibition persistence with upsert-by-natural-key semantics.
//!
//! Identity fields never change once a row exists. Mutable fields are only
//! replaced by present values, so a sparse re-crawl never erases data.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use gallerist_core::{
    Coordinates, ExhibitionRecord, ExhibitionStatus, ExhibitionType, TaskExecutionRecord,
    VenueRecord, GROUP_EXHIBITION,
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{debug, info};

pub type VenueId = i64;
pub type ExhibitionId = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFootprint {
    pub bytes: i64,
    pub exhibitions: i64,
}

/// Counts feeding the catalog quality score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMetrics {
    pub total_venues: i64,
    pub venues_with_coordinates: i64,
    pub venues_fresh: i64,
    pub total_exhibitions: i64,
    pub exhibitions_complete: i64,
    pub cities_with_exhibitions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub day: NaiveDate,
    pub total_venues: i64,
    pub total_exhibitions: i64,
    pub exhibitions_collected: i64,
    pub ongoing: i64,
    pub upcoming: i64,
    pub ended: i64,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert_venue(&self, venue: &VenueRecord) -> Result<VenueId, StoreError>;

    /// Returns `None` when the record has no title and was not stored.
    async fn upsert_exhibition(
        &self,
        exhibition: &ExhibitionRecord,
        venue_id: VenueId,
    ) -> Result<Option<ExhibitionId>, StoreError>;

    /// Recompute status for every dated exhibition; returns rows changed.
    async fn sweep_exhibition_status(&self, today: NaiveDate) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<Duration, StoreError>;

    async fn footprint(&self) -> Result<StorageFootprint, StoreError>;

    async fn sample_query_latency(&self) -> Result<Duration, StoreError>;

    async fn catalog_metrics(&self, fresh_since: DateTime<Utc>) -> Result<CatalogMetrics, StoreError>;

    async fn record_health_snapshot(
        &self,
        status: &str,
        snapshot: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn aggregate_daily_stats(&self, day: NaiveDate) -> Result<DailyStats, StoreError>;
}

/// Append-only sink for scheduled task executions.
#[async_trait]
pub trait TaskLogSink: Send + Sync {
    async fn record(&self, entry: &TaskExecutionRecord) -> Result<(), StoreError>;
}

fn check_exhibition(exhibition: &ExhibitionRecord) -> Result<bool, StoreError> {
    if exhibition.title.trim().is_empty() {
        return Ok(false);
    }
    if !exhibition.has_valid_dates() {
        return Err(StoreError::InvalidRecord(format!(
            "exhibition `{}` ends before it starts",
            exhibition.title
        )));
    }
    Ok(true)
}

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("catalog migrations applied");
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn upsert_venue(&self, venue: &VenueRecord) -> Result<VenueId, StoreError> {
        let opening_hours = serde_json::to_value(&venue.opening_hours)?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO venues (
                name, city, country, venue_type, tier, address, website, phone, email,
                description, latitude, longitude, opening_hours, source_url, last_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (name, city) DO UPDATE SET
                country = EXCLUDED.country,
                venue_type = EXCLUDED.venue_type,
                tier = EXCLUDED.tier,
                address = COALESCE(EXCLUDED.address, venues.address),
                website = COALESCE(EXCLUDED.website, venues.website),
                phone = COALESCE(EXCLUDED.phone, venues.phone),
                email = COALESCE(EXCLUDED.email, venues.email),
                description = COALESCE(EXCLUDED.description, venues.description),
                latitude = COALESCE(EXCLUDED.latitude, venues.latitude),
                longitude = COALESCE(EXCLUDED.longitude, venues.longitude),
                opening_hours = CASE
                    WHEN EXCLUDED.opening_hours = '{}'::jsonb THEN venues.opening_hours
                    ELSE EXCLUDED.opening_hours
                END,
                source_url = COALESCE(EXCLUDED.source_url, venues.source_url),
                last_updated = EXCLUDED.last_updated
            RETURNING id
            "#,
        )
        .bind(&venue.name)
        .bind(&venue.city)
        .bind(&venue.country)
        .bind(venue.venue_type.as_str())
        .bind(i16::from(venue.tier))
        .bind(&venue.address)
        .bind(&venue.website)
        .bind(&venue.phone)
        .bind(&venue.email)
        .bind(&venue.description)
        .bind(venue.coordinates.map(|c| c.lat))
        .bind(venue.coordinates.map(|c| c.lng))
        .bind(opening_hours)
        .bind(&venue.source_url)
        .bind(venue.last_updated)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn upsert_exhibition(
        &self,
        exhibition: &ExhibitionRecord,
        venue_id: VenueId,
    ) -> Result<Option<ExhibitionId>, StoreError> {
        if !check_exhibition(exhibition)? {
            return Ok(None);
        }
        let row = sqlx::query(
            r#"
            INSERT INTO exhibitions (
                title, venue_id, venue_name, city, country, start_date, end_date, artists,
                description, curator, image_url, opening_info, source_url, source,
                exhibition_type, status, collected_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
            ON CONFLICT (title, venue_id, start_date) DO UPDATE SET
                end_date = COALESCE(EXCLUDED.end_date, exhibitions.end_date),
                artists = CASE
                    WHEN EXCLUDED.artists = ARRAY['Group Exhibition'] THEN exhibitions.artists
                    ELSE EXCLUDED.artists
                END,
                exhibition_type = CASE
                    WHEN EXCLUDED.artists = ARRAY['Group Exhibition'] THEN exhibitions.exhibition_type
                    ELSE EXCLUDED.exhibition_type
                END,
                description = COALESCE(EXCLUDED.description, exhibitions.description),
                curator = COALESCE(EXCLUDED.curator, exhibitions.curator),
                image_url = COALESCE(EXCLUDED.image_url, exhibitions.image_url),
                opening_info = COALESCE(EXCLUDED.opening_info, exhibitions.opening_info),
                source_url = COALESCE(EXCLUDED.source_url, exhibitions.source_url),
                status = CASE
                    WHEN EXCLUDED.end_date IS NULL
                         AND exhibitions.end_date IS NOT NULL
                         AND EXCLUDED.status = 'ongoing'
                         AND exhibitions.end_date < (EXCLUDED.collected_at AT TIME ZONE 'UTC')::date
                        THEN 'ended'
                    ELSE EXCLUDED.status
                END,
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(exhibition.title.trim())
        .bind(venue_id)
        .bind(&exhibition.venue_name)
        .bind(&exhibition.city)
        .bind(&exhibition.country)
        .bind(exhibition.start_date)
        .bind(exhibition.end_date)
        .bind(&exhibition.artists)
        .bind(&exhibition.description)
        .bind(&exhibition.curator)
        .bind(&exhibition.image_url)
        .bind(&exhibition.opening_info)
        .bind(&exhibition.source_url)
        .bind(&exhibition.source)
        .bind(exhibition.exhibition_type.as_str())
        .bind(exhibition.status.as_str())
        .bind(exhibition.collected_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(Some(row.try_get("id")?))
    }

    async fn sweep_exhibition_status(&self, today: NaiveDate) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            WITH derived AS (
                SELECT id,
                       CASE
                           WHEN start_date > $1 THEN 'upcoming'
                           WHEN end_date < $1 THEN 'ended'
                           ELSE 'ongoing'
                       END AS next_status
                  FROM exhibitions
                 WHERE start_date IS NOT NULL OR end_date IS NOT NULL
            )
            UPDATE exhibitions e
               SET status = d.next_status,
                   updated_at = NOW()
              FROM derived d
             WHERE e.id = d.id
               AND e.status <> d.next_status
            "#,
        )
        .bind(today)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<Duration, StoreError> {
        let started = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(started.elapsed())
    }

    async fn footprint(&self) -> Result<StorageFootprint, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT pg_database_size(current_database()) AS bytes,
                   (SELECT COUNT(*) FROM exhibitions) AS exhibitions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StorageFootprint {
            bytes: row.try_get("bytes")?,
            exhibitions: row.try_get("exhibitions")?,
        })
    }

    async fn sample_query_latency(&self) -> Result<Duration, StoreError> {
        let started = Instant::now();
        let _: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exhibitions WHERE collected_at > NOW() - INTERVAL '1 day'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(started.elapsed())
    }

    async fn catalog_metrics(&self, fresh_since: DateTime<Utc>) -> Result<CatalogMetrics, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM venues) AS total_venues,
                (SELECT COUNT(*) FROM venues
                  WHERE latitude IS NOT NULL AND longitude IS NOT NULL) AS venues_with_coordinates,
                (SELECT COUNT(*) FROM venues WHERE last_updated >= $1) AS venues_fresh,
                (SELECT COUNT(*) FROM exhibitions) AS total_exhibitions,
                (SELECT COUNT(*) FROM exhibitions
                  WHERE start_date IS NOT NULL
                    AND end_date IS NOT NULL
                    AND description IS NOT NULL) AS exhibitions_complete,
                (SELECT COUNT(DISTINCT city) FROM exhibitions) AS cities_with_exhibitions
            "#,
        )
        .bind(fresh_since)
        .fetch_one(&self.pool)
        .await?;
        Ok(CatalogMetrics {
            total_venues: row.try_get("total_venues")?,
            venues_with_coordinates: row.try_get("venues_with_coordinates")?,
            venues_fresh: row.try_get("venues_fresh")?,
            total_exhibitions: row.try_get("total_exhibitions")?,
            exhibitions_complete: row.try_get("exhibitions_complete")?,
            cities_with_exhibitions: row.try_get("cities_with_exhibitions")?,
        })
    }

    async fn record_health_snapshot(
        &self,
        status: &str,
        snapshot: &serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO system_health_logs (status, payload, checked_at) VALUES ($1, $2, NOW())")
            .bind(status)
            .bind(snapshot)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn aggregate_daily_stats(&self, day: NaiveDate) -> Result<DailyStats, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO daily_stats (
                day, total_venues, total_exhibitions, exhibitions_collected,
                ongoing, upcoming, ended, updated_at
            )
            SELECT $1,
                   (SELECT COUNT(*) FROM venues),
                   (SELECT COUNT(*) FROM exhibitions),
                   (SELECT COUNT(*) FROM exhibitions WHERE collected_at::date = $1),
                   (SELECT COUNT(*) FROM exhibitions WHERE status = 'ongoing'),
                   (SELECT COUNT(*) FROM exhibitions WHERE status = 'upcoming'),
                   (SELECT COUNT(*) FROM exhibitions WHERE status = 'ended'),
                   NOW()
            ON CONFLICT (day) DO UPDATE SET
                total_venues = EXCLUDED.total_venues,
                total_exhibitions = EXCLUDED.total_exhibitions,
                exhibitions_collected = EXCLUDED.exhibitions_collected,
                ongoing = EXCLUDED.ongoing,
                upcoming = EXCLUDED.upcoming,
                ended = EXCLUDED.ended,
                updated_at = EXCLUDED.updated_at
            RETURNING day, total_venues, total_exhibitions, exhibitions_collected,
                      ongoing, upcoming, ended
            "#,
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await?;
        Ok(DailyStats {
            day: row.try_get("day")?,
            total_venues: row.try_get("total_venues")?,
            total_exhibitions: row.try_get("total_exhibitions")?,
            exhibitions_collected: row.try_get("exhibitions_collected")?,
            ongoing: row.try_get("ongoing")?,
            upcoming: row.try_get("upcoming")?,
            ended: row.try_get("ended")?,
        })
    }
}

#[async_trait]
impl TaskLogSink for PgCatalogStore {
    async fn record(&self, entry: &TaskExecutionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_task_logs (task_name, status, duration_ms, error_message, executed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.task_name)
        .bind(entry.status.as_str())
        .bind(entry.duration_ms)
        .bind(&entry.error_message)
        .bind(entry.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    venues: Vec<(VenueId, VenueRecord)>,
    exhibitions: Vec<(ExhibitionId, VenueId, ExhibitionRecord)>,
    health: Vec<(String, serde_json::Value)>,
    daily: BTreeMap<NaiveDate, DailyStats>,
    task_logs: Vec<TaskExecutionRecord>,
    rejected_venues: HashSet<String>,
    rejected_exhibitions: HashSet<String>,
}

/// Process-local catalog with the same merge rules as the Postgres store.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory catalog marked offline".into()));
        }
        Ok(())
    }

    /// Make every operation fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Refuse writes for a venue name, simulating a per-row constraint failure.
    pub fn reject_venue(&self, name: &str) {
        self.lock().rejected_venues.insert(name.to_string());
    }

    pub fn reject_exhibition(&self, title: &str) {
        self.lock().rejected_exhibitions.insert(title.to_string());
    }

    pub fn venues(&self) -> Vec<VenueRecord> {
        self.lock().venues.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn exhibitions(&self) -> Vec<ExhibitionRecord> {
        self.lock()
            .exhibitions
            .iter()
            .map(|(_, _, e)| e.clone())
            .collect()
    }

    pub fn task_logs(&self) -> Vec<TaskExecutionRecord> {
        self.lock().task_logs.clone()
    }

    pub fn health_snapshots(&self) -> Vec<(String, serde_json::Value)> {
        self.lock().health.clone()
    }
}

fn keep_present<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        slot.clone_from(incoming);
    }
}

fn merge_venue(existing: &mut VenueRecord, incoming: &VenueRecord) {
    existing.country.clone_from(&incoming.country);
    existing.venue_type = incoming.venue_type;
    existing.tier = incoming.tier;
    keep_present(&mut existing.address, &incoming.address);
    keep_present(&mut existing.website, &incoming.website);
    keep_present(&mut existing.phone, &incoming.phone);
    keep_present(&mut existing.email, &incoming.email);
    keep_present(&mut existing.description, &incoming.description);
    keep_present::<Coordinates>(&mut existing.coordinates, &incoming.coordinates);
    keep_present(&mut existing.source_url, &incoming.source_url);
    if !incoming.opening_hours.is_empty() {
        existing.opening_hours.clone_from(&incoming.opening_hours);
    }
    existing.last_updated = incoming.last_updated;
}

fn merge_exhibition(existing: &mut ExhibitionRecord, incoming: &ExhibitionRecord) {
    let end_retained = incoming.end_date.is_none() && existing.end_date.is_some();
    keep_present(&mut existing.end_date, &incoming.end_date);
    if incoming.artists != [GROUP_EXHIBITION] {
        existing.artists.clone_from(&incoming.artists);
        existing.exhibition_type = ExhibitionType::from_artists(&existing.artists);
    }
    keep_present(&mut existing.description, &incoming.description);
    keep_present(&mut existing.curator, &incoming.curator);
    keep_present(&mut existing.image_url, &incoming.image_url);
    keep_present(&mut existing.opening_info, &incoming.opening_info);
    keep_present(&mut existing.source_url, &incoming.source_url);
    // The incoming status was derived without the end date kept from the stored row.
    existing.status = if end_retained {
        ExhibitionStatus::derive(
            existing.start_date,
            existing.end_date,
            incoming.collected_at.date_naive(),
            Some(incoming.status),
        )
    } else {
        incoming.status
    };
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn upsert_venue(&self, venue: &VenueRecord) -> Result<VenueId, StoreError> {
        self.ensure_available()?;
        let mut state = self.lock();
        if state.rejected_venues.contains(&venue.name) {
            return Err(StoreError::InvalidRecord(format!("venue `{}` rejected", venue.name)));
        }
        if let Some((id, existing)) = state
            .venues
            .iter_mut()
            .find(|(_, v)| v.name == venue.name && v.city == venue.city)
        {
            merge_venue(existing, venue);
            return Ok(*id);
        }
        let id = state.venues.len() as VenueId + 1;
        state.venues.push((id, venue.clone()));
        debug!(venue = %venue.name, id, "inserted venue");
        Ok(id)
    }

    async fn upsert_exhibition(
        &self,
        exhibition: &ExhibitionRecord,
        venue_id: VenueId,
    ) -> Result<Option<ExhibitionId>, StoreError> {
        self.ensure_available()?;
        if !check_exhibition(exhibition)? {
            return Ok(None);
        }
        let title = exhibition.title.trim();
        let mut state = self.lock();
        if state.rejected_exhibitions.contains(title) {
            return Err(StoreError::InvalidRecord(format!("exhibition `{title}` rejected")));
        }
        if let Some((id, _, existing)) = state.exhibitions.iter_mut().find(|(_, v, e)| {
            *v == venue_id && e.title == title && e.start_date == exhibition.start_date
        }) {
            merge_exhibition(existing, exhibition);
            return Ok(Some(*id));
        }
        let id = state.exhibitions.len() as ExhibitionId + 1;
        let mut stored = exhibition.clone();
        stored.title = title.to_string();
        state.exhibitions.push((id, venue_id, stored));
        Ok(Some(id))
    }

    async fn sweep_exhibition_status(&self, today: NaiveDate) -> Result<u64, StoreError> {
        self.ensure_available()?;
        let mut changed = 0;
        for (_, _, exhibition) in self.lock().exhibitions.iter_mut() {
            if exhibition.start_date.is_none() && exhibition.end_date.is_none() {
                continue;
            }
            let next = ExhibitionStatus::derive(exhibition.start_date, exhibition.end_date, today, None);
            if next != exhibition.status {
                exhibition.status = next;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn ping(&self) -> Result<Duration, StoreError> {
        self.ensure_available()?;
        Ok(Duration::ZERO)
    }

    async fn footprint(&self) -> Result<StorageFootprint, StoreError> {
        self.ensure_available()?;
        let state = self.lock();
        let venues = serde_json::to_vec(&state.venues.iter().map(|(_, v)| v).collect::<Vec<_>>())?;
        let exhibitions =
            serde_json::to_vec(&state.exhibitions.iter().map(|(_, _, e)| e).collect::<Vec<_>>())?;
        Ok(StorageFootprint {
            bytes: (venues.len() + exhibitions.len()) as i64,
            exhibitions: state.exhibitions.len() as i64,
        })
    }

    async fn sample_query_latency(&self) -> Result<Duration, StoreError> {
        self.ensure_available()?;
        Ok(Duration::ZERO)
    }

    async fn catalog_metrics(&self, fresh_since: DateTime<Utc>) -> Result<CatalogMetrics, StoreError> {
        self.ensure_available()?;
        let state = self.lock();
        let venues = state.venues.iter().map(|(_, v)| v);
        let exhibitions = state.exhibitions.iter().map(|(_, _, e)| e);
        Ok(CatalogMetrics {
            total_venues: state.venues.len() as i64,
            venues_with_coordinates: venues.clone().filter(|v| v.coordinates.is_some()).count() as i64,
            venues_fresh: venues.filter(|v| v.last_updated >= fresh_since).count() as i64,
            total_exhibitions: state.exhibitions.len() as i64,
            exhibitions_complete: exhibitions
                .clone()
                .filter(|e| e.start_date.is_some() && e.end_date.is_some() && e.description.is_some())
                .count() as i64,
            cities_with_exhibitions: exhibitions
                .map(|e| e.city.as_str())
                .collect::<BTreeSet<_>>()
                .len() as i64,
        })
    }

    async fn record_health_snapshot(
        &self,
        status: &str,
        snapshot: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.lock().health.push((status.to_string(), snapshot.clone()));
        Ok(())
    }

    async fn aggregate_daily_stats(&self, day: NaiveDate) -> Result<DailyStats, StoreError> {
        self.ensure_available()?;
        let mut state = self.lock();
        let count_status = |status: ExhibitionStatus| {
            state
                .exhibitions
                .iter()
                .filter(|(_, _, e)| e.status == status)
                .count() as i64
        };
        let stats = DailyStats {
            day,
            total_venues: state.venues.len() as i64,
            total_exhibitions: state.exhibitions.len() as i64,
            exhibitions_collected: state
                .exhibitions
                .iter()
                .filter(|(_, _, e)| e.collected_at.date_naive() == day)
                .count() as i64,
            ongoing: count_status(ExhibitionStatus::Ongoing),
            upcoming: count_status(ExhibitionStatus::Upcoming),
            ended: count_status(ExhibitionStatus::Ended),
        };
        state.daily.insert(day, stats.clone());
        Ok(stats)
    }
}

#[async_trait]
impl TaskLogSink for InMemoryCatalogStore {
    async fn record(&self, entry: &TaskExecutionRecord) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.lock().task_logs.push(entry.clone());
        Ok(())
    }
}
