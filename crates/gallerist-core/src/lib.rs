//! Core domain model for the gallerist venue/exhibition catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "gallerist-core";

/// Artist list placeholder for exhibitions that name nobody.
pub const GROUP_EXHIBITION: &str = "Group Exhibition";

/// ISO country code used when a city has no known country.
pub const UNKNOWN_COUNTRY: &str = "XX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueType {
    Museum,
    Gallery,
    ArtCenter,
    CulturalCenter,
}

const MUSEUM_KEYWORDS: &[&str] = &[
    "museum", "museo", "musée", "musee", "museu", "muzeum", "미술관", "박물관", "美術館", "博物館",
    "美术馆", "博物馆",
];
const ART_CENTER_KEYWORDS: &[&str] = &[
    "art center",
    "art centre",
    "arts center",
    "arts centre",
    "kunsthalle",
    "kunstverein",
    "centre d'art",
    "centro de arte",
    "아트센터",
];
const GALLERY_KEYWORDS: &[&str] = &[
    "gallery", "galerie", "galleria", "galería", "galeria", "갤러리", "画廊", "ギャラリー",
];
const CULTURAL_CENTER_KEYWORDS: &[&str] = &[
    "foundation",
    "fondation",
    "fondazione",
    "fundación",
    "fundacion",
    "stiftung",
    "institute",
    "institut",
    "cultural center",
    "cultural centre",
    "재단",
];

impl VenueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Museum => "museum",
            Self::Gallery => "gallery",
            Self::ArtCenter => "art_center",
            Self::CulturalCenter => "cultural_center",
        }
    }

    /// Classify a venue from keywords in its name, falling back to the listing category.
    pub fn classify(name: &str, fallback: VenueType) -> VenueType {
        let lowered = name.to_lowercase();
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));
        if has_any(MUSEUM_KEYWORDS) {
            Self::Museum
        } else if has_any(ART_CENTER_KEYWORDS) {
            Self::ArtCenter
        } else if has_any(GALLERY_KEYWORDS) {
            Self::Gallery
        } else if has_any(CULTURAL_CENTER_KEYWORDS) {
            Self::CulturalCenter
        } else {
            fallback
        }
    }
}

impl fmt::Display for VenueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Venue category page exposed by a listing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Institutions,
    Galleries,
    FurtherSpaces,
}

impl ListingKind {
    pub const ALL: [ListingKind; 3] = [Self::Institutions, Self::Galleries, Self::FurtherSpaces];

    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Institutions => "institutions",
            Self::Galleries => "galleries",
            Self::FurtherSpaces => "furtherspaces",
        }
    }

    pub fn default_venue_type(&self) -> VenueType {
        match self {
            Self::Institutions => VenueType::Museum,
            Self::Galleries => VenueType::Gallery,
            Self::FurtherSpaces => VenueType::ArtCenter,
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Crawl priority tier of a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "tier1")]
    One,
    #[serde(rename = "tier2")]
    Two,
    #[serde(rename = "tier3")]
    Three,
    #[serde(rename = "tier4")]
    Four,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Self::One, Self::Two, Self::Three, Self::Four];

    pub fn number(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.number())
    }
}

/// A crawlable city from the tier catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    /// Stable catalog id, e.g. `newyork`.
    pub id: String,
    pub name: String,
    /// Path segment used by listing sources, e.g. `new-york`.
    #[serde(default)]
    pub slug: String,
    #[serde(default = "unknown_country")]
    pub country: String,
    /// Filled from the owning tier when the catalog is loaded.
    #[serde(default)]
    pub tier: u8,
}

fn unknown_country() -> String {
    UNKNOWN_COUNTRY.to_string()
}

impl City {
    pub fn new(id: &str, name: &str, slug: &str, country: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            country: country.to_string(),
            tier: 0,
        }
    }
}

/// Validated WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(Self { lat, lng })
    }
}

/// Venue as seen on a listing page, before its detail page is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueCandidate {
    pub name: String,
    pub city: String,
    pub listing_kind: ListingKind,
    pub detail_url: Option<String>,
    pub address: Option<String>,
}

/// Fields read from a venue detail page. Absent fields never override listing data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueDetails {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub opening_hours: BTreeMap<String, String>,
}

/// Persisted venue, keyed by `(name, city)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub name: String,
    pub city: String,
    pub country: String,
    pub venue_type: VenueType,
    pub tier: u8,
    pub address: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub opening_hours: BTreeMap<String, String>,
    pub source_url: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl VenueRecord {
    /// Overlay detail-page fields on a listing candidate. Present detail values win.
    pub fn from_candidate(
        city: &City,
        candidate: VenueCandidate,
        details: Option<VenueDetails>,
        seen_at: DateTime<Utc>,
    ) -> Self {
        let details = details.unwrap_or_default();
        let name = details.name.unwrap_or(candidate.name);
        let venue_type = VenueType::classify(&name, candidate.listing_kind.default_venue_type());
        Self {
            venue_type,
            city: city.id.clone(),
            country: city.country.clone(),
            tier: city.tier,
            address: details.address.or(candidate.address),
            website: details.website,
            phone: details.phone,
            email: details.email,
            description: details.description,
            coordinates: details.coordinates,
            opening_hours: details.opening_hours,
            source_url: candidate.detail_url,
            last_updated: seen_at,
            name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhibitionStatus {
    Upcoming,
    Ongoing,
    Ended,
}

impl ExhibitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Ongoing => "ongoing",
            Self::Ended => "ended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upcoming" => Some(Self::Upcoming),
            "ongoing" => Some(Self::Ongoing),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }

    /// Status as a pure function of the dates and today.
    ///
    /// Undated exhibitions keep the section hint from the page they were found on.
    pub fn derive(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
        undated_hint: Option<ExhibitionStatus>,
    ) -> Self {
        match (start, end) {
            (None, None) => undated_hint.unwrap_or(Self::Ongoing),
            (Some(start), _) if start > today => Self::Upcoming,
            (_, Some(end)) if end < today => Self::Ended,
            _ => Self::Ongoing,
        }
    }
}

impl fmt::Display for ExhibitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhibitionType {
    Solo,
    Group,
}

impl ExhibitionType {
    pub fn from_artists(artists: &[String]) -> Self {
        if artists.len() == 1 && artists[0] != GROUP_EXHIBITION {
            Self::Solo
        } else {
            Self::Group
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solo => "solo",
            Self::Group => "group",
        }
    }
}

/// Exhibition block as parsed from a venue page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhibitionCandidate {
    pub title: String,
    pub artists: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub curator: Option<String>,
    pub image_url: Option<String>,
    pub opening_info: Option<String>,
    pub source_url: Option<String>,
    /// Found in an "upcoming" section of the page.
    pub listed_as_upcoming: bool,
}

/// Persisted exhibition, keyed by `(title, venue_id, start_date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhibitionRecord {
    pub title: String,
    pub venue_name: String,
    pub city: String,
    pub country: String,
    pub artists: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub curator: Option<String>,
    pub image_url: Option<String>,
    pub opening_info: Option<String>,
    pub source_url: Option<String>,
    pub source: String,
    pub exhibition_type: ExhibitionType,
    pub status: ExhibitionStatus,
    pub collected_at: DateTime<Utc>,
}

impl ExhibitionRecord {
    pub fn from_candidate(
        venue: &VenueRecord,
        candidate: ExhibitionCandidate,
        source: &str,
        today: NaiveDate,
        collected_at: DateTime<Utc>,
    ) -> Self {
        let artists = if candidate.artists.is_empty() {
            vec![GROUP_EXHIBITION.to_string()]
        } else {
            candidate.artists
        };
        let hint = candidate
            .listed_as_upcoming
            .then_some(ExhibitionStatus::Upcoming);
        let end_date = match (candidate.start_date, candidate.end_date) {
            (Some(start), Some(end)) if end < start => None,
            (_, end) => end,
        };
        Self {
            status: ExhibitionStatus::derive(candidate.start_date, end_date, today, hint),
            exhibition_type: ExhibitionType::from_artists(&artists),
            title: candidate.title,
            venue_name: venue.name.clone(),
            city: venue.city.clone(),
            country: venue.country.clone(),
            artists,
            start_date: candidate.start_date,
            end_date,
            description: candidate.description,
            curator: candidate.curator,
            image_url: candidate.image_url,
            opening_info: candidate.opening_info,
            source_url: candidate.source_url.or_else(|| venue.source_url.clone()),
            source: source.to_string(),
            collected_at,
        }
    }

    pub fn has_valid_dates(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }
}

/// Counters accumulated by crawls and batch runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTotals {
    pub venues_processed: u64,
    pub exhibitions_found: u64,
    pub exhibitions_saved: u64,
    pub errors: u64,
}

impl CrawlTotals {
    pub fn absorb(&mut self, report: &CityCrawlReport) {
        self.venues_processed += report.venues_processed;
        self.exhibitions_found += report.exhibitions_found;
        self.exhibitions_saved += report.exhibitions_saved;
        self.errors += report.errors.len() as u64;
    }
}

/// Durable batch progress, saved after every city.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlProgress {
    pub completed_cities: BTreeSet<String>,
    pub totals: CrawlTotals,
    pub last_run: Option<DateTime<Utc>>,
}

impl CrawlProgress {
    pub fn is_completed(&self, city_id: &str) -> bool {
        self.completed_cities.contains(city_id)
    }

    pub fn mark_completed(&mut self, city_id: &str) {
        self.completed_cities.insert(city_id.to_string());
    }

    /// Drop completion marks for the given cities so a new cycle crawls them again.
    pub fn restart_cycle<'a>(&mut self, city_ids: impl IntoIterator<Item = &'a str>) {
        for id in city_ids {
            self.completed_cities.remove(id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlIssue {
    pub venue: String,
    pub message: String,
}

/// Outcome of crawling one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityCrawlReport {
    pub city: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub listings_fetched: u64,
    pub listings_failed: u64,
    pub venues_processed: u64,
    pub venues_with_coordinates: u64,
    pub exhibitions_found: u64,
    pub exhibitions_saved: u64,
    pub upcoming_exhibitions: u64,
    pub errors: Vec<CrawlIssue>,
    pub interrupted: bool,
    pub venues: Vec<VenueRecord>,
    pub exhibitions: Vec<ExhibitionRecord>,
}

impl CityCrawlReport {
    pub fn new(city: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            city: city.to_string(),
            started_at,
            finished_at: None,
            listings_fetched: 0,
            listings_failed: 0,
            venues_processed: 0,
            venues_with_coordinates: 0,
            exhibitions_found: 0,
            exhibitions_saved: 0,
            upcoming_exhibitions: 0,
            errors: Vec::new(),
            interrupted: false,
            venues: Vec::new(),
            exhibitions: Vec::new(),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCity {
    pub city: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityOutcome {
    pub city: String,
    pub venues_processed: u64,
    pub exhibitions_found: u64,
    pub exhibitions_saved: u64,
    pub errors: u64,
    pub duration_secs: f64,
}

impl From<&CityCrawlReport> for CityOutcome {
    fn from(report: &CityCrawlReport) -> Self {
        Self {
            city: report.city.clone(),
            venues_processed: report.venues_processed,
            exhibitions_found: report.exhibitions_found,
            exhibitions_saved: report.exhibitions_saved,
            errors: report.errors.len() as u64,
            duration_secs: report.duration_secs(),
        }
    }
}

/// Summary of one batch run across many cities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub selection: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub successful_cities: Vec<String>,
    pub failed_cities: Vec<FailedCity>,
    pub skipped_cities: Vec<String>,
    pub cities: Vec<CityOutcome>,
    pub totals: CrawlTotals,
    pub interrupted: bool,
    pub reports_dir: Option<String>,
}

impl RunSummary {
    pub fn new(run_id: Uuid, selection: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            selection: selection.into(),
            started_at,
            finished_at: None,
            duration_secs: 0.0,
            successful_cities: Vec::new(),
            failed_cities: Vec::new(),
            skipped_cities: Vec::new(),
            cities: Vec::new(),
            totals: CrawlTotals::default(),
            interrupted: false,
            reports_dir: None,
        }
    }

    pub fn attempted(&self) -> usize {
        self.successful_cities.len() + self.failed_cities.len()
    }

    /// Percentage of attempted cities that completed, 100 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            return 100.0;
        }
        round2(self.successful_cities.len() as f64 / attempted as f64 * 100.0)
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.duration_secs = (finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.finished_at = Some(finished_at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Append-only log line for one scheduled task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub task_name: String,
    pub status: TaskStatus,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn london() -> City {
        let mut city = City::new("london", "London", "london", "GB");
        city.tier = 1;
        city
    }

    fn seen_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn status_follows_dates_relative_to_today() {
        let today = day(2025, 3, 10);
        assert_eq!(
            ExhibitionStatus::derive(Some(day(2025, 4, 1)), Some(day(2025, 5, 1)), today, None),
            ExhibitionStatus::Upcoming
        );
        assert_eq!(
            ExhibitionStatus::derive(Some(day(2025, 1, 1)), Some(day(2025, 3, 9)), today, None),
            ExhibitionStatus::Ended
        );
        assert_eq!(
            ExhibitionStatus::derive(Some(day(2025, 3, 10)), Some(day(2025, 3, 10)), today, None),
            ExhibitionStatus::Ongoing
        );
        assert_eq!(
            ExhibitionStatus::derive(None, Some(day(2025, 6, 1)), today, None),
            ExhibitionStatus::Ongoing
        );
    }

    #[test]
    fn undated_exhibitions_use_section_hint() {
        let today = day(2025, 3, 10);
        assert_eq!(
            ExhibitionStatus::derive(None, None, today, Some(ExhibitionStatus::Upcoming)),
            ExhibitionStatus::Upcoming
        );
        assert_eq!(
            ExhibitionStatus::derive(None, None, today, None),
            ExhibitionStatus::Ongoing
        );
    }

    #[test]
    fn classify_prefers_name_keywords_over_listing_kind() {
        assert_eq!(
            VenueType::classify("Tate Modern Museum", VenueType::Gallery),
            VenueType::Museum
        );
        assert_eq!(
            VenueType::classify("Kunsthalle Basel", VenueType::Museum),
            VenueType::ArtCenter
        );
        assert_eq!(
            VenueType::classify("Galerie Max Hetzler", VenueType::Museum),
            VenueType::Gallery
        );
        assert_eq!(
            VenueType::classify("Fondation Cartier", VenueType::Gallery),
            VenueType::CulturalCenter
        );
        assert_eq!(VenueType::classify("Serpentine", VenueType::Museum), VenueType::Museum);
    }

    #[test]
    fn coordinates_outside_range_are_rejected() {
        assert!(Coordinates::new(51.5, -0.12).is_some());
        assert!(Coordinates::new(91.0, 0.0).is_none());
        assert!(Coordinates::new(0.0, -181.0).is_none());
        assert!(Coordinates::new(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn details_override_listing_only_when_present() {
        let candidate = VenueCandidate {
            name: "Whitechapel".into(),
            city: "london".into(),
            listing_kind: ListingKind::Galleries,
            detail_url: Some("https://artmap.com/whitechapel".into()),
            address: Some("77-82 Whitechapel High St".into()),
        };
        let details = VenueDetails {
            name: Some("Whitechapel Gallery".into()),
            phone: Some("+44 20 7522 7888".into()),
            ..Default::default()
        };
        let venue = VenueRecord::from_candidate(&london(), candidate, Some(details), seen_at());
        assert_eq!(venue.name, "Whitechapel Gallery");
        assert_eq!(venue.address.as_deref(), Some("77-82 Whitechapel High St"));
        assert_eq!(venue.phone.as_deref(), Some("+44 20 7522 7888"));
        assert_eq!(venue.venue_type, VenueType::Gallery);
        assert_eq!(venue.country, "GB");
        assert_eq!(venue.tier, 1);
    }

    #[test]
    fn exhibition_record_defaults_artists_and_drops_inverted_end_date() {
        let venue = VenueRecord::from_candidate(
            &london(),
            VenueCandidate {
                name: "Serpentine".into(),
                city: "london".into(),
                listing_kind: ListingKind::Institutions,
                detail_url: None,
                address: None,
            },
            None,
            seen_at(),
        );
        let candidate = ExhibitionCandidate {
            title: "Summer Show".into(),
            artists: Vec::new(),
            start_date: Some(day(2025, 6, 1)),
            end_date: Some(day(2025, 5, 1)),
            description: None,
            curator: None,
            image_url: None,
            opening_info: None,
            source_url: None,
            listed_as_upcoming: false,
        };
        let record =
            ExhibitionRecord::from_candidate(&venue, candidate, "artmap", day(2025, 3, 1), seen_at());
        assert_eq!(record.artists, vec![GROUP_EXHIBITION.to_string()]);
        assert_eq!(record.exhibition_type, ExhibitionType::Group);
        assert_eq!(record.end_date, None);
        assert_eq!(record.status, ExhibitionStatus::Upcoming);
        assert!(record.has_valid_dates());
    }

    #[test]
    fn single_named_artist_is_a_solo_show() {
        assert_eq!(
            ExhibitionType::from_artists(&["Yayoi Kusama".to_string()]),
            ExhibitionType::Solo
        );
        assert_eq!(
            ExhibitionType::from_artists(&["A".to_string(), "B".to_string()]),
            ExhibitionType::Group
        );
    }

    #[test]
    fn progress_restart_cycle_only_clears_selected_cities() {
        let mut progress = CrawlProgress::default();
        progress.mark_completed("london");
        progress.mark_completed("paris");
        progress.mark_completed("tokyo");
        progress.restart_cycle(["london", "paris"]);
        assert!(!progress.is_completed("london"));
        assert!(progress.is_completed("tokyo"));

        let json = serde_json::to_string(&progress).unwrap();
        let back: CrawlProgress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, progress);
    }

    #[test]
    fn run_summary_success_rate_counts_attempted_cities() {
        let mut summary = RunSummary::new(Uuid::new_v4(), "tier1", seen_at());
        assert_eq!(summary.success_rate(), 100.0);
        summary.successful_cities.push("london".into());
        summary.successful_cities.push("paris".into());
        summary.failed_cities.push(FailedCity {
            city: "berlin".into(),
            error: "listing unavailable".into(),
        });
        assert_eq!(summary.success_rate(), 66.67);
    }
}
