//! artmap.com venue directory: per-city listing tables and venue pages with exhibition blocks.

use std::collections::HashSet;

use gallerist_core::{City, Coordinates, ExhibitionCandidate, ListingKind, VenueCandidate, VenueDetails};
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::normalize::{clean_text, extract_coordinates, normalize_url, parse_date_range, parse_opening_hours};
use crate::{
    element_text, first_attr, first_text, select_all_texts, selector, ParseError, VenueDetailPage,
    VenueSource,
};

pub const ARTMAP_BASE_URL: &str = "https://artmap.com";

const NAME: &[&str] = &[".venue-name", ".institution-name", "h1"];
const ADDRESS: &[&str] = &[".address", ".venue-address", ".location"];
const PHONE: &[&str] = &[".phone", ".tel", ".contact-phone"];
const WEBSITE: &[&str] = &["a.website", "a.venue-website", ".venue-website a"];
const DESCRIPTION: &[&str] = &[".venue-description", ".about"];
const HOURS: &[&str] = &[".opening-hours", ".hours"];
const MAP_LINKS: &[&str] = &[
    "a[href*=\"maps.google\"]",
    "a[href*=\"google.com/maps\"]",
    "a[href*=\"map\"]",
    "iframe[src*=\"maps\"]",
];

const UPCOMING_ITEMS: &str = ".upcoming-exhibitions .exhibition-item, \
     .upcoming-exhibitions .event-item, .future-exhibitions .event-item, \
     .future-exhibitions .exhibition-item";
const CURRENT_ITEMS: &str = ".current-exhibitions .exhibition-item, .exhibition-list-item, \
     .event-item, .show-item, article.exhibition, .exhibition-item";

const EXHIBITION_TITLE: &[&str] = &[".exhibition-title", ".title", "h3", "h2", ".event-title"];
const EXHIBITION_ARTISTS: &[&str] = &[".exhibition-artists", ".artist-name", ".artist", ".artists"];
const EXHIBITION_DATES: &[&str] = &[".exhibition-dates", ".dates", ".date", ".event-date"];
const EXHIBITION_DESCRIPTION: &[&str] = &[
    ".exhibition-description",
    ".description",
    ".text",
    ".event-text",
];
const EXHIBITION_CURATOR: &[&str] = &[".curator", ".curated-by"];
const EXHIBITION_OPENING: &[&str] = &[".opening", ".vernissage"];

type ListingStrategy =
    fn(&ArtmapSource, ElementRef<'_>, &City, ListingKind) -> Result<Vec<VenueCandidate>, ParseError>;

/// Tried in order; the first strategy that finds any venue wins.
const LISTING_STRATEGIES: &[(&str, ListingStrategy)] = &[
    ("venue-table-rows", venue_table_rows),
    ("venue-cards", venue_cards),
    ("any-table-rows", any_table_rows),
];

#[derive(Debug, Clone)]
pub struct ArtmapSource {
    base_url: String,
}

impl Default for ArtmapSource {
    fn default() -> Self {
        Self::new(ARTMAP_BASE_URL)
    }
}

impl ArtmapSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn absolute(&self, href: &str) -> Option<String> {
        normalize_url(&format!("{}/", self.base_url), href)
    }

    fn candidate_from_row(
        &self,
        row: ElementRef<'_>,
        city: &City,
        kind: ListingKind,
    ) -> Result<Option<VenueCandidate>, ParseError> {
        let link_sel = selector("a[href]")?;
        let Some(link) = row.select(&link_sel).next() else {
            return Ok(None);
        };
        let Some(name) = element_text(link) else {
            return Ok(None);
        };
        let detail_url = link.value().attr("href").and_then(|href| self.absolute(href));

        let mut address = first_text(row, ADDRESS)?;
        if address.is_none() {
            let cell_sel = selector("td")?;
            let cells = row.select(&cell_sel).collect::<Vec<_>>();
            address = [1usize, 2]
                .iter()
                .filter_map(|i| cells.get(*i).copied().and_then(element_text))
                .find(|text| *text != name);
        }

        Ok(Some(VenueCandidate {
            name,
            city: city.id.clone(),
            listing_kind: kind,
            detail_url,
            address,
        }))
    }

    fn candidates_matching(
        &self,
        root: ElementRef<'_>,
        css: &str,
        city: &City,
        kind: ListingKind,
    ) -> Result<Vec<VenueCandidate>, ParseError> {
        let sel = selector(css)?;
        let mut out = Vec::new();
        for row in root.select(&sel) {
            if let Some(candidate) = self.candidate_from_row(row, city, kind)? {
                out.push(candidate);
            }
        }
        Ok(out)
    }
}

fn venue_table_rows(
    source: &ArtmapSource,
    root: ElementRef<'_>,
    city: &City,
    kind: ListingKind,
) -> Result<Vec<VenueCandidate>, ParseError> {
    source.candidates_matching(root, ".venuesListTableRow, .venue-row", city, kind)
}

fn venue_cards(
    source: &ArtmapSource,
    root: ElementRef<'_>,
    city: &City,
    kind: ListingKind,
) -> Result<Vec<VenueCandidate>, ParseError> {
    source.candidates_matching(root, ".venue-item, .venue-card, li.venue", city, kind)
}

fn any_table_rows(
    source: &ArtmapSource,
    root: ElementRef<'_>,
    city: &City,
    kind: ListingKind,
) -> Result<Vec<VenueCandidate>, ParseError> {
    source.candidates_matching(root, "table tr", city, kind)
}

fn extract_venue_coordinates(root: ElementRef<'_>) -> Result<Option<Coordinates>, ParseError> {
    let data_sel = selector("[data-lat][data-lng]")?;
    for node in root.select(&data_sel) {
        let lat = node.value().attr("data-lat").and_then(|v| v.trim().parse().ok());
        let lng = node.value().attr("data-lng").and_then(|v| v.trim().parse().ok());
        if let Some(coords) = lat.zip(lng).and_then(|(lat, lng)| Coordinates::new(lat, lng)) {
            return Ok(Some(coords));
        }
    }

    for css in MAP_LINKS {
        let sel = selector(css)?;
        let found = root
            .select(&sel)
            .filter_map(|node| node.value().attr("href").or_else(|| node.value().attr("src")))
            .find_map(extract_coordinates);
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

fn opening_hours_text(root: ElementRef<'_>) -> Result<Option<String>, ParseError> {
    let line_sel = selector("li, p, tr, dd")?;
    for css in HOURS {
        let sel = selector(css)?;
        let Some(container) = root.select(&sel).next() else {
            continue;
        };
        let mut lines = container
            .select(&line_sel)
            .filter_map(element_text)
            .collect::<Vec<_>>();
        if lines.is_empty() {
            lines = container.text().filter_map(clean_text).collect();
        }
        if !lines.is_empty() {
            return Ok(Some(lines.join("\n")));
        }
    }
    Ok(None)
}

fn split_artists(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .flat_map(|text| text.split([',', ';']))
        .filter_map(clean_text)
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

fn strip_curator_prefix(text: String) -> Option<String> {
    let lowered = text.to_lowercase();
    let stripped = ["curated by", "curator:", "curator"]
        .iter()
        .find_map(|prefix| {
            if lowered.starts_with(prefix) {
                text.get(prefix.len()..)
            } else {
                None
            }
        })
        .unwrap_or(&text);
    clean_text(stripped.trim_start_matches(':'))
}

fn exhibition_from_item(
    item: ElementRef<'_>,
    page_url: &str,
    listed_as_upcoming: bool,
) -> Result<Option<ExhibitionCandidate>, ParseError> {
    let Some(title) = first_text(item, EXHIBITION_TITLE)? else {
        return Ok(None);
    };

    let mut artists = Vec::new();
    for css in EXHIBITION_ARTISTS {
        let found = select_all_texts(item, css)?;
        if !found.is_empty() {
            artists = split_artists(found);
            break;
        }
    }

    let (start_date, end_date) = first_text(item, EXHIBITION_DATES)?
        .map(|text| parse_date_range(&text))
        .unwrap_or_default();

    let image_url = match first_attr(item, &["img"], "src")? {
        Some(src) => Some(src),
        None => first_attr(item, &["img"], "data-src")?,
    }
    .and_then(|src| normalize_url(page_url, &src));

    let source_url = first_attr(item, &["a[href]"], "href")?.and_then(|href| normalize_url(page_url, &href));

    Ok(Some(ExhibitionCandidate {
        title,
        artists,
        start_date,
        end_date,
        description: first_text(item, EXHIBITION_DESCRIPTION)?,
        curator: first_text(item, EXHIBITION_CURATOR)?.and_then(strip_curator_prefix),
        image_url,
        opening_info: first_text(item, EXHIBITION_OPENING)?,
        source_url,
        listed_as_upcoming,
    }))
}

impl VenueSource for ArtmapSource {
    fn source_id(&self) -> &'static str {
        "artmap"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn listing_url(&self, city: &City, kind: ListingKind) -> String {
        let slug = if city.slug.is_empty() { &city.id } else { &city.slug };
        format!("{}/{}/venues/{}", self.base_url, slug, kind.path_segment())
    }

    fn parse_venue_listing(
        &self,
        html: &str,
        city: &City,
        kind: ListingKind,
    ) -> Result<Vec<VenueCandidate>, ParseError> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        for (strategy, parse) in LISTING_STRATEGIES {
            let found = parse(self, root, city, kind)?;
            if found.is_empty() {
                continue;
            }
            debug!(strategy, count = found.len(), "listing strategy matched");
            let mut seen = HashSet::new();
            return Ok(found
                .into_iter()
                .filter(|c| seen.insert(c.name.to_lowercase()))
                .collect());
        }
        Ok(Vec::new())
    }

    fn parse_venue_detail(&self, html: &str, page_url: &str) -> Result<VenueDetailPage, ParseError> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let email = first_attr(root, &["a[href^=\"mailto:\"]"], "href")?
            .and_then(|href| clean_text(href.trim_start_matches("mailto:")));
        let website = first_attr(root, WEBSITE, "href")?.and_then(|href| normalize_url(page_url, &href));
        let details = VenueDetails {
            name: first_text(root, NAME)?,
            address: first_text(root, ADDRESS)?,
            phone: first_text(root, PHONE)?,
            email,
            website,
            description: first_text(root, DESCRIPTION)?,
            coordinates: extract_venue_coordinates(root)?,
            opening_hours: opening_hours_text(root)?
                .map(|text| parse_opening_hours(&text))
                .unwrap_or_default(),
        };

        let mut exhibitions = Vec::new();
        let mut seen = HashSet::new();
        for (css, upcoming) in [(UPCOMING_ITEMS, true), (CURRENT_ITEMS, false)] {
            let sel = selector(css)?;
            for item in root.select(&sel) {
                if !seen.insert(item.id()) {
                    continue;
                }
                if let Some(candidate) = exhibition_from_item(item, page_url, upcoming)? {
                    exhibitions.push(candidate);
                }
            }
        }

        Ok(VenueDetailPage {
            details,
            exhibitions,
        })
    }
}
