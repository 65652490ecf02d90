//! Venue source contracts and HTML extraction helpers.

use gallerist_core::{City, ExhibitionCandidate, ListingKind, VenueCandidate, VenueDetails};
use scraper::{ElementRef, Selector};
use thiserror::Error;

pub mod artmap;
pub mod normalize;

pub use artmap::ArtmapSource;

pub const CRATE_NAME: &str = "gallerist-adapters";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error("{0}")]
    Message(String),
}

/// Everything read from one venue page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueDetailPage {
    pub details: VenueDetails,
    pub exhibitions: Vec<ExhibitionCandidate>,
}

/// A website that lists venues per city and describes each venue on its own page.
///
/// Parsing never fails on missing markup: absent fields come back as `None` and
/// unrecognised pages yield empty lists. Errors are reserved for broken selectors.
pub trait VenueSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    fn base_url(&self) -> &str;

    fn listing_url(&self, city: &City, kind: ListingKind) -> String;

    fn parse_venue_listing(
        &self,
        html: &str,
        city: &City,
        kind: ListingKind,
    ) -> Result<Vec<VenueCandidate>, ParseError>;

    fn parse_venue_detail(&self, html: &str, page_url: &str) -> Result<VenueDetailPage, ParseError>;
}

pub fn source_for_id(source_id: &str, base_url: Option<&str>) -> Option<Box<dyn VenueSource>> {
    match source_id {
        "artmap" => Some(Box::new(match base_url {
            Some(base) => ArtmapSource::new(base),
            None => ArtmapSource::default(),
        })),
        _ => None,
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

pub(crate) fn element_text(element: ElementRef<'_>) -> Option<String> {
    normalize::clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn select_first_text(scope: ElementRef<'_>, css: &str) -> Result<Option<String>, ParseError> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).find_map(element_text))
}

pub(crate) fn select_all_texts(scope: ElementRef<'_>, css: &str) -> Result<Vec<String>, ParseError> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).filter_map(element_text).collect())
}

pub(crate) fn select_first_attr(
    scope: ElementRef<'_>,
    css: &str,
    attr: &str,
) -> Result<Option<String>, ParseError> {
    let sel = selector(css)?;
    Ok(scope
        .select(&sel)
        .filter_map(|n| n.value().attr(attr))
        .find_map(normalize::clean_text))
}

/// First selector in `candidates` that yields text wins.
pub(crate) fn first_text(scope: ElementRef<'_>, candidates: &[&str]) -> Result<Option<String>, ParseError> {
    for css in candidates {
        if let Some(text) = select_first_text(scope, css)? {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

pub(crate) fn first_attr(
    scope: ElementRef<'_>,
    candidates: &[&str],
    attr: &str,
) -> Result<Option<String>, ParseError> {
    for css in candidates {
        if let Some(value) = select_first_attr(scope, css, attr)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
