//! Text normalization shared by page parsers: URLs, date ranges, map coordinates, hours.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use gallerist_core::Coordinates;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RANGE_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*until\s+|\s*(?:–|—|~|\s-\s|\s+to\s+|\s+bis\s+|\s+until\s+|\s+through\s+)\s*")
        .unwrap()
});

static WEEKDAY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").unwrap()
});

static ASIAN_DOTTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[./-](\d{1,2})[./-](\d{1,2})\.?$").unwrap());
static EUROPEAN_DOTTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})?$").unwrap());
static SHORT_DOTTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})$").unwrap());
static US_SLASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap());
static KOREAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d{4})\s*년\s*)?(\d{1,2})\s*월\s*(\d{1,2})\s*일?$").unwrap()
});
static MONTH_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\p{L}+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?(?:\s+(\d{4}))?$").unwrap()
});
static DAY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})(?:st|nd|rd|th)?\.?\s+(\p{L}+)\.?,?(?:\s+(\d{4}))?$").unwrap()
});
static DAY_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})\.?$").unwrap());

static MAP_COORDINATES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[@=/](-?\d{1,3}\.\d+)(?:,|%2C)\s*(-?\d{1,3}\.\d+)").unwrap()
});

static HOURS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^((?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?(?:\s*(?:-|–|—|to)\s*(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?)?)\s*:?\s+(.+)$",
    )
    .unwrap()
});

const MONTHS: &[(&str, u32)] = &[
    ("jan", 1),
    ("january", 1),
    ("januar", 1),
    ("jänner", 1),
    ("janvier", 1),
    ("feb", 2),
    ("february", 2),
    ("februar", 2),
    ("février", 2),
    ("fevrier", 2),
    ("mar", 3),
    ("march", 3),
    ("märz", 3),
    ("mars", 3),
    ("apr", 4),
    ("april", 4),
    ("avril", 4),
    ("may", 5),
    ("mai", 5),
    ("jun", 6),
    ("june", 6),
    ("juni", 6),
    ("juin", 6),
    ("jul", 7),
    ("july", 7),
    ("juli", 7),
    ("juillet", 7),
    ("aug", 8),
    ("august", 8),
    ("août", 8),
    ("aout", 8),
    ("sep", 9),
    ("sept", 9),
    ("september", 9),
    ("septembre", 9),
    ("oct", 10),
    ("october", 10),
    ("oktober", 10),
    ("octobre", 10),
    ("nov", 11),
    ("november", 11),
    ("novembre", 11),
    ("dec", 12),
    ("december", 12),
    ("dezember", 12),
    ("décembre", 12),
    ("decembre", 12),
];

/// Collapse runs of whitespace and trim; empty results become `None`.
pub fn clean_text(value: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(value.trim(), " ").to_string();
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Resolve `href` against `base`: handles `/path`, `//host/path`, relative and absolute links.
pub fn normalize_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

fn month_from_name(name: &str) -> Option<u32> {
    let lowered = name.trim_end_matches('.').to_lowercase();
    MONTHS
        .iter()
        .find(|(candidate, _)| *candidate == lowered)
        .map(|(_, month)| *month)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartialDate {
    year: Option<i32>,
    month: Option<u32>,
    day: u32,
}

impl PartialDate {
    fn full(date: NaiveDate) -> Self {
        Self {
            year: Some(date.year()),
            month: Some(date.month()),
            day: date.day(),
        }
    }

    fn to_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year?, self.month?, self.day)
    }
}

fn capture_num<T: std::str::FromStr>(caps: &regex::Captures<'_>, index: usize) -> Option<T> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

fn parse_partial_date(raw: &str) -> Option<PartialDate> {
    let text = raw.trim().trim_end_matches(',').trim();
    let text = WEEKDAY_PREFIX.replace(text, "");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(PartialDate::full(date));
        }
    }
    if let Some(caps) = US_SLASHED.captures(text) {
        return Some(PartialDate {
            month: capture_num(&caps, 1),
            day: capture_num(&caps, 2)?,
            year: capture_num(&caps, 3),
        });
    }
    if let Some(caps) = ASIAN_DOTTED.captures(text) {
        return Some(PartialDate {
            year: capture_num(&caps, 1),
            month: capture_num(&caps, 2),
            day: capture_num(&caps, 3)?,
        });
    }
    if let Some(caps) = EUROPEAN_DOTTED.captures(text) {
        return Some(PartialDate {
            day: capture_num(&caps, 1)?,
            month: capture_num(&caps, 2),
            year: capture_num(&caps, 3),
        });
    }
    if let Some(caps) = SHORT_DOTTED.captures(text) {
        return Some(PartialDate {
            year: None,
            month: capture_num(&caps, 2),
            day: capture_num(&caps, 1)?,
        });
    }
    if let Some(caps) = KOREAN.captures(text) {
        return Some(PartialDate {
            year: capture_num(&caps, 1),
            month: capture_num(&caps, 2),
            day: capture_num(&caps, 3)?,
        });
    }
    if let Some(caps) = MONTH_FIRST.captures(text) {
        return Some(PartialDate {
            month: Some(month_from_name(caps.get(1)?.as_str())?),
            day: capture_num(&caps, 2)?,
            year: capture_num(&caps, 3),
        });
    }
    if let Some(caps) = DAY_FIRST.captures(text) {
        return Some(PartialDate {
            day: capture_num(&caps, 1)?,
            month: Some(month_from_name(caps.get(2)?.as_str())?),
            year: capture_num(&caps, 3),
        });
    }
    if let Some(caps) = DAY_ONLY.captures(text) {
        return Some(PartialDate {
            year: None,
            month: None,
            day: capture_num(&caps, 1)?,
        });
    }
    None
}

/// `MM.DD` continuing a year-first start, as in `2025.01.15 ~ 02.20`.
fn parse_month_day(raw: &str) -> Option<PartialDate> {
    let caps = SHORT_DOTTED.captures(raw.trim())?;
    Some(PartialDate {
        year: None,
        month: capture_num(&caps, 1),
        day: capture_num(&caps, 2)?,
    })
}

/// Parse free-form exhibition date text into `(start, end)`.
///
/// Missing years and months are borrowed across the range, with a year rollover
/// when the borrowed start would land after the end. An end before the start is dropped.
pub fn parse_date_range(text: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let Some(cleaned) = clean_text(text) else {
        return (None, None);
    };
    let mut sides = RANGE_SEPARATOR.splitn(&cleaned, 2);
    let left = sides.next().unwrap_or_default();
    let right = sides.next();

    let Some(right) = right else {
        let single = parse_partial_date(left).and_then(PartialDate::to_date);
        return (single, None);
    };

    let mut start = parse_partial_date(left);
    let mut end = if ASIAN_DOTTED.is_match(left.trim()) {
        parse_month_day(right).or_else(|| parse_partial_date(right))
    } else {
        parse_partial_date(right)
    };
    let mut start_year_borrowed = false;
    let mut end_year_borrowed = false;

    if let (Some(s), Some(e)) = (start.as_mut(), end.as_mut()) {
        if s.month.is_none() {
            s.month = e.month;
        }
        if e.month.is_none() {
            e.month = s.month;
        }
        match (s.year, e.year) {
            (None, Some(year)) => {
                s.year = Some(year);
                start_year_borrowed = true;
            }
            (Some(year), None) => {
                e.year = Some(year);
                end_year_borrowed = true;
            }
            _ => {}
        }
    }

    let mut start_date = start.and_then(PartialDate::to_date);
    let mut end_date = end.and_then(PartialDate::to_date);

    if let (Some(s), Some(e)) = (start_date, end_date) {
        if s > e {
            if start_year_borrowed {
                start_date = s.with_year(s.year() - 1);
            } else if end_year_borrowed {
                end_date = e.with_year(e.year() + 1);
            }
        }
    }
    if let (Some(s), Some(e)) = (start_date, end_date) {
        if e < s {
            end_date = None;
        }
    }
    (start_date, end_date)
}

/// Pull a `lat,lng` pair out of a map link (`@lat,lng`, `q=lat,lng`, `ll=lat,lng`, `/lat,lng`).
pub fn extract_coordinates(link: &str) -> Option<Coordinates> {
    MAP_COORDINATES.captures_iter(link).find_map(|caps| {
        let lat = caps.get(1)?.as_str().parse().ok()?;
        let lng = caps.get(2)?.as_str().parse().ok()?;
        Coordinates::new(lat, lng)
    })
}

/// Split opening-hours text into day-range keys; lines without a day prefix go under `general`.
pub fn parse_opening_hours(text: &str) -> BTreeMap<String, String> {
    let mut hours = BTreeMap::new();
    let mut general = Vec::new();
    for segment in text.split(['\n', ';', '|']) {
        let Some(segment) = clean_text(segment) else {
            continue;
        };
        match HOURS_LINE.captures(&segment) {
            Some(caps) => {
                let days = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let value = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                hours.insert(days.trim_end_matches(':').to_string(), value.trim().to_string());
            }
            None => general.push(segment),
        }
    }
    if !general.is_empty() {
        hours.insert("general".to_string(), general.join("; "));
    }
    hours
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn parses_iso_and_numeric_ranges() {
        assert_eq!(
            parse_date_range("2025-01-15 - 2025-02-20"),
            (day(2025, 1, 15), day(2025, 2, 20))
        );
        assert_eq!(
            parse_date_range("2025.01.15 ~ 2025.02.20"),
            (day(2025, 1, 15), day(2025, 2, 20))
        );
        assert_eq!(
            parse_date_range("15.01. – 20.02.2025"),
            (day(2025, 1, 15), day(2025, 2, 20))
        );
        assert_eq!(
            parse_date_range("01/15/2025 to 02/20/2025"),
            (day(2025, 1, 15), day(2025, 2, 20))
        );
    }

    #[test]
    fn short_dotted_end_follows_the_start_order() {
        assert_eq!(
            parse_date_range("2025.01.15 ~ 02.20"),
            (day(2025, 1, 15), day(2025, 2, 20))
        );
        assert_eq!(
            parse_date_range("2025.12.20 ~ 01.10"),
            (day(2025, 12, 20), day(2026, 1, 10))
        );
        assert_eq!(
            parse_date_range("15.03 – 20.04.2025"),
            (day(2025, 3, 15), day(2025, 4, 20))
        );
    }

    #[test]
    fn parses_month_names_in_either_order() {
        assert_eq!(
            parse_date_range("Jan 15 – Feb 20, 2025"),
            (day(2025, 1, 15), day(2025, 2, 20))
        );
        assert_eq!(
            parse_date_range("15 January – 20 February 2025"),
            (day(2025, 1, 15), day(2025, 2, 20))
        );
        assert_eq!(
            parse_date_range("March 3rd, 2025 - April 12th, 2025"),
            (day(2025, 3, 3), day(2025, 4, 12))
        );
        assert_eq!(
            parse_date_range("15. März – 20. April 2025"),
            (day(2025, 3, 15), day(2025, 4, 20))
        );
    }

    #[test]
    fn borrows_month_for_day_only_start() {
        assert_eq!(
            parse_date_range("15 – 20 March 2025"),
            (day(2025, 3, 15), day(2025, 3, 20))
        );
    }

    #[test]
    fn rolls_year_back_for_ranges_spanning_new_year() {
        assert_eq!(
            parse_date_range("Dec 15 – Jan 20, 2026"),
            (day(2025, 12, 15), day(2026, 1, 20))
        );
    }

    #[test]
    fn parses_korean_dates() {
        assert_eq!(
            parse_date_range("2025년 1월 15일 ~ 2월 20일"),
            (day(2025, 1, 15), day(2025, 2, 20))
        );
    }

    #[test]
    fn single_and_open_ended_dates() {
        assert_eq!(parse_date_range("Sat, 15 March 2025"), (day(2025, 3, 15), None));
        assert_eq!(parse_date_range("Until 20 March 2025"), (None, day(2025, 3, 20)));
        assert_eq!(parse_date_range("Ongoing"), (None, None));
        assert_eq!(parse_date_range("   "), (None, None));
    }

    #[test]
    fn end_before_start_is_dropped() {
        assert_eq!(
            parse_date_range("2025-05-01 - 2025-04-01"),
            (day(2025, 5, 1), None)
        );
    }

    #[test]
    fn normalizes_relative_and_protocol_relative_urls() {
        let base = "https://artmap.com/london/venues/institutions";
        assert_eq!(
            normalize_url(base, "/tatemodern").as_deref(),
            Some("https://artmap.com/tatemodern")
        );
        assert_eq!(
            normalize_url(base, "//img.artmap.com/a.jpg").as_deref(),
            Some("https://img.artmap.com/a.jpg")
        );
        assert_eq!(
            normalize_url(base, "https://www.tate.org.uk/").as_deref(),
            Some("https://www.tate.org.uk/")
        );
        assert_eq!(
            normalize_url("https://artmap.com/tatemodern/", "exhibition/1").as_deref(),
            Some("https://artmap.com/tatemodern/exhibition/1")
        );
        assert_eq!(normalize_url(base, "#top"), None);
        assert_eq!(normalize_url(base, "  "), None);
    }

    #[test]
    fn extracts_coordinates_from_map_links() {
        let c = extract_coordinates("https://www.google.com/maps/place/Tate/@51.5076,-0.0994,17z").unwrap();
        assert_eq!((c.lat, c.lng), (51.5076, -0.0994));
        let c = extract_coordinates("https://maps.google.com/?q=37.5796,126.9770").unwrap();
        assert_eq!((c.lat, c.lng), (37.5796, 126.977));
        let c = extract_coordinates("https://maps.google.com/maps?ll=48.8606%2C2.3376").unwrap();
        assert_eq!((c.lat, c.lng), (48.8606, 2.3376));
        assert!(extract_coordinates("https://maps.google.com/?q=123.5,10.0").is_none());
        assert!(extract_coordinates("https://maps.google.com/?q=Tate+Modern").is_none());
    }

    #[test]
    fn splits_opening_hours_by_day_ranges() {
        let hours = parse_opening_hours("Tue–Sun 10:00–18:00\nMon closed\nLast entry 17:15");
        assert_eq!(hours.get("Tue–Sun").map(String::as_str), Some("10:00–18:00"));
        assert_eq!(hours.get("Mon").map(String::as_str), Some("closed"));
        assert_eq!(hours.get("general").map(String::as_str), Some("Last entry 17:15"));
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Tate \n  Modern ").as_deref(), Some("Tate Modern"));
        assert_eq!(clean_text(" \t "), None);
    }
}
