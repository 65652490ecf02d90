use std::path::PathBuf;

use chrono::NaiveDate;
use gallerist_adapters::{ArtmapSource, VenueSource};
use gallerist_core::{City, Coordinates, ListingKind};

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(workspace_root().join("fixtures/artmap").join(name))
        .expect("fixture should be readable")
}

fn london() -> City {
    City::new("london", "London", "london", "GB")
}

fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

#[test]
fn listing_url_uses_city_slug_and_kind() {
    let source = ArtmapSource::new("https://artmap.com/");
    let mut city = City::new("newyork", "New York", "new-york", "US");
    assert_eq!(
        source.listing_url(&city, ListingKind::Galleries),
        "https://artmap.com/new-york/venues/galleries"
    );
    city.slug.clear();
    assert_eq!(
        source.listing_url(&city, ListingKind::FurtherSpaces),
        "https://artmap.com/newyork/venues/furtherspaces"
    );
}

#[test]
fn parses_venue_table_rows() {
    let source = ArtmapSource::default();
    let venues = source
        .parse_venue_listing(&fixture("london_institutions.html"), &london(), ListingKind::Institutions)
        .unwrap();

    let names = venues.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Tate Modern", "Serpentine Galleries", "Whitechapel Gallery"]);

    let tate = &venues[0];
    assert_eq!(tate.city, "london");
    assert_eq!(tate.listing_kind, ListingKind::Institutions);
    assert_eq!(tate.detail_url.as_deref(), Some("https://artmap.com/tatemodern"));
    assert_eq!(tate.address.as_deref(), Some("Bankside, London SE1 9TG"));

    let whitechapel = &venues[2];
    assert_eq!(
        whitechapel.address.as_deref(),
        Some("77-82 Whitechapel High Street, London E1 7QX")
    );
}

#[test]
fn falls_back_to_venue_cards() {
    let source = ArtmapSource::default();
    let venues = source
        .parse_venue_listing(&fixture("london_galleries_cards.html"), &london(), ListingKind::Galleries)
        .unwrap();

    assert_eq!(venues.len(), 2);
    assert_eq!(venues[0].name, "Lisson Gallery");
    assert_eq!(venues[0].address.as_deref(), Some("27 Bell Street, London NW1 5BU"));
    assert_eq!(venues[1].name, "White Cube Bermondsey");
    assert_eq!(venues[1].detail_url.as_deref(), Some("https://artmap.com/whitecube"));
    assert_eq!(venues[1].address.as_deref(), Some("144-152 Bermondsey Street"));
}

#[test]
fn falls_back_to_any_table_and_tolerates_empty_pages() {
    let source = ArtmapSource::new("https://artmap.test");
    let html = r#"<table><tr><th>Name</th></tr><tr><td><a href="/gx">Gallery X</a></td></tr></table>"#;
    let venues = source
        .parse_venue_listing(html, &london(), ListingKind::Galleries)
        .unwrap();
    assert_eq!(venues.len(), 1);
    assert_eq!(venues[0].detail_url.as_deref(), Some("https://artmap.test/gx"));

    let none = source
        .parse_venue_listing("<html><body><p>Nothing here</p></body></html>", &london(), ListingKind::Galleries)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn parses_full_venue_page() {
    let source = ArtmapSource::default();
    let page = source
        .parse_venue_detail(&fixture("tatemodern.html"), "https://artmap.com/tatemodern")
        .unwrap();

    let details = &page.details;
    assert_eq!(details.name.as_deref(), Some("Tate Modern"));
    assert_eq!(details.address.as_deref(), Some("Bankside, London SE1 9TG"));
    assert_eq!(details.phone.as_deref(), Some("+44 20 7887 8888"));
    assert_eq!(details.email.as_deref(), Some("visiting.modern@tate.org.uk"));
    assert_eq!(
        details.website.as_deref(),
        Some("https://www.tate.org.uk/visit/tate-modern")
    );
    assert_eq!(details.coordinates, Coordinates::new(51.5076, -0.0994));
    assert_eq!(details.opening_hours.get("Mon–Sun").map(String::as_str), Some("10:00–18:00"));
    assert_eq!(
        details.opening_hours.get("general").map(String::as_str),
        Some("Closed 24–26 December")
    );

    let titles = page.exhibitions.iter().map(|e| e.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["Leigh Bowery!", "Electric Dreams", "Anthony McCall"]);

    let bowery = &page.exhibitions[0];
    assert!(bowery.listed_as_upcoming);
    assert_eq!(bowery.start_date, day(2025, 2, 27));
    assert_eq!(bowery.end_date, day(2025, 8, 31));
    assert_eq!(bowery.opening_info.as_deref(), Some("Opening: 26 February, 18:00"));
    assert!(bowery.artists.is_empty());

    let dreams = &page.exhibitions[1];
    assert!(!dreams.listed_as_upcoming);
    assert_eq!(dreams.artists, vec!["Liliane Lijn", "Otto Piene"]);
    assert_eq!(dreams.start_date, day(2024, 11, 28));
    assert_eq!(dreams.end_date, day(2025, 6, 1));
    assert_eq!(dreams.curator.as_deref(), Some("Val Ravaglia"));
    assert_eq!(
        dreams.image_url.as_deref(),
        Some("https://artmap.com/images/electric-dreams.jpg")
    );
    assert_eq!(
        dreams.source_url.as_deref(),
        Some("https://artmap.com/tatemodern/exhibition/electric-dreams")
    );

    let mccall = &page.exhibitions[2];
    assert_eq!(mccall.image_url.as_deref(), Some("https://cdn.artmap.com/mccall.jpg"));
    assert_eq!(mccall.source_url, None);
}

#[test]
fn sparse_page_yields_partial_details() {
    let source = ArtmapSource::default();
    let page = source
        .parse_venue_detail(&fixture("project_space_sparse.html"), "https://artmap.com/projektraum7")
        .unwrap();

    assert_eq!(page.details.name.as_deref(), Some("Projektraum 7"));
    assert_eq!(page.details.address, None);
    assert_eq!(page.details.coordinates, None, "latitude 91 is out of range");
    assert!(page.details.opening_hours.is_empty());

    assert_eq!(page.exhibitions.len(), 2);
    let event = &page.exhibitions[0];
    assert_eq!(event.title, "Offenes Atelier");
    assert_eq!(event.start_date, day(2025, 3, 12));
    assert_eq!(event.end_date, None);
    assert!(!event.listed_as_upcoming);

    let dotted = &page.exhibitions[1];
    assert_eq!(dotted.title, "Jahresgaben");
    assert_eq!(dotted.start_date, day(2025, 4, 5));
    assert_eq!(dotted.end_date, day(2025, 5, 18));
}
