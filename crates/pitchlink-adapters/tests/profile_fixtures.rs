//! Fixture-driven parser tests: each adapter must map its captured sample
//! markup onto the canonical record shape without loss.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pitchlink_adapters::{EuroSquadAdapter, FootballDbAdapter};
use pitchlink_core::{CountedEntry, NO_PHOTO_MARKER};
use pitchlink_fetch::{FetchConfig, HttpFetcher};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

fn fixture(source_id: &str, file: &str) -> String {
    let path = workspace_root()
        .join("fixtures")
        .join(source_id)
        .join("sample")
        .join(file);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

fn http() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(FetchConfig::default()).expect("http client"))
}

#[test]
fn footballdb_profile_fixture_maps_onto_the_canonical_record() {
    let adapter = FootballDbAdapter::new("https://www.footballdb.example", http());
    let html = fixture("footballdb", "profile.html");
    let record = adapter
        .parse_profile(
            "https://www.footballdb.example/players/Kylian_Mbapp%C3%A9",
            &html,
        )
        .expect("parse profile");

    assert_eq!(record.name, "Kylian Mbappé");
    assert_eq!(record.title, "Kylian_Mbapp%C3%A9");
    assert_eq!(record.full_name, "Kylian Mbappé Lottin");
    assert_eq!(record.age, 27);
    assert_eq!(record.born, "20 December 1998");
    assert_eq!(record.birth_country, "France");
    assert_eq!(record.country, "France");
    assert_eq!(record.preferred_foot, "right");
    assert_eq!(record.height, 178);
    assert_eq!(record.weight, 75);
    assert_eq!(record.current_club, "Real Madrid");
    assert_eq!(record.position, "Centre Forward");
    assert_eq!(record.number, 9);
    assert_eq!(record.caps, "86 (48 goals)");
    assert_eq!(record.value, "180000000");
    assert_eq!(record.currency, "EUR");
    assert_eq!(record.highest_value_in_career, "200000000");
    assert_eq!(record.elo, 2085);
    assert_eq!(record.player_attributes.len(), 3);
    assert_eq!(record.player_attributes[0].name, "Pace");
    assert_eq!(record.player_attributes[0].value, "97");
    assert_eq!(
        record.titles,
        vec![
            CountedEntry { number: "6".into(), name: "Ligue 1".into() },
            CountedEntry { number: "1".into(), name: "La Liga".into() },
            CountedEntry { number: "1".into(), name: "FIFA World Cup".into() },
        ]
    );
    assert_eq!(record.transfers.len(), 2);
    assert_eq!(record.transfers[0].season, "2024/25");
    assert_eq!(record.transfers[0].team, "Real Madrid");
    assert_eq!(record.transfers[0].amount, "free");
    assert!(record.image.ends_with("kylian-mbappe.jpg"));
    assert!(!record.timestamp.is_empty());
    // footballdb never carries the secondary-source-only fields
    assert!(record.other_nationality.is_empty());
    assert!(record.status.is_empty());
    assert!(record.website.is_empty());
    assert!(record.awards.is_empty());
}

#[test]
fn footballdb_search_fixture_yields_absolute_candidate_links() {
    let adapter = FootballDbAdapter::new("https://www.footballdb.example", http());
    let html = fixture("footballdb", "search.html");
    let links = adapter.parse_search(&html).expect("parse search");

    assert_eq!(links.len(), 2);
    assert_eq!(
        links[0].url,
        "https://www.footballdb.example/players/Kylian_Mbapp%C3%A9"
    );
    assert!(links.iter().all(|l| l.source_id == "footballdb"));
}

#[test]
fn eurosquad_profile_fixture_maps_onto_the_canonical_record() {
    let adapter = EuroSquadAdapter::new("https://eurosquad.example", http());
    let html = fixture("eurosquad", "profile.html");
    let record = adapter
        .parse_profile("https://eurosquad.example/player/4521/kylian-mbappe", &html)
        .expect("parse profile");

    assert_eq!(record.name, "Kylian Mbappe");
    assert_eq!(record.title, "kylian-mbappe");
    assert_eq!(record.full_name, "Kylian Mbappé Lottin");
    assert_eq!(record.age, 27);
    assert_eq!(record.born, "1998-12-20");
    assert_eq!(record.country, "France");
    assert_eq!(record.other_nationality, "Cameroon");
    assert_eq!(record.preferred_foot, "right");
    assert_eq!(record.height, 178);
    assert_eq!(record.weight, 75);
    assert_eq!(record.number, 9);
    assert_eq!(record.position, "Forward");
    assert_eq!(record.current_club, "Real Madrid CF");
    assert_eq!(record.status, "Active");
    assert_eq!(record.website, "https://kylianmbappe.example");
    assert_eq!(
        record.awards,
        vec![
            CountedEntry { number: "6".into(), name: "Ligue 1".into() },
            CountedEntry { number: "1".into(), name: "FIFA World Cup".into() },
            CountedEntry { number: "".into(), name: "Golden Boy".into() },
        ]
    );
    // the sample portrait is the source's placeholder image
    assert!(record.image.contains(NO_PHOTO_MARKER));
    // eurosquad never carries the primary-source-only fields
    assert_eq!(record.elo, 0);
    assert!(record.transfers.is_empty());
    assert!(record.player_attributes.is_empty());
    assert!(record.caps.is_empty());
}

#[test]
fn eurosquad_search_fixture_yields_candidate_links() {
    let adapter = EuroSquadAdapter::new("https://eurosquad.example", http());
    let html = fixture("eurosquad", "search.html");
    let links = adapter.parse_search(&html).expect("parse search");

    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "https://eurosquad.example/player/4521/kylian-mbappe");
    assert_eq!(links[0].source_id, "eurosquad");
}
