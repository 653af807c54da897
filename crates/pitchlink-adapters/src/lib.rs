//! Source adapter contracts + the two concrete profile-source adapters.
//!
//! An adapter owns everything source-specific: how a player-name query turns
//! into a search URL, what the result markup looks like, and how a profile
//! document maps onto the canonical [`PlayerRecord`] shape. The resolution
//! pipeline only ever sees `search` and `fetch_profile`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pitchlink_core::{
    is_unknown_str, normalize_name, AttributeEntry, CandidateLink, CountedEntry, PlayerRecord,
    TransferEntry,
};
use pitchlink_fetch::{ArtifactStore, FetchError, HttpFetcher};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "pitchlink-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("profile url is empty")]
    EmptyUrl,
    #[error("malformed url: {0}")]
    MalformedUrl(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("parse failure: {0}")]
    Parse(String),
    #[error("document failed validation: {0}")]
    Validation(String),
    #[error("source call timed out")]
    Timeout,
}

/// One external provider of player-profile documents.
///
/// An empty `search` result is a valid answer, not an error. `fetch_profile`
/// reports schema/validation problems as [`AdapterError`]; the orchestrator
/// downgrades every adapter failure to "no record from this source".
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn search(&self, name: &str) -> Result<Vec<CandidateLink>, AdapterError>;

    async fn fetch_profile(&self, url: &str) -> Result<PlayerRecord, AdapterError>;
}

fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Parse(e.to_string()))
}

fn collapse_text(value: String) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_first_text(document: &Html, selector: &str) -> Result<String, AdapterError> {
    let sel = parse_selector(selector)?;
    Ok(document
        .select(&sel)
        .next()
        .map(|n| collapse_text(n.text().collect::<String>()))
        .unwrap_or_default())
}

fn select_first_attr(document: &Html, selector: &str, attr: &str) -> Result<String, AdapterError> {
    let sel = parse_selector(selector)?;
    Ok(document
        .select(&sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .map(|s| s.trim().to_string())
        .unwrap_or_default())
}

fn child_text(element: ElementRef<'_>, selector: &Selector) -> String {
    element
        .select(selector)
        .next()
        .map(|n| collapse_text(n.text().collect::<String>()))
        .unwrap_or_default()
}

/// First run of ASCII digits in the text, as an integer; `0` when absent or
/// oversized. Good enough for "178 cm" / "75 kg" / "86 (48 goals)".
fn extract_first_number(text: &str) -> u32 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn join_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

/// Raw last path segment of a profile URL; kept undecoded so the record's
/// `title` carries exactly what the source's link said.
fn last_path_segment(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string()
}

fn foot_from_text(text: &str) -> String {
    match text.trim().to_lowercase().as_str() {
        "left" => "left".to_string(),
        "right" => "right".to_string(),
        _ => String::new(),
    }
}

/// Split an honour line like "5 Ligue 1" into its count and name; lines
/// without a leading count keep the whole text as the name.
fn counted_from_line(text: &str) -> CountedEntry {
    let trimmed = text.trim();
    let split_at = trimmed
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .map(|(i, c)| i + c.len_utf8())
        .last();
    match split_at {
        Some(end) => CountedEntry {
            number: trimmed[..end].to_string(),
            name: trimmed[end..].trim().to_string(),
        },
        None => CountedEntry {
            number: String::new(),
            name: trimmed.to_string(),
        },
    }
}

fn validate_record(record: &PlayerRecord) -> Result<(), AdapterError> {
    if record.is_anonymous() {
        return Err(AdapterError::Validation(
            "document carries neither a player name nor a title".to_string(),
        ));
    }
    Ok(())
}

fn guard_url(url: &str) -> Result<(), AdapterError> {
    if url.trim().is_empty() {
        return Err(AdapterError::EmptyUrl);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AdapterError::MalformedUrl(url.to_string()));
    }
    Ok(())
}

async fn snapshot_raw(store: &Option<Arc<ArtifactStore>>, source_id: &str, body: &[u8]) {
    if let Some(store) = store {
        if let Err(err) = store.store_bytes(Utc::now(), source_id, "html", body).await {
            warn!(source_id, %err, "failed to snapshot raw profile document");
        }
    }
}

/// Primary source: fact-list profile pages with attributes, honours, ELO and
/// transfer history.
pub struct FootballDbAdapter {
    base_url: String,
    http: Arc<HttpFetcher>,
    snapshots: Option<Arc<ArtifactStore>>,
}

impl FootballDbAdapter {
    pub const SOURCE_ID: &'static str = "footballdb";

    pub fn new(base_url: impl Into<String>, http: Arc<HttpFetcher>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, store: Arc<ArtifactStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    fn search_url(&self, name: &str) -> String {
        format!(
            "{}/search?q={}",
            self.base_url.trim_end_matches('/'),
            normalize_name(name)
        )
    }

    pub fn parse_search(&self, html: &str) -> Result<Vec<CandidateLink>, AdapterError> {
        let document = Html::parse_document(html);
        let sel = parse_selector("ul.search-results a.player-link")?;
        Ok(document
            .select(&sel)
            .filter_map(|anchor| anchor.value().attr("href"))
            .map(|href| CandidateLink {
                source_id: Self::SOURCE_ID.to_string(),
                url: join_url(&self.base_url, href),
            })
            .collect())
    }

    pub fn parse_profile(&self, url: &str, html: &str) -> Result<PlayerRecord, AdapterError> {
        let document = Html::parse_document(html);
        let mut record = PlayerRecord {
            name: select_first_text(&document, "h1.player-name")?,
            title: last_path_segment(url),
            elo: extract_first_number(&select_first_text(&document, "span.elo-badge")?),
            image: select_first_attr(&document, "img.player-photo", "src")?,
            timestamp: Utc::now().to_rfc3339(),
            ..PlayerRecord::default()
        };

        let fact_sel = parse_selector("ul.player-facts li")?;
        let label_sel = parse_selector("span.label")?;
        let value_sel = parse_selector("span.value")?;
        for fact in document.select(&fact_sel) {
            let label = child_text(fact, &label_sel).to_lowercase();
            let value = child_text(fact, &value_sel);
            match label.as_str() {
                "full name" => record.full_name = value,
                "age" => record.age = extract_first_number(&value),
                "born" => record.born = value,
                "birth country" => record.birth_country = value,
                "country" => record.country = value,
                "preferred foot" => record.preferred_foot = foot_from_text(&value),
                "height" => record.height = extract_first_number(&value),
                "weight" => record.weight = extract_first_number(&value),
                "club" => record.current_club = value,
                "position" => record.position = value,
                "number" => record.number = extract_first_number(&value),
                "caps" => record.caps = value,
                "market value" => record.value = value,
                "currency" => record.currency = value,
                "highest value" => record.highest_value_in_career = value,
                other => debug!(label = other, "unrecognized profile fact"),
            }
        }

        let attribute_sel = parse_selector("ul.player-attributes li")?;
        let attr_name_sel = parse_selector("span.name")?;
        let attr_rating_sel = parse_selector("span.rating")?;
        record.player_attributes = document
            .select(&attribute_sel)
            .map(|item| AttributeEntry {
                name: child_text(item, &attr_name_sel),
                value: child_text(item, &attr_rating_sel),
            })
            .filter(|entry| !is_unknown_str(&entry.name))
            .collect();

        let title_sel = parse_selector("ul.player-titles li")?;
        let count_sel = parse_selector("span.count")?;
        let honour_sel = parse_selector("span.title")?;
        record.titles = document
            .select(&title_sel)
            .map(|item| CountedEntry {
                number: child_text(item, &count_sel),
                name: child_text(item, &honour_sel),
            })
            .filter(|entry| !is_unknown_str(&entry.name))
            .collect();

        let transfer_sel = parse_selector("table.transfer-history tr")?;
        let season_sel = parse_selector("td.season")?;
        let team_sel = parse_selector("td.team")?;
        let amount_sel = parse_selector("td.amount")?;
        record.transfers = document
            .select(&transfer_sel)
            .map(|row| TransferEntry {
                season: child_text(row, &season_sel),
                team: child_text(row, &team_sel),
                amount: child_text(row, &amount_sel),
            })
            .filter(|entry| !is_unknown_str(&entry.season))
            .collect();

        Ok(record)
    }
}

#[async_trait]
impl SourceAdapter for FootballDbAdapter {
    fn source_id(&self) -> &'static str {
        Self::SOURCE_ID
    }

    async fn search(&self, name: &str) -> Result<Vec<CandidateLink>, AdapterError> {
        if name.trim().is_empty() {
            return Ok(Vec::new());
        }
        let url = self.search_url(name);
        let document = self.http.fetch_document(Self::SOURCE_ID, &url).await?;
        self.parse_search(&document.text())
    }

    async fn fetch_profile(&self, url: &str) -> Result<PlayerRecord, AdapterError> {
        guard_url(url)?;
        let document = self.http.fetch_document(Self::SOURCE_ID, url).await?;
        snapshot_raw(&self.snapshots, Self::SOURCE_ID, &document.body).await;
        let record = self.parse_profile(url, &document.text())?;
        validate_record(&record)?;
        Ok(record)
    }
}

/// Secondary source: bio-table profile pages; the only source that carries
/// second nationality, squad status, awards and official-site links.
pub struct EuroSquadAdapter {
    base_url: String,
    http: Arc<HttpFetcher>,
    snapshots: Option<Arc<ArtifactStore>>,
}

impl EuroSquadAdapter {
    pub const SOURCE_ID: &'static str = "eurosquad";

    pub fn new(base_url: impl Into<String>, http: Arc<HttpFetcher>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, store: Arc<ArtifactStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    fn search_url(&self, name: &str) -> String {
        format!(
            "{}/search?query={}",
            self.base_url.trim_end_matches('/'),
            normalize_name(name)
        )
    }

    pub fn parse_search(&self, html: &str) -> Result<Vec<CandidateLink>, AdapterError> {
        let document = Html::parse_document(html);
        let sel = parse_selector("div.results a.result")?;
        Ok(document
            .select(&sel)
            .filter_map(|anchor| anchor.value().attr("href"))
            .map(|href| CandidateLink {
                source_id: Self::SOURCE_ID.to_string(),
                url: join_url(&self.base_url, href),
            })
            .collect())
    }

    pub fn parse_profile(&self, url: &str, html: &str) -> Result<PlayerRecord, AdapterError> {
        let document = Html::parse_document(html);
        let mut record = PlayerRecord {
            name: select_first_text(&document, "div.profile-header h1")?,
            title: last_path_segment(url),
            website: select_first_attr(&document, "a.official-site", "href")?,
            image: select_first_attr(&document, "img.portrait", "src")?,
            timestamp: Utc::now().to_rfc3339(),
            ..PlayerRecord::default()
        };

        let row_sel = parse_selector("table.bio tr")?;
        let header_sel = parse_selector("th")?;
        let cell_sel = parse_selector("td")?;
        for row in document.select(&row_sel) {
            let label = child_text(row, &header_sel).to_lowercase();
            let value = child_text(row, &cell_sel);
            match label.as_str() {
                "full name" => record.full_name = value,
                "age" => record.age = extract_first_number(&value),
                "date of birth" => record.born = value,
                "nationality" => record.country = value,
                "second nationality" => record.other_nationality = value,
                "foot" => record.preferred_foot = foot_from_text(&value),
                "height" => record.height = extract_first_number(&value),
                "weight" => record.weight = extract_first_number(&value),
                "shirt number" => record.number = extract_first_number(&value),
                "position" => record.position = value,
                "team" => record.current_club = value,
                "status" => record.status = value,
                other => debug!(label = other, "unrecognized bio row"),
            }
        }

        let honour_sel = parse_selector("ul.honours li")?;
        record.awards = document
            .select(&honour_sel)
            .map(|item| counted_from_line(&collapse_text(item.text().collect::<String>())))
            .filter(|entry| !is_unknown_str(&entry.name))
            .collect();

        Ok(record)
    }
}

#[async_trait]
impl SourceAdapter for EuroSquadAdapter {
    fn source_id(&self) -> &'static str {
        Self::SOURCE_ID
    }

    async fn search(&self, name: &str) -> Result<Vec<CandidateLink>, AdapterError> {
        if name.trim().is_empty() {
            return Ok(Vec::new());
        }
        let url = self.search_url(name);
        let document = self.http.fetch_document(Self::SOURCE_ID, &url).await?;
        self.parse_search(&document.text())
    }

    async fn fetch_profile(&self, url: &str) -> Result<PlayerRecord, AdapterError> {
        guard_url(url)?;
        let document = self.http.fetch_document(Self::SOURCE_ID, url).await?;
        snapshot_raw(&self.snapshots, Self::SOURCE_ID, &document.body).await;
        let record = self.parse_profile(url, &document.text())?;
        validate_record(&record)?;
        Ok(record)
    }
}

pub fn adapter_for_source(
    source_id: &str,
    base_url: &str,
    http: Arc<HttpFetcher>,
    snapshots: Option<Arc<ArtifactStore>>,
) -> Option<Arc<dyn SourceAdapter>> {
    match source_id {
        FootballDbAdapter::SOURCE_ID => {
            let mut adapter = FootballDbAdapter::new(base_url, http);
            if let Some(store) = snapshots {
                adapter = adapter.with_snapshots(store);
            }
            Some(Arc::new(adapter))
        }
        EuroSquadAdapter::SOURCE_ID => {
            let mut adapter = EuroSquadAdapter::new(base_url, http);
            if let Some(store) = snapshots {
                adapter = adapter.with_snapshots(store);
            }
            Some(Arc::new(adapter))
        }
        _ => None,
    }
}
