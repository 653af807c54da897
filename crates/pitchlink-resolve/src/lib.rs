//! Cross-source player identity resolution and merge.
//!
//! Given a player-name query, the [`Resolver`] fetches a candidate profile
//! from the primary source, hunts for the same person on the secondary source
//! through an escalating cascade of fallback queries, decides identity with
//! an ordered rule table, and merges matched documents into one canonical
//! [`PlayerRecord`]. A second matcher/merge pair refreshes records a caller
//! has already persisted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pitchlink_adapters::{adapter_for_source, AdapterError, SourceAdapter};
use pitchlink_core::{
    decode_title, is_unknown_str, is_unknown_u32, normalize_date, normalize_for_compare,
    normalize_name, CandidateLink, CountedEntry, PlayerRecord, NO_PHOTO_MARKER,
};
use pitchlink_fetch::{ArtifactStore, FetchConfig, HttpFetcher};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "pitchlink-resolve";

#[derive(Debug, Clone)]
pub struct ResolveConfig {
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Ceiling for one adapter call inside a resolution; a hung source must
    /// not stall the whole cascade.
    pub per_call_timeout_secs: u64,
    /// How many primary-source candidates a disambiguation fans out to.
    pub disambiguation_breadth: usize,
    /// When set, raw profile documents are snapshotted here.
    pub artifacts_dir: Option<PathBuf>,
    pub workspace_root: PathBuf,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            user_agent: "pitchlink-bot/0.1".to_string(),
            http_timeout_secs: 15,
            per_call_timeout_secs: 10,
            disambiguation_breadth: 3,
            artifacts_dir: None,
            workspace_root: PathBuf::from("."),
        }
    }
}

impl ResolveConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_agent: std::env::var("PITCHLINK_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("PITCHLINK_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            per_call_timeout_secs: std::env::var("PITCHLINK_CALL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.per_call_timeout_secs),
            disambiguation_breadth: std::env::var("PITCHLINK_DISAMBIGUATION_BREADTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.disambiguation_breadth),
            artifacts_dir: std::env::var("PITCHLINK_ARTIFACTS_DIR").map(PathBuf::from).ok(),
            workspace_root: std::env::var("PITCHLINK_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub role: SourceRole,
    pub enabled: bool,
    pub base_url: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    Primary,
    Secondary,
}

pub fn load_source_registry(workspace_root: &Path) -> Result<SourceRegistry> {
    let path = workspace_root.join("sources.yaml");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("insufficient data")]
    InsufficientData,
    #[error("no data from any source")]
    NoDataFromAnySource,
}

// ---------------------------------------------------------------------------
// Identity matching
// ---------------------------------------------------------------------------

/// Equality over two KNOWN values; the `0`/`""` sentinels never match
/// anything, including each other.
fn known_eq_u32(a: u32, b: u32) -> bool {
    !is_unknown_u32(a) && !is_unknown_u32(b) && a == b
}

fn known_eq_str(a: &str, b: &str) -> bool {
    !is_unknown_str(a) && !is_unknown_str(b) && a == b
}

fn full_names_equal(a: &PlayerRecord, b: &PlayerRecord) -> bool {
    let left = normalize_for_compare(&a.full_name);
    let right = normalize_for_compare(&b.full_name);
    !left.is_empty() && left == right
}

/// Lowercased substring containment; an unknown position is contained in
/// nothing and contains nothing.
fn position_contains(container: &str, contained: &str) -> bool {
    !is_unknown_str(container)
        && !is_unknown_str(contained)
        && container.to_lowercase().contains(&contained.to_lowercase())
}

/// Which rule of the resolution table decided a cross-source comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    FullIdentity,
    FullNameAndFrame,
    BiometricProfile,
    CountryAgePosition,
    NameAgeOrSquadNumber,
}

pub type RulePredicate = fn(&PlayerRecord, &PlayerRecord) -> bool;

#[derive(Debug, Clone, Copy)]
pub struct ResolutionRule {
    pub rule: MatchRule,
    pub applies: RulePredicate,
}

fn full_identity(a: &PlayerRecord, b: &PlayerRecord) -> bool {
    full_names_equal(a, b)
        && known_eq_u32(a.age, b.age)
        && known_eq_u32(a.number, b.number)
        && known_eq_str(&a.preferred_foot, &b.preferred_foot)
        && known_eq_u32(a.height, b.height)
}

// Containment is deliberately one-way here: the secondary source prints
// broader position labels ("Forward") than the primary ("Centre Forward").
fn full_name_and_frame(a: &PlayerRecord, b: &PlayerRecord) -> bool {
    full_names_equal(a, b)
        && known_eq_str(&a.preferred_foot, &b.preferred_foot)
        && known_eq_u32(a.height, b.height)
        && known_eq_str(&a.country, &b.country)
        && position_contains(&b.position, &a.position)
}

fn biometric_profile(a: &PlayerRecord, b: &PlayerRecord) -> bool {
    known_eq_str(&a.country, &b.country)
        && known_eq_u32(a.age, b.age)
        && known_eq_u32(a.number, b.number)
        && known_eq_str(&a.preferred_foot, &b.preferred_foot)
        && known_eq_u32(a.height, b.height)
}

fn country_age_position(a: &PlayerRecord, b: &PlayerRecord) -> bool {
    known_eq_u32(a.age, b.age)
        && known_eq_str(&a.country, &b.country)
        && (position_contains(&a.position, &b.position)
            || position_contains(&b.position, &a.position)
            || (known_eq_str(&a.preferred_foot, &b.preferred_foot)
                && known_eq_u32(a.height, b.height)))
}

fn name_age_or_squad_number(a: &PlayerRecord, b: &PlayerRecord) -> bool {
    (full_names_equal(a, b) && known_eq_u32(a.age, b.age))
        || (known_eq_str(&a.country, &b.country)
            && known_eq_u32(a.number, b.number)
            && known_eq_u32(a.age, b.age)
            && known_eq_str(&a.preferred_foot, &b.preferred_foot)
            && position_contains(&b.position, &a.position))
}

/// Ordered rule table comparing two freshly retrieved candidates from
/// different sources. The first rule that fires wins; later rules are never
/// evaluated.
#[derive(Debug, Clone)]
pub struct ResolutionMatcher {
    rules: Vec<ResolutionRule>,
}

impl Default for ResolutionMatcher {
    fn default() -> Self {
        Self {
            rules: vec![
                ResolutionRule { rule: MatchRule::FullIdentity, applies: full_identity },
                ResolutionRule { rule: MatchRule::FullNameAndFrame, applies: full_name_and_frame },
                ResolutionRule { rule: MatchRule::BiometricProfile, applies: biometric_profile },
                ResolutionRule { rule: MatchRule::CountryAgePosition, applies: country_age_position },
                ResolutionRule { rule: MatchRule::NameAgeOrSquadNumber, applies: name_age_or_squad_number },
            ],
        }
    }
}

impl ResolutionMatcher {
    pub fn with_rules(rules: Vec<ResolutionRule>) -> Self {
        Self { rules }
    }

    pub fn decide(&self, a: &PlayerRecord, b: &PlayerRecord) -> Option<MatchRule> {
        let fired = self
            .rules
            .iter()
            .find(|entry| (entry.applies)(a, b))
            .map(|entry| entry.rule);
        debug!(rule = ?fired, "resolution matcher decided");
        fired
    }
}

/// Which rule decided a persisted-vs-fresh comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationRule {
    BirthDateAndFullName,
    CountryBirthDateAndNameParts,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconciliationRuleEntry {
    pub rule: ReconciliationRule,
    pub applies: RulePredicate,
}

fn birth_dates_equal(persisted: &PlayerRecord, candidate: &PlayerRecord) -> bool {
    match (normalize_date(&persisted.born), normalize_date(&candidate.born)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

/// The persisted side may carry a curated full name where the scrape only
/// has a short one; fall back to `name` on either side.
fn primary_name(record: &PlayerRecord) -> &str {
    if is_unknown_str(&record.full_name) {
        &record.name
    } else {
        &record.full_name
    }
}

fn birth_date_and_full_name(persisted: &PlayerRecord, candidate: &PlayerRecord) -> bool {
    birth_dates_equal(persisted, candidate) && {
        let left = normalize_name(primary_name(persisted));
        let right = normalize_name(primary_name(candidate));
        !left.is_empty() && left == right
    }
}

fn short_names_equal(persisted: &PlayerRecord, candidate: &PlayerRecord) -> bool {
    let left = normalize_name(&persisted.name);
    let right = normalize_name(&candidate.name);
    !left.is_empty() && left == right
}

fn titles_equal(persisted: &PlayerRecord, candidate: &PlayerRecord) -> bool {
    let left = normalize_name(&decode_title(&persisted.title));
    let right = normalize_name(&decode_title(&candidate.title));
    !left.is_empty() && left == right
}

/// First/last token comparison: last names must agree exactly, and the
/// persisted first name may be a prefix of the candidate's ("Dani" / "Daniel").
fn split_name_match(persisted: &PlayerRecord, candidate: &PlayerRecord) -> bool {
    let left = normalize_for_compare(&persisted.name).to_lowercase();
    let right = normalize_for_compare(&candidate.name).to_lowercase();
    let left_tokens: Vec<&str> = left.split_whitespace().collect();
    let right_tokens: Vec<&str> = right.split_whitespace().collect();
    match (
        left_tokens.first(),
        left_tokens.last(),
        right_tokens.first(),
        right_tokens.last(),
    ) {
        (Some(first), Some(last), Some(candidate_first), Some(candidate_last)) => {
            candidate_first.starts_with(first) && last == candidate_last
        }
        _ => false,
    }
}

fn country_birth_date_and_name_parts(persisted: &PlayerRecord, candidate: &PlayerRecord) -> bool {
    known_eq_str(&persisted.country, &candidate.country)
        && birth_dates_equal(persisted, candidate)
        && (short_names_equal(persisted, candidate)
            || titles_equal(persisted, candidate)
            || split_name_match(persisted, candidate))
}

/// Ordered rule table comparing a freshly retrieved candidate against an
/// already-persisted record.
#[derive(Debug, Clone)]
pub struct ReconciliationMatcher {
    rules: Vec<ReconciliationRuleEntry>,
}

impl Default for ReconciliationMatcher {
    fn default() -> Self {
        Self {
            rules: vec![
                ReconciliationRuleEntry {
                    rule: ReconciliationRule::BirthDateAndFullName,
                    applies: birth_date_and_full_name,
                },
                ReconciliationRuleEntry {
                    rule: ReconciliationRule::CountryBirthDateAndNameParts,
                    applies: country_birth_date_and_name_parts,
                },
            ],
        }
    }
}

impl ReconciliationMatcher {
    pub fn decide(
        &self,
        persisted: &PlayerRecord,
        candidate: &PlayerRecord,
    ) -> Option<ReconciliationRule> {
        if is_unknown_str(&persisted.name) || is_unknown_str(&candidate.name) {
            return None;
        }
        let fired = self
            .rules
            .iter()
            .find(|entry| (entry.applies)(persisted, candidate))
            .map(|entry| entry.rule);
        debug!(rule = ?fired, "reconciliation matcher decided");
        fired
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

fn title_number_sum(entries: &[CountedEntry]) -> i64 {
    entries
        .iter()
        .map(|entry| entry.number.trim().parse::<i64>().unwrap_or(0))
        .sum()
}

/// Combine two same-person documents discovered during resolution. `base`
/// wins except where the rules below say otherwise; neither input is
/// mutated and the result is a new record.
pub fn merge_candidates(base: &PlayerRecord, other: &PlayerRecord) -> PlayerRecord {
    let mut merged = base.clone();

    if is_unknown_str(&merged.name) {
        merged.name = other.name.clone();
    }
    if is_unknown_str(&merged.title) {
        merged.title = other.title.clone();
    }
    if is_unknown_u32(merged.number) {
        merged.number = other.number;
    }
    if is_unknown_u32(merged.weight) {
        merged.weight = other.weight;
    }
    if is_unknown_u32(merged.height) {
        merged.height = other.height;
    }
    if is_unknown_str(&merged.preferred_foot) {
        merged.preferred_foot = other.preferred_foot.clone();
    }
    // Longer club text is assumed to be the more complete official name.
    if is_unknown_str(&merged.current_club)
        || other.current_club.chars().count() > merged.current_club.chars().count()
    {
        merged.current_club = other.current_club.clone();
    }
    if merged.image.contains(NO_PHOTO_MARKER) {
        merged.image = other.image.clone();
    }
    if is_unknown_str(&merged.position)
        || merged.position.chars().count() < other.position.chars().count()
    {
        merged.position = other.position.clone();
    }
    if is_unknown_str(&merged.born) {
        merged.born = other.born.clone();
    }
    if is_unknown_str(&merged.birth_country) {
        merged.birth_country = other.birth_country.clone();
    }
    if merged.transfers.is_empty() {
        merged.transfers = other.transfers.clone();
    }
    if other.titles.len() > merged.titles.len()
        || title_number_sum(&other.titles) > title_number_sum(&merged.titles)
    {
        merged.titles = other.titles.clone();
    }
    // The secondary source is authoritative for fields the primary never
    // carries.
    merged.other_nationality = other.other_nationality.clone();
    merged.website = other.website.clone();
    merged.status = other.status.clone();
    merged.awards = other.awards.clone();

    merged
}

/// List fields that union by an identity key instead of replacing
/// wholesale; keys are the camelCase wire names.
const UNION_LIST_KEYS: [(&str, &str); 4] = [
    ("awards", "name"),
    ("titles", "name"),
    ("transfers", "season"),
    ("playerAttributes", "name"),
];

fn union_by_key(base_items: Option<&Value>, incoming: &[Value], id_key: &str) -> Vec<Value> {
    let mut merged: Vec<Value> = base_items
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default();
    let present: HashSet<String> = merged
        .iter()
        .filter_map(|item| item.get(id_key).and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    for item in incoming {
        match item.get(id_key).and_then(|v| v.as_str()) {
            Some(key) if present.contains(key) => {}
            _ => merged.push(item.clone()),
        }
    }
    merged
}

fn is_falsy_scalar(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Number(number) => {
            number.as_i64() == Some(0) || number.as_u64() == Some(0) || number.as_f64() == Some(0.0)
        }
        _ => false,
    }
}

fn merge_value_maps(base: &mut Value, incoming: &Value) {
    let Some(incoming_map) = incoming.as_object() else {
        return;
    };
    let Some(base_map) = base.as_object_mut() else {
        return;
    };
    for (key, incoming_field) in incoming_map {
        match incoming_field {
            Value::Array(items) => {
                if items.is_empty() {
                    continue;
                }
                if let Some(&(_, id_key)) =
                    UNION_LIST_KEYS.iter().find(|(list_key, _)| *list_key == key.as_str())
                {
                    let merged = union_by_key(base_map.get(key), items, id_key);
                    base_map.insert(key.clone(), Value::Array(merged));
                } else {
                    base_map.insert(key.clone(), incoming_field.clone());
                }
            }
            value if is_falsy_scalar(value) => {}
            value => {
                base_map.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Refresh a persisted record with freshly resolved data: every field of
/// `incoming` is visited generically, unknowns never overwrite, keyed lists
/// union without dropping anything the store already had.
pub fn merge_reconciled(base: &PlayerRecord, incoming: &PlayerRecord) -> Result<PlayerRecord> {
    let mut base_value = serde_json::to_value(base).context("serializing persisted record")?;
    let incoming_value = serde_json::to_value(incoming).context("serializing fresh record")?;
    merge_value_maps(&mut base_value, &incoming_value);
    serde_json::from_value(base_value).context("rebuilding merged record")
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolutionState {
    Start,
    SourceAResolved,
    CrossResolutionAttempt(usize),
    Matched,
    SingleSourceAccepted,
    Failed,
}

struct FallbackQuery {
    label: &'static str,
    build: fn(&PlayerRecord) -> Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn display_title_query(record: &PlayerRecord) -> Option<String> {
    non_empty(decode_title(&record.title))
}

fn short_name_query(record: &PlayerRecord) -> Option<String> {
    non_empty(record.name.clone())
}

fn full_name_query(record: &PlayerRecord) -> Option<String> {
    non_empty(record.full_name.clone())
}

fn composite_query(record: &PlayerRecord) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for part in [
        decode_title(&record.title),
        record.position.clone(),
        record.country.clone(),
    ] {
        if !is_unknown_str(&part) {
            parts.push(part);
        }
    }
    if !is_unknown_u32(record.age) {
        parts.push(record.age.to_string());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Escalation order for re-querying the secondary source once the initial
/// by-name lookup failed to produce a match.
const FALLBACK_QUERIES: [FallbackQuery; 4] = [
    FallbackQuery { label: "display-title", build: display_title_query },
    FallbackQuery { label: "short-name", build: short_name_query },
    FallbackQuery { label: "full-name", build: full_name_query },
    FallbackQuery { label: "composite", build: composite_query },
];

/// The public boundary of the pipeline: `resolve_one`, `resolve_many`,
/// `reconcile`.
#[derive(Clone)]
pub struct Resolver {
    primary: Arc<dyn SourceAdapter>,
    secondary: Arc<dyn SourceAdapter>,
    matcher: ResolutionMatcher,
    reconciliation: ReconciliationMatcher,
    per_call_timeout: Duration,
    disambiguation_breadth: usize,
}

impl Resolver {
    pub fn new(
        primary: Arc<dyn SourceAdapter>,
        secondary: Arc<dyn SourceAdapter>,
        config: &ResolveConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            matcher: ResolutionMatcher::default(),
            reconciliation: ReconciliationMatcher::default(),
            per_call_timeout: Duration::from_secs(config.per_call_timeout_secs.max(1)),
            disambiguation_breadth: config.disambiguation_breadth.max(1),
        }
    }

    /// Wire up a resolver from `sources.yaml` and the environment config.
    pub fn from_registry(config: &ResolveConfig) -> Result<Self> {
        let registry = load_source_registry(&config.workspace_root)?;
        let http = Arc::new(HttpFetcher::new(FetchConfig {
            timeout: Duration::from_secs(config.http_timeout_secs.max(1)),
            user_agent: Some(config.user_agent.clone()),
            ..FetchConfig::default()
        })?);
        let snapshots = config
            .artifacts_dir
            .as_ref()
            .map(|dir| Arc::new(ArtifactStore::new(dir.clone())));

        let mut primary = None;
        let mut secondary = None;
        for source in registry.sources.iter().filter(|s| s.enabled) {
            let adapter = adapter_for_source(
                &source.source_id,
                &source.base_url,
                http.clone(),
                snapshots.clone(),
            )
            .with_context(|| format!("no adapter registered for {}", source.source_id))?;
            match source.role {
                SourceRole::Primary => primary = Some(adapter),
                SourceRole::Secondary => secondary = Some(adapter),
            }
        }

        Ok(Self::new(
            primary.context("registry names no enabled primary source")?,
            secondary.context("registry names no enabled secondary source")?,
            config,
        ))
    }

    /// One best-effort canonical record for a name query.
    pub async fn resolve_one(&self, name: &str) -> Result<PlayerRecord, ResolveError> {
        self.resolve_from(None, name).await
    }

    /// Every plausible record for an ambiguous name: fan out over the top
    /// primary-source candidates and resolve each independently.
    pub async fn resolve_many(&self, name: &str) -> Vec<PlayerRecord> {
        let links = self
            .search_source(self.primary.as_ref(), name)
            .await
            .unwrap_or_default();
        let total = links.len();
        let top: Vec<CandidateLink> = links
            .into_iter()
            .take(self.disambiguation_breadth)
            .collect();
        if total > top.len() {
            debug!(kept = top.len(), dropped = total - top.len(), "capping disambiguation fan-out");
        }

        let mut tasks = JoinSet::new();
        for link in top {
            let resolver = self.clone();
            let seed = name.to_string();
            tasks.spawn(async move { resolver.resolve_from(Some(link), &seed).await });
        }

        let mut records = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(record)) => {
                    if record.is_anonymous() {
                        debug!("dropping anonymous disambiguation result");
                    } else {
                        records.push(record);
                    }
                }
                Ok(Err(err)) => debug!(%err, "disambiguation candidate did not resolve"),
                Err(err) => warn!(%err, "disambiguation task failed"),
            }
        }
        records
    }

    /// Refresh an already-persisted record: re-resolve by name and, if a
    /// fresh candidate passes the reconciliation rules, merge it on top of
    /// `persisted`. No match leaves the record untouched.
    pub async fn reconcile(&self, persisted: &PlayerRecord, name: &str) -> PlayerRecord {
        let candidates = self.resolve_many(name).await;
        for candidate in &candidates {
            if let Some(rule) = self.reconciliation.decide(persisted, candidate) {
                debug!(?rule, "persisted record matched a fresh candidate");
                match merge_reconciled(persisted, candidate) {
                    Ok(merged) => return merged,
                    Err(err) => {
                        warn!(%err, "reconciliation merge failed; keeping persisted record");
                        return persisted.clone();
                    }
                }
            }
        }
        debug!(name, "no reconciliation match; persisted record unchanged");
        persisted.clone()
    }

    async fn resolve_from(
        &self,
        primary_link: Option<CandidateLink>,
        seed_name: &str,
    ) -> Result<PlayerRecord, ResolveError> {
        let mut state = ResolutionState::Start;
        debug!(?state, seed_name, "starting resolution");

        let (primary_record, secondary_record) = tokio::join!(
            self.fetch_primary(primary_link, seed_name),
            self.lookup_secondary(seed_name),
        );

        let mut merged: Option<PlayerRecord> = None;
        if let Some(a) = &primary_record {
            state = ResolutionState::SourceAResolved;
            debug!(?state, name = %a.name, "primary source resolved");

            if let Some(b) = &secondary_record {
                if let Some(rule) = self.matcher.decide(a, b) {
                    debug!(?rule, "matched on the initial cross-source lookup");
                    merged = Some(merge_candidates(a, b));
                }
            }

            if merged.is_none() {
                for (attempt, fallback) in FALLBACK_QUERIES.iter().enumerate() {
                    state = ResolutionState::CrossResolutionAttempt(attempt + 1);
                    let Some(query) = (fallback.build)(a) else {
                        debug!(?state, fallback = fallback.label, "fallback query not constructible");
                        continue;
                    };
                    debug!(?state, fallback = fallback.label, %query, "retrying secondary source");
                    let Some(b) = self.lookup_secondary(&query).await else {
                        continue;
                    };
                    if let Some(rule) = self.matcher.decide(a, &b) {
                        debug!(?rule, fallback = fallback.label, "cross-source match found");
                        merged = Some(merge_candidates(a, &b));
                        break;
                    }
                }
            }
        }

        match (primary_record, merged) {
            (Some(_), Some(record)) => {
                state = ResolutionState::Matched;
                debug!(?state, "returning merged record");
                Ok(record)
            }
            (Some(a), None) => {
                if a.lacks_vital_fields() {
                    state = ResolutionState::Failed;
                    warn!(?state, seed_name, "sole surviving record has no usable fields");
                    Err(ResolveError::InsufficientData)
                } else {
                    state = ResolutionState::SingleSourceAccepted;
                    debug!(?state, "returning primary record alone");
                    Ok(a)
                }
            }
            (None, _) => match secondary_record {
                Some(b) => {
                    state = ResolutionState::SingleSourceAccepted;
                    debug!(?state, "returning secondary record alone");
                    Ok(b)
                }
                None => {
                    state = ResolutionState::Failed;
                    warn!(?state, seed_name, "no source produced a record");
                    Err(ResolveError::NoDataFromAnySource)
                }
            },
        }
    }

    async fn fetch_primary(
        &self,
        link: Option<CandidateLink>,
        name: &str,
    ) -> Option<PlayerRecord> {
        let url = match link {
            Some(link) => link.url,
            None => {
                let links = self.search_source(self.primary.as_ref(), name).await?;
                match links.into_iter().next() {
                    Some(link) => link.url,
                    None => {
                        debug!(source = self.primary.source_id(), name, "no candidate links");
                        return None;
                    }
                }
            }
        };
        self.fetch_source(self.primary.as_ref(), &url).await
    }

    async fn lookup_secondary(&self, query: &str) -> Option<PlayerRecord> {
        let links = self.search_source(self.secondary.as_ref(), query).await?;
        let link = links.into_iter().next()?;
        self.fetch_source(self.secondary.as_ref(), &link.url).await
    }

    /// Adapter calls are bounded and downgraded: a failure or timeout means
    /// "no record from this source", never an error for the caller.
    async fn search_source(
        &self,
        adapter: &dyn SourceAdapter,
        query: &str,
    ) -> Option<Vec<CandidateLink>> {
        let outcome = match timeout(self.per_call_timeout, adapter.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout),
        };
        match outcome {
            Ok(links) => Some(links),
            Err(err) => {
                warn!(source = adapter.source_id(), query, %err, "search failed; treating source as unavailable");
                None
            }
        }
    }

    async fn fetch_source(&self, adapter: &dyn SourceAdapter, url: &str) -> Option<PlayerRecord> {
        let outcome = match timeout(self.per_call_timeout, adapter.fetch_profile(url)).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout),
        };
        match outcome {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(source = adapter.source_id(), url, %err, "profile fetch failed; treating source as unavailable");
                None
            }
        }
    }
}
