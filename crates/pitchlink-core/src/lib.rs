//! Core domain model and text normalization for pitchlink.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const CRATE_NAME: &str = "pitchlink-core";

/// Substring that marks a source's "no photo available" placeholder image.
pub const NO_PHOTO_MARKER: &str = "no-photo";

/// One scouting attribute as listed by a source (e.g. "Pace" / "97").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeEntry {
    pub name: String,
    pub value: String,
}

/// One counted honour line: `number` stays free text ("2", "–", "").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CountedEntry {
    pub number: String,
    pub name: String,
}

/// One transfer-history row, all columns as the source printed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransferEntry {
    pub season: String,
    pub team: String,
    pub amount: String,
}

/// A snapshot of one player profile from one source, or the merged canonical
/// view of several. Unknown values are `""`/`0`, never an optional: the
/// persisted wire shape has no nulls and every rule downstream goes through
/// the `is_unknown_*` predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerRecord {
    pub name: String,
    /// Display name as lifted from the profile URL; may be percent-encoded.
    pub title: String,
    pub full_name: String,
    pub age: u32,
    /// Free text or an already-normalized `YYYY-MM-DD` string.
    pub born: String,
    pub birth_country: String,
    pub country: String,
    pub other_nationality: String,
    /// `"left"`, `"right"`, or `""`.
    pub preferred_foot: String,
    /// Kilograms.
    pub weight: u32,
    /// Centimetres.
    pub height: u32,
    pub current_club: String,
    /// Free text, possibly multi-word ("Centre Forward").
    pub position: String,
    /// Jersey number.
    pub number: u32,
    /// Free text, the source may append goal counts.
    pub caps: String,
    pub status: String,
    pub value: String,
    pub currency: String,
    pub highest_value_in_career: String,
    pub elo: u32,
    pub player_attributes: Vec<AttributeEntry>,
    pub titles: Vec<CountedEntry>,
    pub awards: Vec<CountedEntry>,
    pub transfers: Vec<TransferEntry>,
    pub image: String,
    pub website: String,
    /// Retrieval time, RFC 3339.
    pub timestamp: String,
}

impl PlayerRecord {
    /// True when the record carries none of the biometric or career fields
    /// that would let the pipeline stand behind a single-source answer.
    pub fn lacks_vital_fields(&self) -> bool {
        is_unknown_u32(self.age)
            && is_unknown_u32(self.weight)
            && is_unknown_u32(self.height)
            && is_unknown_str(&self.preferred_foot)
            && is_unknown_str(&self.current_club)
    }

    /// A record with neither a name nor a display title identifies nobody.
    pub fn is_anonymous(&self) -> bool {
        is_unknown_str(&self.name) && is_unknown_str(&self.title)
    }
}

/// Search hit from one source, not yet confirmed to be the right person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    pub source_id: String,
    pub url: String,
}

/// `""` is the sentinel for "this source did not report the field".
pub fn is_unknown_str(value: &str) -> bool {
    value.is_empty()
}

/// `0` is the sentinel for unknown numeric fields; a real zero never occurs
/// for age/height/weight/jersey/elo.
pub fn is_unknown_u32(value: u32) -> bool {
    value == 0
}

/// Comparison form: decompose, drop the combining marks, drop everything
/// that is neither a word character nor whitespace, trim.
pub fn normalize_for_compare(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Search-query slug: comparison form, lowercased, whitespace runs collapsed
/// to single hyphens.
pub fn normalize_name(text: &str) -> String {
    normalize_for_compare(text)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

const MONTH_ABBREVIATIONS: [(&str, &str); 12] = [
    ("jan", "01"),
    ("feb", "02"),
    ("mar", "03"),
    ("apr", "04"),
    ("may", "05"),
    ("jun", "06"),
    ("jul", "07"),
    ("aug", "08"),
    ("sep", "09"),
    ("oct", "10"),
    ("nov", "11"),
    ("dec", "12"),
];

/// Canonicalize a free-text birth date to `YYYY-MM-DD`.
///
/// ISO input passes through untouched; `<day> <month-name> <year>` is
/// reassembled via the month table; anything else is unparseable and maps to
/// `None` rather than an error.
pub fn normalize_date(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if is_iso_date(trimmed) {
        return Some(trimmed.to_string());
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    if day == 0 || day > 31 {
        return None;
    }
    let month_lower = parts[1].to_lowercase();
    let month = MONTH_ABBREVIATIONS
        .iter()
        .find(|(abbreviation, _)| month_lower.starts_with(abbreviation))
        .map(|(_, number)| *number)?;
    let year = parts[2];
    if year.len() != 4 || year.parse::<u32>().is_err() {
        return None;
    }

    Some(format!("{year}-{month}-{day:02}"))
}

fn is_iso_date(text: &str) -> bool {
    text.len() == 10
        && text
            .chars()
            .enumerate()
            .all(|(i, c)| if matches!(i, 4 | 7) { c == '-' } else { c.is_ascii_digit() })
}

/// Recover a displayable title from a URL-derived one: percent-decode and
/// turn slug underscores back into spaces.
pub fn decode_title(title: &str) -> String {
    percent_decode_str(title)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| title.to_string())
        .replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_form_strips_diacritics_and_punctuation() {
        assert_eq!(normalize_for_compare("Kylian Mbappé"), "Kylian Mbappe");
        assert_eq!(normalize_for_compare("O'Neill, Jr."), "ONeill Jr");
        assert_eq!(normalize_for_compare("  Müller  "), "Muller");
    }

    #[test]
    fn name_slug_lowercases_and_hyphenates() {
        assert_eq!(normalize_name("Kylian  Mbappé"), "kylian-mbappe");
        assert_eq!(normalize_name("Erling Braut Haaland"), "erling-braut-haaland");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn iso_dates_pass_through() {
        assert_eq!(normalize_date("1987-12-19").as_deref(), Some("1987-12-19"));
    }

    #[test]
    fn day_month_year_dates_are_reassembled() {
        assert_eq!(normalize_date("19 December 1987").as_deref(), Some("1987-12-19"));
        assert_eq!(normalize_date("5 jan 2001").as_deref(), Some("2001-01-05"));
        assert_eq!(normalize_date(" 7 Aug 1999 ").as_deref(), Some("1999-08-07"));
    }

    #[test]
    fn garbage_dates_are_unparseable_not_errors() {
        assert_eq!(normalize_date("not a date"), None);
        assert_eq!(normalize_date("32 December 1987"), None);
        assert_eq!(normalize_date("19 Smarch 1987"), None);
        assert_eq!(normalize_date("19 December 87"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn title_decoding_handles_percent_escapes_and_underscores() {
        assert_eq!(decode_title("Kylian_Mbapp%C3%A9"), "Kylian Mbappé");
        assert_eq!(decode_title("plain title"), "plain title");
    }

    #[test]
    fn unknown_predicates_treat_sentinels_as_absent() {
        assert!(is_unknown_str(""));
        assert!(!is_unknown_str("left"));
        assert!(is_unknown_u32(0));
        assert!(!is_unknown_u32(178));
    }

    #[test]
    fn vital_field_check_needs_every_biometric_missing() {
        let mut record = PlayerRecord::default();
        assert!(record.lacks_vital_fields());
        record.height = 178;
        assert!(!record.lacks_vital_fields());
    }

    #[test]
    fn records_serialize_in_the_camel_case_wire_shape() {
        let record = PlayerRecord {
            full_name: "Kylian Mbappé Lottin".to_string(),
            birth_country: "France".to_string(),
            highest_value_in_career: "200000000".to_string(),
            ..PlayerRecord::default()
        };
        let wire = serde_json::to_value(&record).expect("serialize");
        assert!(wire.get("fullName").is_some());
        assert!(wire.get("birthCountry").is_some());
        assert!(wire.get("highestValueInCareer").is_some());
        assert!(wire.get("playerAttributes").is_some());
        assert!(wire.get("full_name").is_none());
    }
}
