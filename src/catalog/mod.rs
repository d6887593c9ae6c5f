//! Card Catalog
//!
//! Offline reference set of card records with O(1) lookups and edit-distance
//! fuzzy search. The index is a pure function of the record list; a refresh
//! builds a new index and swaps it in (see [`store::CatalogStore`]).

pub mod index;
pub mod similarity;
pub mod store;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub use index::CatalogIndex;
pub use similarity::{levenshtein, similarity};
pub use store::CatalogStore;

/// Similarity at or above which a fuzzy match is considered "high"
pub const HIGH_MATCH_SIMILARITY: f32 = 0.85;
/// Similarity at or above which a fuzzy match is considered "medium"
pub const MEDIUM_MATCH_SIMILARITY: f32 = 0.70;

/// One catalog entry, immutable once loaded
///
/// Accepts Scryfall-style bulk data keys (`set`, `prices`, `image_uris`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Stable identifier from the metadata provider
    pub id: String,
    /// Printed card name
    pub name: String,
    /// Set code (e.g. "lea")
    #[serde(alias = "set", default)]
    pub set_code: String,
    /// Collector number within the set
    #[serde(default)]
    pub collector_number: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub type_line: String,
    #[serde(default)]
    pub mana_cost: Option<String>,
    /// Color symbols (W, U, B, R, G)
    #[serde(default)]
    pub colors: BTreeSet<String>,
    #[serde(alias = "prices", default)]
    pub price_snapshot: PriceSnapshot,
    /// Image URIs keyed by size/variant
    #[serde(alias = "image_uris", default)]
    pub image_refs: BTreeMap<String, String>,
    #[serde(default)]
    pub oracle_text: Option<String>,
}

impl CardRecord {
    /// Create a record with only the identifying fields set
    pub fn new(id: &str, name: &str, set_code: &str, collector_number: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            set_code: set_code.to_string(),
            collector_number: collector_number.to_string(),
            rarity: String::new(),
            type_line: String::new(),
            mana_cost: None,
            colors: BTreeSet::new(),
            price_snapshot: PriceSnapshot::default(),
            image_refs: BTreeMap::new(),
            oracle_text: None,
        }
    }

    /// Key used by the set+number index (`"<set>_<number>"`, lower-cased)
    pub fn set_number_key(&self) -> Option<String> {
        if self.set_code.is_empty() || self.collector_number.is_empty() {
            return None;
        }
        Some(set_number_key(&self.set_code, &self.collector_number))
    }
}

pub(crate) fn set_number_key(set_code: &str, collector_number: &str) -> String {
    format!("{}_{}", set_code, collector_number).to_lowercase()
}

/// Market prices at the time the bulk data was fetched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    #[serde(default, deserialize_with = "de_price")]
    pub usd: Option<f64>,
    #[serde(default, deserialize_with = "de_price")]
    pub usd_foil: Option<f64>,
    #[serde(default, deserialize_with = "de_price")]
    pub eur: Option<f64>,
    #[serde(default, deserialize_with = "de_price")]
    pub tix: Option<f64>,
}

/// Prices arrive either as numbers or as decimal strings
fn de_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPrice {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<RawPrice>::deserialize(deserializer)? {
        Some(RawPrice::Number(value)) => Some(value),
        Some(RawPrice::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

/// Quality bucket of a fuzzy match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    High,
    Medium,
    Low,
}

impl MatchType {
    /// Bucket a non-exact similarity score
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity >= 1.0 {
            MatchType::Exact
        } else if similarity >= HIGH_MATCH_SIMILARITY {
            MatchType::High
        } else if similarity >= MEDIUM_MATCH_SIMILARITY {
            MatchType::Medium
        } else {
            MatchType::Low
        }
    }
}

/// One ranked fuzzy-search result
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    /// Shared reference into the catalog
    pub card: Arc<CardRecord>,
    /// Normalized similarity (0.0 - 1.0)
    pub similarity: f32,
    pub match_type: MatchType,
}

impl MatchCandidate {
    pub(crate) fn new(card: Arc<CardRecord>, similarity: f32) -> Self {
        Self {
            card,
            similarity,
            match_type: MatchType::from_similarity(similarity),
        }
    }

    pub(crate) fn exact(card: Arc<CardRecord>) -> Self {
        Self {
            card,
            similarity: 1.0,
            match_type: MatchType::Exact,
        }
    }
}

/// Record field scanned by [`CatalogIndex::text_search`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SearchField {
    #[default]
    Name,
    TypeLine,
    Set,
    OracleText,
}

impl SearchField {
    pub(crate) fn value<'a>(&self, card: &'a CardRecord) -> &'a str {
        match self {
            SearchField::Name => &card.name,
            SearchField::TypeLine => &card.type_line,
            SearchField::Set => &card.set_code,
            SearchField::OracleText => card.oracle_text.as_deref().unwrap_or(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_scryfall_shape() {
        let json = r#"{
            "id": "e3285e6b-3e79-4d7c-bf96-d920f973b122",
            "name": "Lightning Bolt",
            "set": "lea",
            "collector_number": "161",
            "rarity": "common",
            "type_line": "Instant",
            "mana_cost": "{R}",
            "colors": ["R"],
            "prices": {"usd": "412.50", "usd_foil": null, "eur": 350.0, "tix": "bad"},
            "image_uris": {"small": "https://example.invalid/small.jpg"},
            "oracle_text": "Lightning Bolt deals 3 damage to any target.",
            "layout": "normal"
        }"#;

        let card: CardRecord = serde_json::from_str(json).unwrap();
        assert_eq!(card.set_code, "lea");
        assert_eq!(card.mana_cost.as_deref(), Some("{R}"));
        assert!(card.colors.contains("R"));
        assert_eq!(card.price_snapshot.usd, Some(412.5));
        assert_eq!(card.price_snapshot.usd_foil, None);
        assert_eq!(card.price_snapshot.eur, Some(350.0));
        assert_eq!(card.price_snapshot.tix, None);
        assert_eq!(card.image_refs.len(), 1);
        assert_eq!(card.set_number_key().as_deref(), Some("lea_161"));
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let card: CardRecord = serde_json::from_str(r#"{"id": "1", "name": "Island"}"#).unwrap();
        assert!(card.set_code.is_empty());
        assert!(card.set_number_key().is_none());
        assert!(card.oracle_text.is_none());
    }

    #[test]
    fn test_match_type_buckets() {
        assert_eq!(MatchType::from_similarity(1.0), MatchType::Exact);
        assert_eq!(MatchType::from_similarity(0.9), MatchType::High);
        assert_eq!(MatchType::from_similarity(0.75), MatchType::Medium);
        assert_eq!(MatchType::from_similarity(0.4), MatchType::Low);
    }

    #[test]
    fn test_search_field_value() {
        let mut card = CardRecord::new("1", "Black Lotus", "LEA", "232");
        card.type_line = "Artifact".to_string();
        assert_eq!(SearchField::Name.value(&card), "Black Lotus");
        assert_eq!(SearchField::TypeLine.value(&card), "Artifact");
        assert_eq!(SearchField::Set.value(&card), "LEA");
        assert_eq!(SearchField::OracleText.value(&card), "");
    }
}
