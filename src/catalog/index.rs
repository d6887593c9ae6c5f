//! Catalog index: exact lookup maps plus fuzzy and text search

use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::similarity::{similarity_upper_bound, similarity_with_rows};
use super::{set_number_key, CardRecord, MatchCandidate, SearchField};
use crate::error::CatalogError;

/// Lower-cased name with its pre-counted length, one per distinct name
#[derive(Debug)]
struct NameEntry {
    key: String,
    len: usize,
    card: Arc<CardRecord>,
}

/// Rebuildable lookup structure over a backing list of card records
///
/// Records are shared through `Arc`, never copied. When several records share
/// a key (reprints), the first one in the backing list owns it.
#[derive(Debug)]
pub struct CatalogIndex {
    records: Vec<Arc<CardRecord>>,
    by_name: HashMap<String, Arc<CardRecord>>,
    by_id: HashMap<String, Arc<CardRecord>>,
    by_set_number: HashMap<String, Arc<CardRecord>>,
    /// Distinct names in first-occurrence order, scored by fuzzy search
    names: Vec<NameEntry>,
}

impl CatalogIndex {
    /// Build all lookup maps in one pass over `records`
    pub fn build(records: Vec<CardRecord>) -> Result<Self, CatalogError> {
        if records.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }

        let records: Vec<Arc<CardRecord>> = records.into_iter().map(Arc::new).collect();
        let mut by_name = HashMap::with_capacity(records.len());
        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_set_number = HashMap::with_capacity(records.len());
        let mut names = Vec::new();

        for card in &records {
            let name_key = card.name.to_lowercase();
            if !name_key.is_empty() && !by_name.contains_key(&name_key) {
                names.push(NameEntry {
                    len: name_key.chars().count(),
                    key: name_key.clone(),
                    card: Arc::clone(card),
                });
                by_name.insert(name_key, Arc::clone(card));
            }

            if !card.id.is_empty() {
                by_id.entry(card.id.clone()).or_insert_with(|| Arc::clone(card));
            }

            if let Some(key) = card.set_number_key() {
                by_set_number.entry(key).or_insert_with(|| Arc::clone(card));
            }
        }

        debug!(
            "Built catalog index: {} records, {} names, {} ids, {} set numbers",
            records.len(),
            by_name.len(),
            by_id.len(),
            by_set_number.len()
        );

        Ok(Self {
            records,
            by_name,
            by_id,
            by_set_number,
            names,
        })
    }

    /// Number of records in the backing list
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct card names
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Backing records in catalog order
    pub fn records(&self) -> &[Arc<CardRecord>] {
        &self.records
    }

    /// Case-insensitive exact name lookup
    pub fn lookup_exact(&self, name: &str) -> Option<Arc<CardRecord>> {
        self.by_name.get(&name.trim().to_lowercase()).cloned()
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<Arc<CardRecord>> {
        self.by_id.get(id.trim()).cloned()
    }

    pub fn lookup_by_set_number(&self, set_code: &str, collector_number: &str) -> Option<Arc<CardRecord>> {
        self.by_set_number
            .get(&set_number_key(set_code.trim(), collector_number.trim()))
            .cloned()
    }

    /// Similarity-ranked name search
    ///
    /// With `exact_first`, an exact (case-insensitive) hit is returned alone with
    /// similarity 1.0. Otherwise every distinct name is scored, candidates below
    /// `min_similarity` are dropped, and the rest are sorted by descending
    /// similarity (ties keep catalog order) and truncated to `max_results`.
    pub fn fuzzy_search(
        &self,
        query: &str,
        max_results: usize,
        min_similarity: f32,
        exact_first: bool,
    ) -> Vec<MatchCandidate> {
        let query = query.trim().to_lowercase();
        if query.is_empty() || max_results == 0 {
            return Vec::new();
        }

        if exact_first {
            if let Some(card) = self.by_name.get(&query) {
                return vec![MatchCandidate::exact(Arc::clone(card))];
            }
        }

        let query_chars: Vec<char> = query.chars().collect();
        let query_len = query_chars.len();

        let mut candidates: Vec<MatchCandidate> = self
            .names
            .par_iter()
            .map_init(
                || (Vec::new(), Vec::new()),
                |(prev, curr), entry| {
                    if similarity_upper_bound(query_len, entry.len) < min_similarity {
                        return None;
                    }
                    let score = similarity_with_rows(&query_chars, &entry.key, entry.len, prev, curr);
                    (score >= min_similarity).then(|| MatchCandidate::new(Arc::clone(&entry.card), score))
                },
            )
            .flatten()
            .collect();

        // Stable sort keeps catalog order among equal scores
        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        candidates.truncate(max_results);
        candidates
    }

    /// Linear substring (or equality, with `exact`) scan over one field
    ///
    /// Case-insensitive; stops as soon as `limit` records matched.
    pub fn text_search(&self, query: &str, field: SearchField, limit: usize, exact: bool) -> Vec<Arc<CardRecord>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        self.records
            .iter()
            .filter(|card| {
                let value = field.value(card).to_lowercase();
                if exact {
                    value == query
                } else {
                    value.contains(&query)
                }
            })
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MatchType;

    fn card(id: &str, name: &str, set: &str, number: &str) -> CardRecord {
        CardRecord::new(id, name, set, number)
    }

    fn sample_index() -> CatalogIndex {
        let mut bolt = card("c1", "Lightning Bolt", "lea", "161");
        bolt.type_line = "Instant".to_string();
        bolt.oracle_text = Some("Lightning Bolt deals 3 damage to any target.".to_string());

        let mut lotus = card("c2", "Black Lotus", "lea", "232");
        lotus.type_line = "Artifact".to_string();

        let mut vise = card("c3", "Black Vise", "lea", "233");
        vise.type_line = "Artifact".to_string();

        let mut helix = card("c4", "Lightning Helix", "rav", "213");
        helix.type_line = "Instant".to_string();

        CatalogIndex::build(vec![bolt, lotus, vise, helix]).unwrap()
    }

    #[test]
    fn test_build_empty_fails() {
        assert_eq!(CatalogIndex::build(vec![]).unwrap_err(), CatalogError::EmptyCatalog);
    }

    #[test]
    fn test_lookup_exact_case_insensitive() {
        let index = sample_index();
        let found = index.lookup_exact("lightning bolt").unwrap();
        assert_eq!(found.name, "Lightning Bolt");
        assert!(index.lookup_exact("  LIGHTNING BOLT ").is_some());
        assert!(index.lookup_exact("lightning").is_none());
    }

    #[test]
    fn test_lookup_by_id_and_set_number() {
        let index = sample_index();
        assert_eq!(index.lookup_by_id("c2").unwrap().name, "Black Lotus");
        assert!(index.lookup_by_id("missing").is_none());
        assert_eq!(index.lookup_by_set_number("LEA", "233").unwrap().name, "Black Vise");
        assert!(index.lookup_by_set_number("lea", "999").is_none());
    }

    #[test]
    fn test_records_are_shared_not_copied() {
        let index = sample_index();
        let by_name = index.lookup_exact("black lotus").unwrap();
        let by_id = index.lookup_by_id("c2").unwrap();
        let by_number = index.lookup_by_set_number("lea", "232").unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_id));
        assert!(Arc::ptr_eq(&by_id, &by_number));
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let index = CatalogIndex::build(vec![
            card("a", "Island", "lea", "288"),
            card("b", "Island", "leb", "288"),
            card("a", "Dup Id", "xxx", "1"),
        ])
        .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.name_count(), 2);
        assert_eq!(index.lookup_exact("island").unwrap().id, "a");
        assert_eq!(index.lookup_by_id("a").unwrap().name, "Island");
        assert_eq!(index.lookup_by_set_number("leb", "288").unwrap().id, "b");
    }

    #[test]
    fn test_exact_first_short_circuit() {
        let index = sample_index();
        let results = index.fuzzy_search("Lightning Bolt", 5, 0.1, true);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].similarity, 1.0);
        assert_eq!(results[0].match_type, MatchType::Exact);

        // Without short-circuit the near-miss is also present
        let results = index.fuzzy_search("Lightning Bolt", 5, 0.5, false);
        assert!(results.len() > 1);
        assert_eq!(results[0].card.name, "Lightning Bolt");
    }

    #[test]
    fn test_fuzzy_typo_ranking() {
        let index = CatalogIndex::build(vec![
            card("1", "Black Lotus", "lea", "232"),
            card("2", "Black Vise", "lea", "233"),
        ])
        .unwrap();

        let results = index.fuzzy_search("blak lotus", 5, 0.5, true);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].card.name, "Black Lotus");
        assert!(results[0].similarity > 0.9);

        let results = index.fuzzy_search("blak lotus", 5, 0.3, true);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].card.name, "Black Lotus");
        assert_eq!(results[1].card.name, "Black Vise");
        assert!((results[1].similarity - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_fuzzy_ordering_and_limits() {
        let index = sample_index();
        let results = index.fuzzy_search("lightning", 10, 0.0, true);
        assert_eq!(results.len(), 4);
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }

        let results = index.fuzzy_search("lightning", 1, 0.0, true);
        assert_eq!(results.len(), 1);

        let results = index.fuzzy_search("lightning", 10, 0.99, true);
        assert!(results.is_empty());
    }

    #[test]
    fn test_fuzzy_ties_keep_catalog_order() {
        let index = CatalogIndex::build(vec![
            card("1", "abcd", "", ""),
            card("2", "abce", "", ""),
            card("3", "abcf", "", ""),
        ])
        .unwrap();

        let results = index.fuzzy_search("abcx", 3, 0.5, true);
        let ids: Vec<&str> = results.iter().map(|c| c.card.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_fuzzy_empty_query() {
        let index = sample_index();
        assert!(index.fuzzy_search("   ", 5, 0.0, true).is_empty());
        assert!(index.fuzzy_search("bolt", 0, 0.0, true).is_empty());
    }

    #[test]
    fn test_text_search_fields() {
        let index = sample_index();

        let artifacts = index.text_search("artifact", SearchField::TypeLine, 10, false);
        assert_eq!(artifacts.len(), 2);

        let limited = index.text_search("artifact", SearchField::TypeLine, 1, false);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].name, "Black Lotus");

        let in_set = index.text_search("LEA", SearchField::Set, 10, true);
        assert_eq!(in_set.len(), 3);

        let by_text = index.text_search("3 damage", SearchField::OracleText, 10, false);
        assert_eq!(by_text.len(), 1);

        let exact_name = index.text_search("black", SearchField::Name, 10, true);
        assert!(exact_name.is_empty());
        let partial_name = index.text_search("black", SearchField::Name, 10, false);
        assert_eq!(partial_name.len(), 2);
    }
}
