//! Shared catalog holder with swap-on-rebuild semantics
//!
//! Readers take a snapshot `Arc<CatalogIndex>` and keep using it even if a
//! refresh lands mid-query. A refresh builds the new index off to the side and
//! replaces the reference under a short write lock.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use super::{CardRecord, CatalogIndex, MatchCandidate, SearchField};
use crate::error::CatalogError;

/// Read-mostly holder of the current catalog index
#[derive(Debug, Default)]
pub struct CatalogStore {
    current: RwLock<Option<Arc<CatalogIndex>>>,
}

impl CatalogStore {
    /// Create an empty (not ready) store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from records, failing on an empty list
    pub fn from_records(records: Vec<CardRecord>) -> Result<Self, CatalogError> {
        let store = Self::new();
        store.refresh(records)?;
        Ok(store)
    }

    /// Rebuild the index from `records` and swap it in
    ///
    /// On failure the previous index (if any) stays in place.
    pub fn refresh(&self, records: Vec<CardRecord>) -> Result<usize, CatalogError> {
        let index = match CatalogIndex::build(records) {
            Ok(index) => index,
            Err(e) => {
                warn!("Catalog refresh rejected: {}", e);
                return Err(e);
            }
        };

        let count = index.len();
        *self.current.write() = Some(Arc::new(index));
        info!("Catalog refreshed with {} records", count);
        Ok(count)
    }

    /// Drop the current index; queries return empty results until the next refresh
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    /// Current index, if one has been built
    pub fn snapshot(&self) -> Option<Arc<CatalogIndex>> {
        self.current.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Number of records in the current index (0 when not ready)
    pub fn len(&self) -> usize {
        self.snapshot().map(|index| index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup_exact(&self, name: &str) -> Option<Arc<CardRecord>> {
        self.snapshot()?.lookup_exact(name)
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<Arc<CardRecord>> {
        self.snapshot()?.lookup_by_id(id)
    }

    pub fn lookup_by_set_number(&self, set_code: &str, collector_number: &str) -> Option<Arc<CardRecord>> {
        self.snapshot()?.lookup_by_set_number(set_code, collector_number)
    }

    pub fn fuzzy_search(
        &self,
        query: &str,
        max_results: usize,
        min_similarity: f32,
        exact_first: bool,
    ) -> Vec<MatchCandidate> {
        self.snapshot()
            .map(|index| index.fuzzy_search(query, max_results, min_similarity, exact_first))
            .unwrap_or_default()
    }

    pub fn text_search(&self, query: &str, field: SearchField, limit: usize, exact: bool) -> Vec<Arc<CardRecord>> {
        self.snapshot()
            .map(|index| index.text_search(query, field, limit, exact))
            .unwrap_or_default()
    }
}
