//! Card scanner facade
//!
//! The surface handed to UI and collector code: scan a frame, refresh the
//! catalog, look a card up by name or id.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::capture::CapturedFrame;
use crate::catalog::{CardRecord, CatalogStore, MatchCandidate, SearchField};
use crate::config::AppConfig;
use crate::error::CatalogError;
use crate::recognition::{Arbitrator, ArbitratorConfig, HttpVisionClient, RecognitionResult, RemoteVision};
use crate::vision::{CardType, LocalOcr, TesseractOcr};

/// Catalog plus arbitrator, shareable across tasks
pub struct CardScanner {
    catalog: Arc<CatalogStore>,
    arbitrator: Arbitrator,
    fuzzy_min_similarity: f32,
}

impl CardScanner {
    /// Scanner with an empty catalog and only the local path
    pub fn new(config: ArbitratorConfig, local_ocr: Arc<dyn LocalOcr>) -> Self {
        let catalog = Arc::new(CatalogStore::new());
        let fuzzy_min_similarity = config.fuzzy_min_similarity;
        Self {
            arbitrator: Arbitrator::new(config, Arc::clone(&catalog), local_ocr),
            catalog,
            fuzzy_min_similarity,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteVision>) -> Self {
        self.arbitrator = self.arbitrator.with_remote(remote);
        self
    }

    /// Build the tesseract backend and, when an endpoint is configured, the HTTP remote
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let local_ocr = Arc::new(TesseractOcr::new(&config.ocr.tesseract_path, &config.ocr.language));
        let scanner = Self::new(ArbitratorConfig::from(config), local_ocr);

        match &config.remote.endpoint {
            Some(endpoint) => {
                let client = HttpVisionClient::from_env(
                    endpoint,
                    config.remote.api_key_env.as_deref(),
                    Duration::from_millis(config.recognition.remote_timeout_ms),
                )
                .context("Failed to configure remote vision")?;
                info!("Remote vision endpoint: {}", client.endpoint());
                Ok(scanner.with_remote(Arc::new(client)))
            }
            None => {
                info!("No remote vision endpoint configured, local OCR only");
                Ok(scanner)
            }
        }
    }

    /// Identify the card in a frame
    pub async fn scan(&self, frame: &CapturedFrame, card_type: Option<CardType>) -> RecognitionResult {
        self.arbitrator.scan(frame, card_type).await
    }

    /// Rebuild the catalog; the previous catalog stays in place on failure
    pub fn refresh_catalog(&self, records: Vec<CardRecord>) -> Result<usize, CatalogError> {
        self.catalog.refresh(records)
    }

    /// Find a card by exact name, id, or `set/number` (`lea 232`, `lea/232`, `lea_232`)
    pub fn lookup(&self, name_or_id: &str) -> Option<Arc<CardRecord>> {
        let query = name_or_id.trim();
        if query.is_empty() {
            return None;
        }

        self.catalog
            .lookup_exact(query)
            .or_else(|| self.catalog.lookup_by_id(query))
            .or_else(|| {
                let (set_code, number) = query.split_once(['/', '_', '#', ' '])?;
                self.catalog.lookup_by_set_number(set_code.trim(), number.trim())
            })
    }

    pub fn fuzzy_search(&self, query: &str, max_results: usize) -> Vec<MatchCandidate> {
        self.catalog
            .fuzzy_search(query, max_results, self.fuzzy_min_similarity, true)
    }

    pub fn text_search(&self, query: &str, field: SearchField, limit: usize, exact: bool) -> Vec<Arc<CardRecord>> {
        self.catalog.text_search(query, field, limit, exact)
    }

    /// Probe the remote capability, updating its availability
    pub async fn probe_remote(&self) -> bool {
        self.arbitrator.probe_remote().await
    }

    pub fn last_card_type(&self) -> Option<CardType> {
        self.arbitrator.last_card_type()
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn arbitrator(&self) -> &Arbitrator {
        &self.arbitrator
    }
}
