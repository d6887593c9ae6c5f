//! Recognition arbitrator
//!
//! Per scan: `Idle -> AttemptRemote (optional) -> AttemptLocal (optional) -> Resolved`.
//!
//! The remote path is entered only when a remote capability is configured,
//! its last health probe passed, and the process-wide cooldown has elapsed
//! (or the cache already holds an accepted answer for the same image). A
//! remote answer is accepted only at or above the remote threshold; anything
//! else falls through to enhancement + local OCR + fuzzy catalog lookup, which
//! is accepted at the lower local threshold. Every capability failure becomes
//! a recorded attempt; only the final `Resolved` result leaves this module.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::cache::{image_key, RemoteCache};
use super::cooldown::CooldownGate;
use super::remote::{RemoteVision, RemoteVisionResponse, DEFAULT_PROMPT};
use super::{
    RecognitionAttempt, RecognitionMethod, RecognitionOutcome, RecognitionResult, ScanState,
    FUZZY_MIN_SIMILARITY, LOCAL_CONFIDENCE_THRESHOLD, REMOTE_CONFIDENCE_THRESHOLD, REMOTE_COOLDOWN_MS,
};
use crate::capture::CapturedFrame;
use crate::catalog::{CardRecord, CatalogStore};
use crate::config::AppConfig;
use crate::error::{EnhancementError, RecognitionError};
use crate::vision::{
    clean_ocr_text, detect_card_type, enhance_with_bounds, normalize_confidence, CanvasBounds, CardType, LocalOcr,
    TextRecognition, TextRecognizer,
};

/// Thresholds, timeouts and limits used by the arbitrator
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitratorConfig {
    pub remote_confidence_threshold: f32,
    pub local_confidence_threshold: f32,
    pub remote_cooldown: Duration,
    pub remote_timeout: Duration,
    pub local_timeout: Duration,
    pub health_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub fuzzy_min_similarity: f32,
    pub max_candidates: usize,
    pub canvas: CanvasBounds,
    pub prompt: String,
}

impl Default for ArbitratorConfig {
    fn default() -> Self {
        Self {
            remote_confidence_threshold: REMOTE_CONFIDENCE_THRESHOLD,
            local_confidence_threshold: LOCAL_CONFIDENCE_THRESHOLD,
            remote_cooldown: Duration::from_millis(REMOTE_COOLDOWN_MS),
            remote_timeout: Duration::from_millis(15_000),
            local_timeout: Duration::from_millis(10_000),
            health_timeout: Duration::from_millis(5_000),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 128,
            fuzzy_min_similarity: FUZZY_MIN_SIMILARITY,
            max_candidates: 5,
            canvas: CanvasBounds::default(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl From<&AppConfig> for ArbitratorConfig {
    fn from(config: &AppConfig) -> Self {
        let recognition = &config.recognition;
        Self {
            remote_confidence_threshold: recognition.remote_confidence_threshold,
            local_confidence_threshold: recognition.local_confidence_threshold,
            remote_cooldown: Duration::from_millis(recognition.remote_cooldown_ms),
            remote_timeout: Duration::from_millis(recognition.remote_timeout_ms),
            local_timeout: Duration::from_millis(recognition.local_timeout_ms),
            health_timeout: Duration::from_millis(recognition.health_timeout_ms),
            cache_ttl: Duration::from_secs(recognition.cache_ttl_secs),
            cache_capacity: recognition.cache_capacity,
            fuzzy_min_similarity: config.catalog.fuzzy_min_similarity,
            max_candidates: config.catalog.max_results,
            canvas: CanvasBounds {
                max_edge: config.enhancement.max_edge,
                min_edge: config.enhancement.min_edge,
            },
            prompt: config
                .remote
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        }
    }
}

/// Name the local path resolved to
struct LocalMatch {
    card_name: String,
    similarity: Option<f32>,
    card: Option<Arc<CardRecord>>,
}

/// Bookkeeping for one scan
struct ScanProgress {
    started: Instant,
    card_type: CardType,
    states: Vec<ScanState>,
    attempts: Vec<RecognitionAttempt>,
    /// Failures, including skipped paths that still explain a NoMatch
    failures: Vec<RecognitionError>,
}

impl ScanProgress {
    fn new(card_type: CardType) -> Self {
        Self {
            started: Instant::now(),
            card_type,
            states: vec![ScanState::Idle],
            attempts: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn enter(&mut self, state: ScanState) {
        debug!("Scan state -> {:?}", state);
        self.states.push(state);
    }

    fn record(&mut self, attempt: RecognitionAttempt) {
        if let Some(reason) = &attempt.failure_reason {
            self.failures.push(reason.clone());
        }
        self.attempts.push(attempt);
    }

    fn note(&mut self, reason: RecognitionError) {
        self.failures.push(reason);
    }

    fn resolve(mut self, outcome: RecognitionOutcome) -> RecognitionResult {
        self.enter(ScanState::Resolved);
        let processing_time_ms = millis(self.started.elapsed());

        match &outcome {
            RecognitionOutcome::Match {
                card_name,
                confidence,
                method,
                ..
            } => info!(
                "Recognized {:?} via {} ({:.0}) in {} ms",
                card_name, method, confidence, processing_time_ms
            ),
            RecognitionOutcome::NoMatch { reason, .. } => {
                info!("No match ({}) in {} ms: {}", reason.code(), processing_time_ms, reason)
            }
        }

        RecognitionResult {
            outcome,
            processing_time_ms,
            card_type: self.card_type,
            attempts: self.attempts,
            states: self.states,
        }
    }

    /// Resolve to NoMatch with the highest-priority failure as the reason
    fn resolve_no_match(mut self) -> RecognitionResult {
        self.failures.sort_by_key(RecognitionError::priority);
        let mut failures = std::mem::take(&mut self.failures).into_iter();
        let reason = failures.next().unwrap_or(RecognitionError::LocalNoText);

        let mut diagnostic = reason.to_string();
        let secondary: Vec<String> = failures.map(|f| f.to_string()).collect();
        if !secondary.is_empty() {
            diagnostic.push_str(" (also: ");
            diagnostic.push_str(&secondary.join("; "));
            diagnostic.push(')');
        }

        self.resolve(RecognitionOutcome::NoMatch { reason, diagnostic })
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Remote-versus-local recognition state machine
pub struct Arbitrator {
    config: ArbitratorConfig,
    catalog: Arc<CatalogStore>,
    recognizer: TextRecognizer,
    remote: Option<Arc<dyn RemoteVision>>,
    remote_available: AtomicBool,
    cooldown: CooldownGate,
    cache: RemoteCache,
    last_card_type: Mutex<Option<CardType>>,
}

impl Arbitrator {
    /// Arbitrator with only the local path
    pub fn new(config: ArbitratorConfig, catalog: Arc<CatalogStore>, local_ocr: Arc<dyn LocalOcr>) -> Self {
        let recognizer = TextRecognizer::new(local_ocr, config.local_confidence_threshold);
        let cooldown = CooldownGate::new(config.remote_cooldown);
        let cache = RemoteCache::new(config.cache_ttl, config.cache_capacity);
        Self {
            config,
            catalog,
            recognizer,
            remote: None,
            remote_available: AtomicBool::new(false),
            cooldown,
            cache,
            last_card_type: Mutex::new(None),
        }
    }

    /// Attach a remote capability, assumed available until a probe says otherwise
    pub fn with_remote(mut self, remote: Arc<dyn RemoteVision>) -> Self {
        info!("Remote vision capability: {}", remote.name());
        self.remote = Some(remote);
        self.remote_available.store(true, Ordering::Release);
        self
    }

    pub fn config(&self) -> &ArbitratorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn remote_available(&self) -> bool {
        self.remote.is_some() && self.remote_available.load(Ordering::Acquire)
    }

    /// Card type used by the most recent scan
    pub fn last_card_type(&self) -> Option<CardType> {
        *self.last_card_type.lock()
    }

    /// Time until the next remote call is allowed
    pub fn cooldown_remaining(&self) -> Duration {
        self.cooldown.remaining()
    }

    /// Probe the remote capability and update its availability flag
    ///
    /// This is the only place that marks the capability unavailable or
    /// available again.
    pub async fn probe_remote(&self) -> bool {
        let Some(remote) = &self.remote else {
            return false;
        };

        let healthy = match timeout(self.config.health_timeout, remote.health_check()).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(e)) => {
                warn!("Remote vision health probe failed: {:#}", e);
                false
            }
            Err(_) => {
                warn!(
                    "Remote vision health probe timed out after {} ms",
                    millis(self.config.health_timeout)
                );
                false
            }
        };

        let was_available = self.remote_available.swap(healthy, Ordering::AcqRel);
        if was_available != healthy {
            if healthy {
                info!("Remote vision {} is available again", remote.name());
            } else {
                warn!("Remote vision {} marked unavailable", remote.name());
            }
        }
        healthy
    }

    /// Identify the card in `frame`
    ///
    /// `card_type` selects the enhancement preset; when absent the type is
    /// detected from the frame. Never fails: every failure ends up as the
    /// reason of a `NoMatch` outcome.
    pub async fn scan(&self, frame: &CapturedFrame, card_type: Option<CardType>) -> RecognitionResult {
        let scan_id = Uuid::new_v4();
        self.run_scan(frame, card_type)
            .instrument(info_span!("scan", %scan_id))
            .await
    }

    async fn run_scan(&self, frame: &CapturedFrame, hint: Option<CardType>) -> RecognitionResult {
        let card_type = hint.unwrap_or_else(|| detect_card_type(frame));
        *self.last_card_type.lock() = Some(card_type);

        let mut scan = ScanProgress::new(card_type);
        debug!(
            "Scanning {}x{} frame as {} ({})",
            frame.width,
            frame.height,
            card_type,
            if hint.is_some() { "hint" } else { "detected" }
        );

        if !frame.is_valid() {
            scan.note(RecognitionError::InvalidFrame(format!(
                "{}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
            return scan.resolve_no_match();
        }

        let frame = Arc::new(frame.clone());

        if let Some(outcome) = self.attempt_remote(&frame, &mut scan).await {
            return scan.resolve(outcome);
        }
        if let Some(outcome) = self.attempt_local(&frame, card_type, &mut scan).await {
            return scan.resolve(outcome);
        }
        scan.resolve_no_match()
    }

    async fn attempt_remote(&self, frame: &Arc<CapturedFrame>, scan: &mut ScanProgress) -> Option<RecognitionOutcome> {
        let remote = self.remote.as_ref()?;

        if !self.remote_available.load(Ordering::Acquire) {
            debug!("Remote vision unavailable, skipping");
            scan.note(RecognitionError::RemoteUnavailable);
            return None;
        }

        let encoded = {
            let frame = Arc::clone(frame);
            tokio::task::spawn_blocking(move || frame.encode_jpeg()).await
        };
        let image_bytes = match encoded {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("Failed to encode frame for remote vision: {:#}", e);
                scan.note(RecognitionError::InvalidFrame(format!("{:#}", e)));
                return None;
            }
            Err(e) => {
                warn!("Frame encoding task failed: {}", e);
                scan.note(RecognitionError::InvalidFrame(e.to_string()));
                return None;
            }
        };

        let key = image_key(&image_bytes);
        if let Some(cached) = self.cache.get(&key) {
            scan.enter(ScanState::AttemptRemote);
            debug!("Remote vision cache hit for {}", &key[..12]);
            let mut attempt =
                RecognitionAttempt::succeeded(RecognitionMethod::RemoteVision, cached.card_name.clone(), cached.confidence, 0);
            attempt.cached = true;
            scan.record(attempt);
            return Some(self.remote_match(&cached));
        }

        if !self.cooldown.try_acquire() {
            debug!(
                "Remote vision cooling down ({} ms left), skipping",
                millis(self.cooldown.remaining())
            );
            return None;
        }

        scan.enter(ScanState::AttemptRemote);
        let started = Instant::now();
        let call = timeout(
            self.config.remote_timeout,
            remote.identify(&image_bytes, &self.config.prompt),
        )
        .await;
        let elapsed_ms = millis(started.elapsed());

        let response = match call {
            Ok(Ok(mut response)) => {
                response.confidence = normalize_confidence(response.confidence);
                response
            }
            Ok(Err(e)) => {
                warn!("Remote vision {} failed: {:#}", remote.name(), e);
                scan.record(RecognitionAttempt::failed(
                    RecognitionMethod::RemoteVision,
                    RecognitionError::RemoteTransport(format!("{:#}", e)),
                    String::new(),
                    0.0,
                    elapsed_ms,
                ));
                return None;
            }
            Err(_) => {
                let limit = millis(self.config.remote_timeout);
                warn!("Remote vision {} timed out after {} ms", remote.name(), limit);
                scan.record(RecognitionAttempt::failed(
                    RecognitionMethod::RemoteVision,
                    RecognitionError::RemoteTimeout(limit),
                    String::new(),
                    0.0,
                    elapsed_ms,
                ));
                return None;
            }
        };

        let confidence = response.confidence;
        match self.judge_remote(&response) {
            Ok(()) => {
                scan.record(RecognitionAttempt::succeeded(
                    RecognitionMethod::RemoteVision,
                    response.card_name.clone(),
                    confidence,
                    elapsed_ms,
                ));
                self.cache.insert(key, response.clone());
                Some(self.remote_match(&response))
            }
            Err(reason) => {
                debug!("Remote vision answer rejected: {}", reason);
                scan.record(RecognitionAttempt::failed(
                    RecognitionMethod::RemoteVision,
                    reason,
                    response.card_name.clone(),
                    confidence,
                    elapsed_ms,
                ));
                None
            }
        }
    }

    fn judge_remote(&self, response: &RemoteVisionResponse) -> Result<(), RecognitionError> {
        if !response.success || response.card_name.trim().is_empty() {
            let diagnostic = if response.diagnostic.trim().is_empty() {
                "no card name returned".to_string()
            } else {
                response.diagnostic.trim().to_string()
            };
            return Err(RecognitionError::RemoteUnclear(diagnostic));
        }

        let threshold = self.config.remote_confidence_threshold;
        if response.confidence < threshold {
            return Err(RecognitionError::RemoteUnclear(format!(
                "confidence {:.0} below {:.0}",
                response.confidence, threshold
            )));
        }
        Ok(())
    }

    /// Accepted remote answer, canonicalized against the catalog when possible
    fn remote_match(&self, response: &RemoteVisionResponse) -> RecognitionOutcome {
        let name = response.card_name.trim();
        let card = self.catalog.lookup_exact(name);
        RecognitionOutcome::Match {
            card_name: card.as_ref().map_or_else(|| name.to_string(), |c| c.name.clone()),
            confidence: response.confidence.clamp(0.0, 100.0),
            method: RecognitionMethod::RemoteVision,
            match_similarity: card.as_ref().map(|_| 1.0),
            card,
        }
    }

    async fn attempt_local(
        &self,
        frame: &Arc<CapturedFrame>,
        card_type: CardType,
        scan: &mut ScanProgress,
    ) -> Option<RecognitionOutcome> {
        scan.enter(ScanState::AttemptLocal);
        let started = Instant::now();

        let enhanced = match self.enhance_off_thread(frame, card_type).await {
            Ok(enhanced) => enhanced,
            Err(reason) => {
                warn!("Enhancement failed: {}", reason);
                scan.record(RecognitionAttempt::failed(
                    RecognitionMethod::LocalOcr,
                    reason,
                    String::new(),
                    0.0,
                    millis(started.elapsed()),
                ));
                return None;
            }
        };

        let recognition = match timeout(self.config.local_timeout, self.recognizer.recognize(&enhanced)).await {
            Ok(Ok(recognition)) => recognition,
            Ok(Err(e)) => {
                warn!("Local OCR {} failed: {:#}", self.recognizer.engine_name(), e);
                scan.record(RecognitionAttempt::failed(
                    RecognitionMethod::LocalOcr,
                    RecognitionError::LocalEngine(format!("{:#}", e)),
                    String::new(),
                    0.0,
                    millis(started.elapsed()),
                ));
                return None;
            }
            Err(_) => {
                let limit = millis(self.config.local_timeout);
                warn!("Local OCR timed out after {} ms", limit);
                scan.record(RecognitionAttempt::failed(
                    RecognitionMethod::LocalOcr,
                    RecognitionError::LocalTimeout(limit),
                    String::new(),
                    0.0,
                    millis(started.elapsed()),
                ));
                return None;
            }
        };

        let elapsed_ms = millis(started.elapsed());
        match self.resolve_local(&recognition) {
            Ok(local) => {
                scan.record(RecognitionAttempt::succeeded(
                    RecognitionMethod::LocalOcr,
                    recognition.text,
                    recognition.confidence,
                    elapsed_ms,
                ));
                Some(RecognitionOutcome::Match {
                    card_name: local.card_name,
                    confidence: recognition.confidence,
                    method: RecognitionMethod::LocalOcr,
                    match_similarity: local.similarity,
                    card: local.card,
                })
            }
            Err(reason) => {
                debug!("Local reading rejected: {}", reason);
                scan.record(RecognitionAttempt::failed(
                    RecognitionMethod::LocalOcr,
                    reason,
                    recognition.text,
                    recognition.confidence,
                    elapsed_ms,
                ));
                None
            }
        }
    }

    async fn enhance_off_thread(
        &self,
        frame: &Arc<CapturedFrame>,
        card_type: CardType,
    ) -> Result<CapturedFrame, RecognitionError> {
        let frame = Arc::clone(frame);
        let profile = card_type.profile();
        let canvas = self.config.canvas;

        match tokio::task::spawn_blocking(move || enhance_with_bounds(&frame, profile, canvas)).await {
            Ok(Ok(enhanced)) => Ok(enhanced),
            Ok(Err(EnhancementError::InvalidFrame(reason))) => Err(RecognitionError::InvalidFrame(reason)),
            Ok(Err(e)) => Err(RecognitionError::LocalEngine(e.to_string())),
            Err(e) => Err(RecognitionError::LocalEngine(format!("enhancement task failed: {}", e))),
        }
    }

    /// Turn an OCR reading into a card name
    ///
    /// Requires the local confidence threshold and a resolved name: the best
    /// fuzzy candidate when a catalog is loaded, the cleaned text otherwise.
    fn resolve_local(&self, recognition: &TextRecognition) -> Result<LocalMatch, RecognitionError> {
        if recognition.text.trim().is_empty() {
            return Err(RecognitionError::LocalNoText);
        }
        if recognition.confidence < self.config.local_confidence_threshold {
            return Err(RecognitionError::LocalLowConfidence {
                confidence: recognition.confidence,
            });
        }
        let cleaned = clean_ocr_text(&recognition.text).ok_or(RecognitionError::LocalNoText)?;

        let Some(index) = self.catalog.snapshot() else {
            debug!("No catalog loaded, using OCR text {:?} as is", cleaned.display);
            return Ok(LocalMatch {
                card_name: cleaned.display,
                similarity: None,
                card: None,
            });
        };

        let candidates = index.fuzzy_search(
            &cleaned.key,
            self.config.max_candidates,
            self.config.fuzzy_min_similarity,
            true,
        );
        for candidate in &candidates {
            debug!(
                "Candidate {:?} similarity {:.3} ({:?})",
                candidate.card.name, candidate.similarity, candidate.match_type
            );
        }

        candidates
            .into_iter()
            .next()
            .map(|best| LocalMatch {
                card_name: best.card.name.clone(),
                similarity: Some(best.similarity),
                card: Some(best.card),
            })
            .ok_or(RecognitionError::NoCatalogMatch(cleaned.display))
    }
}
