//! Application Configuration
//!
//! Recognition thresholds, catalog, enhancement and backend settings stored in
//! TOML format. Missing sections and keys fall back to their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::recognition::{FUZZY_MIN_SIMILARITY, LOCAL_CONFIDENCE_THRESHOLD, REMOTE_CONFIDENCE_THRESHOLD, REMOTE_COOLDOWN_MS};
use crate::vision::enhance::{DEFAULT_MAX_EDGE, DEFAULT_MIN_EDGE};

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Arbitration thresholds, timeouts and cache
    pub recognition: RecognitionConfig,
    /// Catalog source and fuzzy matching
    pub catalog: CatalogConfig,
    /// OCR canvas size
    pub enhancement: EnhancementConfig,
    /// Remote vision service
    pub remote: RemoteConfig,
    /// Local OCR engine
    pub ocr: OcrConfig,
}

/// Arbitration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Remote answers below this confidence are discarded
    pub remote_confidence_threshold: f32,
    /// Local answers below this confidence are rejected
    pub local_confidence_threshold: f32,
    /// Minimum interval between remote calls
    pub remote_cooldown_ms: u64,
    pub remote_timeout_ms: u64,
    pub local_timeout_ms: u64,
    pub health_timeout_ms: u64,
    /// How long an accepted remote answer is reused for the same image
    pub cache_ttl_secs: u64,
    /// Cached remote answers kept at most (0 disables the cache)
    pub cache_capacity: usize,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            remote_confidence_threshold: REMOTE_CONFIDENCE_THRESHOLD,
            local_confidence_threshold: LOCAL_CONFIDENCE_THRESHOLD,
            remote_cooldown_ms: REMOTE_COOLDOWN_MS,
            remote_timeout_ms: 15_000,
            local_timeout_ms: 10_000,
            health_timeout_ms: 5_000,
            cache_ttl_secs: 300,
            cache_capacity: 128,
        }
    }
}

/// Catalog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Candidates below this similarity are dropped
    pub fuzzy_min_similarity: f32,
    /// Maximum fuzzy candidates considered per reading
    pub max_results: usize,
    /// Bulk card data (JSON array) loaded at startup
    pub bulk_data_path: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            fuzzy_min_similarity: FUZZY_MIN_SIMILARITY,
            max_results: 5,
            bulk_data_path: None,
        }
    }
}

/// Enhancement canvas settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Longest edge after normalization
    pub max_edge: u32,
    /// Shortest edge after normalization
    pub min_edge: u32,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_EDGE,
            min_edge: DEFAULT_MIN_EDGE,
        }
    }
}

/// Remote vision settings; no endpoint means local recognition only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token
    pub api_key_env: Option<String>,
    /// Replaces the built-in identification prompt
    pub prompt: Option<String>,
}

/// Local OCR settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract executable (name on PATH or full path)
    pub tesseract_path: String,
    /// Tesseract language code
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: AppConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write config {}", path.display()))?;
    Ok(())
}
