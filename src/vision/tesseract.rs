//! Tesseract CLI backend
//!
//! Pipes encoded image bytes into the `tesseract` executable and parses its TSV
//! output. The child process is killed if the call is dropped (e.g. on
//! timeout).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::ocr::{LocalOcr, OcrOutput};

/// TSV `level` value of word rows
const WORD_LEVEL: &str = "5";

/// Local OCR through the tesseract command-line tool
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(binary: &str, language: &str) -> Self {
        info!("Using tesseract OCR at {:?} (language {})", binary, language);
        Self {
            binary: binary.to_string(),
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl LocalOcr for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image_bytes: &[u8], whitelist: &str, single_line: bool) -> Result<OcrOutput> {
        // psm 7: single text line, psm 6: uniform block of text
        let page_mode = if single_line { "7" } else { "6" };
        let whitelist_arg = format!("tessedit_char_whitelist={}", whitelist);

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language, "--psm", page_mode, "-c", &whitelist_arg, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.binary))?;

        let mut stdin = child.stdin.take().context("tesseract stdin unavailable")?;
        stdin
            .write_all(image_bytes)
            .await
            .context("Failed to send image to tesseract")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to read tesseract output")?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let result = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!("tesseract (psm {}): {:?} ({:.1})", page_mode, result.text, result.confidence);
        Ok(result)
    }
}

/// Join recognized words by line and average their confidences
///
/// Rows with negative or non-finite confidence (layout rows, empty words) are ignored.
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut lines: Vec<((u32, u32, u32), Vec<String>)> = Vec::new();
    let mut confidence_sum = 0.0f32;
    let mut words = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != WORD_LEVEL {
            continue;
        }

        let confidence: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if !confidence.is_finite() || confidence < 0.0 || text.is_empty() {
            continue;
        }

        let key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        match lines.last_mut() {
            Some((last_key, line_words)) if *last_key == key => line_words.push(text.to_string()),
            _ => lines.push((key, vec![text.to_string()])),
        }

        confidence_sum += confidence;
        words += 1;
    }

    let text = lines
        .iter()
        .map(|(_, line_words)| line_words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    OcrOutput {
        text,
        confidence: if words > 0 { confidence_sum / words as f32 } else { 0.0 },
    }
}
