//! Bulk catalog files
//!
//! Reads a JSON array of card objects (Scryfall "default cards" bulk data or a
//! list in the same shape), or an object wrapping that array under `data`.
//! Objects that do not describe a card are skipped with a warning instead of
//! failing the whole load.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::catalog::CardRecord;

#[derive(Deserialize)]
#[serde(untagged)]
enum BulkFile {
    List(Vec<serde_json::Value>),
    Wrapped { data: Vec<serde_json::Value> },
}

/// Parse bulk card JSON into records
pub fn parse_catalog(json: &str) -> Result<Vec<CardRecord>> {
    let bulk: BulkFile = serde_json::from_str(json).context("Catalog is not a JSON array of cards")?;
    let values = match bulk {
        BulkFile::List(values) | BulkFile::Wrapped { data: values } => values,
    };

    let total = values.len();
    let mut records = Vec::with_capacity(total);
    let mut skipped = 0usize;

    for (position, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<CardRecord>(value) {
            Ok(record) if !record.name.trim().is_empty() => records.push(record),
            Ok(_) => skipped += 1,
            Err(e) => {
                if skipped < 5 {
                    warn!("Skipping catalog entry {}: {}", position, e);
                }
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} of {} catalog entries", skipped, total);
    }
    Ok(records)
}

/// Load bulk card data from a file
pub fn load_catalog_file(path: &Path) -> Result<Vec<CardRecord>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let records = parse_catalog(&content).with_context(|| format!("Failed to parse catalog {}", path.display()))?;
    info!("Loaded {} card records from {:?}", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SCRYFALL_SAMPLE: &str = r#"[
        {
            "object": "card",
            "id": "b0faa7f2-b547-42c4-a810-839da50dadfe",
            "name": "Black Lotus",
            "set": "lea",
            "collector_number": "232",
            "rarity": "rare",
            "type_line": "Artifact",
            "mana_cost": "{0}",
            "colors": [],
            "prices": {"usd": "27500.00", "usd_foil": null, "eur": null, "tix": null},
            "image_uris": {"normal": "https://cards.scryfall.io/normal/front/b/0/b0fa.jpg"},
            "oracle_text": "{T}, Sacrifice Black Lotus: Add three mana of any one color."
        },
        {
            "id": "c8bd3d2f-0001",
            "name": "Lightning Bolt",
            "set": "lea",
            "collector_number": "161",
            "colors": ["R"],
            "prices": {"usd": 450.5}
        },
        {"object": "error", "details": "not a card"},
        {"id": "blank", "name": "  "}
    ]"#;

    #[test]
    fn test_parse_scryfall_records() {
        let records = parse_catalog(SCRYFALL_SAMPLE).unwrap();
        assert_eq!(records.len(), 2);

        let lotus = &records[0];
        assert_eq!(lotus.name, "Black Lotus");
        assert_eq!(lotus.set_code, "lea");
        assert_eq!(lotus.collector_number, "232");
        assert_eq!(lotus.mana_cost.as_deref(), Some("{0}"));
        assert_eq!(lotus.price_snapshot.usd, Some(27500.0));
        assert_eq!(lotus.price_snapshot.usd_foil, None);
        assert!(lotus.image_refs.contains_key("normal"));

        let bolt = &records[1];
        assert!(bolt.colors.contains("R"));
        assert_eq!(bolt.price_snapshot.usd, Some(450.5));
        assert_eq!(bolt.rarity, "");
    }

    #[test]
    fn test_parse_wrapped_list() {
        let records = parse_catalog(r#"{"data": [{"id": "1", "name": "Island"}]}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Island");
    }

    #[test]
    fn test_parse_rejects_non_list() {
        assert!(parse_catalog(r#"{"name": "Island"}"#).is_err());
        assert!(parse_catalog("not json").is_err());
    }

    #[test]
    fn test_load_catalog_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", SCRYFALL_SAMPLE).unwrap();

        let records = load_catalog_file(file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_load_catalog_file_missing() {
        assert!(load_catalog_file(Path::new("/nonexistent/cards.json")).is_err());
    }
}
