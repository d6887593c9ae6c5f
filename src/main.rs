//! card-scanner - identify trading cards from photos
//!
//! Runs the recognition pipeline on image files and exposes the offline card
//! catalog for manual lookups.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use card_scanner::capture::CapturedFrame;
use card_scanner::catalog::{CardRecord, SearchField};
use card_scanner::config::{self, AppConfig};
use card_scanner::recognition::{RecognitionOutcome, RecognitionResult};
use card_scanner::scanner::CardScanner;
use card_scanner::storage;
use card_scanner::vision::CardType;

/// Trading card recognition from photos
#[derive(Parser, Debug)]
#[command(name = "card-scanner")]
#[command(about = "Identify trading cards from photos using remote vision, local OCR and a fuzzy card catalog")]
struct Args {
    /// Bulk card data (JSON array); overrides the configured path
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Config file (default: config.toml in the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the card in an image file
    Scan {
        image: PathBuf,
        /// Enhancement preset (foil, old_card, borderless, dark, low_contrast, standard); detected when omitted
        #[arg(long)]
        card_type: Option<CardType>,
    },
    /// Look a card up by exact name, id, or set/number
    Lookup { name_or_id: String },
    /// Substring search over one card field
    Search {
        query: String,
        #[arg(long, value_enum, default_value_t = SearchField::Name)]
        field: SearchField,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Match the whole field instead of a substring
        #[arg(long)]
        exact: bool,
    },
    /// Similarity-ranked name search
    Fuzzy {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Defaults to the configured minimum
        #[arg(long)]
        min_similarity: Option<f32>,
    },
    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::default_config_path()?,
    };

    if let Command::Config { init } = &args.command {
        return run_config(&config_path, *init);
    }

    let config = load_or_create_config(&config_path, args.config.is_some())?;
    let scanner = CardScanner::from_config(&config)?;

    let catalog_required = !matches!(args.command, Command::Scan { .. });
    match load_catalog(args.catalog.as_deref(), &config)? {
        Some(records) => {
            scanner.refresh_catalog(records)?;
        }
        None if catalog_required => bail!("No catalog found; pass --catalog <cards.json> or set catalog.bulk_data_path"),
        None => warn!("No catalog loaded, OCR text will be reported as read"),
    }

    match args.command {
        Command::Scan { image, card_type } => run_scan(&scanner, &image, card_type).await,
        Command::Lookup { name_or_id } => {
            match scanner.lookup(&name_or_id) {
                Some(card) => print_card(&card),
                None => println!("No card matches {:?}", name_or_id),
            }
            Ok(())
        }
        Command::Search {
            query,
            field,
            limit,
            exact,
        } => {
            let cards = scanner.text_search(&query, field, limit, exact);
            for card in &cards {
                println!("{:<40} {:>6} #{:<6} {}", card.name, card.set_code, card.collector_number, card.id);
            }
            println!("{} result(s)", cards.len());
            Ok(())
        }
        Command::Fuzzy {
            query,
            limit,
            min_similarity,
        } => {
            let min_similarity = min_similarity.unwrap_or(config.catalog.fuzzy_min_similarity);
            let candidates = scanner
                .catalog()
                .fuzzy_search(&query, limit, min_similarity, true);
            for candidate in &candidates {
                println!(
                    "{:.3}  {:<7} {}",
                    candidate.similarity,
                    format!("{:?}", candidate.match_type).to_lowercase(),
                    candidate.card.name
                );
            }
            if candidates.is_empty() {
                println!("No card resembles {:?}", query);
            }
            Ok(())
        }
        Command::Config { .. } => Ok(()),
    }
}

/// Load configuration from file or fall back to defaults
///
/// An explicitly given file must exist and parse.
fn load_or_create_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if explicit || path.exists() {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn run_config(path: &Path, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            bail!("Config file {} already exists", path.display());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        config::save_config(&AppConfig::default(), path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = load_or_create_config(path, false)?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Records from `--catalog`, the configured path, or the default data file
fn load_catalog(cli_path: Option<&Path>, config: &AppConfig) -> Result<Option<Vec<CardRecord>>> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| config.catalog.bulk_data_path.clone());

    let path = match explicit {
        Some(path) => path,
        None => {
            let default = storage::default_catalog_path()?;
            if !default.exists() {
                return Ok(None);
            }
            default
        }
    };

    storage::load_catalog_file(&path).map(Some)
}

async fn run_scan(scanner: &CardScanner, image: &Path, card_type: Option<CardType>) -> Result<()> {
    let frame = CapturedFrame::open(image)?;
    info!("Scanning {:?} ({}x{})", image, frame.width, frame.height);

    if scanner.arbitrator().has_remote() && !scanner.probe_remote().await {
        warn!("Remote vision unavailable, using local OCR only");
    }

    let result = scanner.scan(&frame, card_type).await;
    print_result(&result);
    Ok(())
}

fn print_result(result: &RecognitionResult) {
    match &result.outcome {
        RecognitionOutcome::Match {
            card_name,
            confidence,
            method,
            match_similarity,
            card,
        } => {
            println!("Card:        {}", card_name);
            println!("Method:      {}", method);
            println!("Confidence:  {:.0}", confidence);
            if let Some(similarity) = match_similarity {
                println!("Similarity:  {:.3}", similarity);
            }
            if let Some(card) = card {
                println!("Printing:    {} #{} ({})", card.set_code, card.collector_number, card.id);
                if let Some(usd) = card.price_snapshot.usd {
                    println!("Price:       ${:.2}", usd);
                }
            }
        }
        RecognitionOutcome::NoMatch { reason, diagnostic } => {
            println!("No match:    {}", reason.code());
            println!("Diagnostic:  {}", diagnostic);
        }
    }
    println!("Card type:   {}", result.card_type);
    println!("Time:        {} ms", result.processing_time_ms);

    for attempt in &result.attempts {
        let status = match &attempt.failure_reason {
            None if attempt.cached => "ok (cached)".to_string(),
            None => "ok".to_string(),
            Some(reason) => reason.code().to_string(),
        };
        println!(
            "  {:<14} {:<20} {:>5.1} {:>6} ms  {:?}",
            attempt.method.to_string(),
            status,
            attempt.confidence,
            attempt.elapsed_ms,
            attempt.raw_text
        );
    }
}

fn print_card(card: &CardRecord) {
    println!("Name:        {}", card.name);
    println!("Id:          {}", card.id);
    println!("Set:         {} #{}", card.set_code, card.collector_number);
    if !card.rarity.is_empty() {
        println!("Rarity:      {}", card.rarity);
    }
    if !card.type_line.is_empty() {
        println!("Type:        {}", card.type_line);
    }
    if let Some(cost) = &card.mana_cost {
        println!("Mana cost:   {}", cost);
    }
    if let Some(text) = &card.oracle_text {
        println!("Text:        {}", text);
    }
    if let Some(usd) = card.price_snapshot.usd {
        println!("Price:       ${:.2}", usd);
    }
}
