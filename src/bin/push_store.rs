//! Import round sheets into the SQLite store.
//!
//! Phases: load sheets, validate, write. Validation problems abort the push
//! unless `--force` is given.

use anyhow::{bail, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use songmatch::models::{Round, ValidationReport};
use songmatch::progress::{format_duration, set_log_only, Phase};
use songmatch::safety::validate_store_path;
use songmatch::sheet::{load_sheet_file, sheet_paths};
use songmatch::store::{ImportSummary, LikeStore, Store};
use songmatch::validate::validate_rounds;

#[derive(Parser)]
#[command(name = "push-store")]
#[command(about = "Import round sheets into the SQLite store")]
struct Args {
    /// Round sheet, or directory of sheets
    sheets: PathBuf,

    /// Store database to (re)write
    output: PathBuf,

    /// Only validate the sheets, do not write
    #[arg(long)]
    validate_only: bool,

    /// Show what would be written without touching the store
    #[arg(long)]
    dry_run: bool,

    /// Push even if validation finds lost songs
    #[arg(long)]
    force: bool,

    /// Likes exported as a JSON object of song name to count
    #[arg(long)]
    migrate_likes: Option<PathBuf>,

    #[arg(long, default_value = "0")]
    workers: usize,

    #[arg(long)]
    log_only: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn load_sheets(args: &Args) -> Result<Vec<Round>> {
    let paths = sheet_paths(&args.sheets)
        .with_context(|| format!("Failed to list sheets at {}", args.sheets.display()))?;
    let phase = Phase::counted("Phase 1: Loading sheets", paths.len() as u64);

    let rounds = paths
        .par_iter()
        .map(|path| -> Result<Round> {
            let round = load_sheet_file(path)
                .with_context(|| format!("Failed to parse {}", path.display()))?
                .to_round();
            phase.advance(10);
            Ok(round)
        })
        .collect::<Result<Vec<Round>>>()?;

    phase.finish(&format!("loaded {} rounds", rounds.len()));
    Ok(rounds)
}

fn print_validation_summary(report: &ValidationReport) {
    println!("\n{:=<60}", "");
    println!("VALIDATION");
    println!("{:=<60}", "");
    println!("  Columns:         {}", report.columns_total);
    println!("  Columns OK:      {}", report.columns_ok);
    println!("  Columns skipped: {}", report.columns_skipped);
    println!("  Songs indexed:   {}", report.songs_indexed);
    println!("  Songs skipped:   {}", report.songs_skipped);
    for round in &report.rounds {
        for skipped in &round.skipped {
            println!(
                "  [!] {} column {}: empty seed, {} songs lost",
                round.round,
                skipped.column_letter,
                skipped.lost_songs.len()
            );
        }
    }
}

fn read_likes_export(path: &Path) -> Result<BTreeMap<String, u64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read likes export {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid likes export {}", path.display()))
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("songmatch=debug,info")
    } else {
        EnvFilter::new("songmatch=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    validate_store_path(&args.output, &[args.sheets.as_path()])?;

    let start = Instant::now();
    let rounds = load_sheets(&args)?;

    // Phase 2
    let report = validate_rounds(&rounds);
    print_validation_summary(&report);

    if args.validate_only {
        if report.has_lost_songs() {
            println!("\n[!] Validation found issues");
            return Ok(ExitCode::FAILURE);
        }
        println!("\n[OK] Validation passed!");
        return Ok(ExitCode::SUCCESS);
    }

    if report.has_lost_songs() {
        if !args.force {
            println!("\n[!] Validation found issues. Use --force to push anyway.");
            return Ok(ExitCode::FAILURE);
        }
        warn!(songs_skipped = report.songs_skipped, "pushing despite lost songs");
    }

    let likes = args
        .migrate_likes
        .as_ref()
        .map(|path| read_likes_export(path))
        .transpose()?;

    if args.dry_run {
        let preview = ImportSummary::preview(&rounds);
        println!("\n{:=<60}", "");
        println!("DRY RUN - would write:");
        println!("{:=<60}", "");
        println!("  {} runden", preview.rounds);
        println!("  {} clusters", preview.clusters);
        println!("  {} songs", preview.songs);
        if let Some(likes) = &likes {
            println!("  {} likes", likes.len());
        }
        println!("\nNo changes made.");
        return Ok(ExitCode::SUCCESS);
    }

    if args.output.is_dir() {
        bail!("Output {} is a directory", args.output.display());
    }

    // Phase 3
    let phase = Phase::open("Phase 3: Writing store");
    let mut store = Store::create(&args.output)
        .with_context(|| format!("Failed to open store {}", args.output.display()))?;
    let summary = store.replace_rounds(&rounds)?;
    drop(store);
    phase.finish(&format!("wrote {} songs", summary.songs));

    if let Some(likes) = &likes {
        let migrated = LikeStore::open(&args.output)?.import(likes)?;
        info!(migrated, "likes migrated");
        println!("  Migrated {} likes", migrated);
    }

    let file_size = std::fs::metadata(&args.output)?.len();
    println!("\n{:=<60}", "");
    println!("Import complete!");
    println!("  Rounds:   {}", summary.rounds);
    println!("  Clusters: {}", summary.clusters);
    println!("  Songs:    {}", summary.songs);
    println!("  Output size: {:.2} MB", file_size as f64 / 1_048_576.0);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(ExitCode::SUCCESS)
}
