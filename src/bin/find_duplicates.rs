//! Report songs recorded under more than one spelling.
//!
//! Exits non-zero when any identity has several variants, so the check can
//! gate an import.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use songmatch::models::DuplicateEntry;
use songmatch::sheet::load_rounds;
use songmatch::validate::find_duplicates;
use songmatch::SongIndex;

/// Locations listed per identity in text output.
const LOCATION_PREVIEW: usize = 3;

#[derive(Parser)]
#[command(name = "find-duplicates")]
#[command(about = "List songs that appear under several spellings")]
struct Args {
    /// Round sheet, or directory of sheets
    #[arg(env = "SONGMATCH_SHEETS")]
    sheets: PathBuf,

    /// Emit JSON instead of the text report
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    total_songs: usize,
    unique_songs: usize,
    songs_with_variants: usize,
    duplicates: &'a [DuplicateEntry],
}

fn print_report(report: &Report<'_>) {
    println!("{:=<60}", "");
    println!("DUPLICATE SONG REPORT");
    println!("{:=<60}", "");

    if !report.duplicates.is_empty() {
        println!("Found {} songs with multiple spellings:\n", report.songs_with_variants);
    }
    for (i, dup) in report.duplicates.iter().enumerate() {
        println!("{}. \"{}\" ({} variants):", i + 1, dup.normalized, dup.variants.len());
        for variant in &dup.variants {
            println!("   - \"{}\"", variant);
        }

        let unique: BTreeSet<&str> = dup.locations.iter().map(String::as_str).collect();
        let shown: Vec<&str> = unique.iter().take(LOCATION_PREVIEW).copied().collect();
        if unique.len() > shown.len() {
            println!(
                "   Locations: {} ... (+{} more)",
                shown.join("; "),
                unique.len() - shown.len()
            );
        } else {
            println!("   Locations: {}", shown.join("; "));
        }
        println!();
    }

    println!("{:=<60}", "");
    println!("  Total song entries:                 {}", report.total_songs);
    println!("  Unique songs (after normalization): {}", report.unique_songs);
    println!("  Songs with multiple spellings:      {}", report.songs_with_variants);
    if report.duplicates.is_empty() {
        println!("\n[OK] No duplicate spellings found!");
    } else {
        println!("\n[!] Consider standardizing these spellings in the sheets.");
    }
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

    let rounds = load_rounds(&args.sheets)
        .with_context(|| format!("Failed to load sheets from {}", args.sheets.display()))?;
    let index = SongIndex::build(&rounds);
    let duplicates = find_duplicates(&index);

    let report = Report {
        total_songs: index.entries().map(|e| e.count()).sum(),
        unique_songs: index.len(),
        songs_with_variants: duplicates.len(),
        duplicates: &duplicates,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(if duplicates.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
