use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use songmatch::index::{
    all_contributors, all_songs, contributor_songs, suggest_contributors, IndexEntry,
    DEFAULT_TOP_LIMIT,
};
use songmatch::models::{ContributionKind, ContributorSong, TopSong, ValidationReport};
use songmatch::progress::{set_log_only, Phase};
use songmatch::scoring::DEFAULT_THRESHOLD;
use songmatch::sheet;
use songmatch::store::{LikeStore, Store};
use songmatch::validate::validate_rounds;
use songmatch::{search_clusters, ClusterResult, IndexHandle, Round, SongIndex, Threshold};

/// How many contributor suggestions to offer for an unknown name.
const MAX_SUGGESTIONS: usize = 3;

/// How many lost songs to list per skipped column in text output.
const LOST_SONGS_PREVIEW: usize = 5;

#[derive(Parser)]
#[command(name = "songmatch")]
#[command(version)]
#[command(about = "Search the archive of song-matching game rounds")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Hide progress spinners (tail-friendly output)
    #[arg(long, global = true)]
    log_only: bool,

    /// Round sheet, or directory of sheets (one file per round)
    #[arg(long, global = true, env = "SONGMATCH_SHEETS")]
    sheets: Option<PathBuf>,

    /// SQLite store written by push-store
    #[arg(long, global = true, env = "SONGMATCH_STORE")]
    store: Option<PathBuf>,

    /// SQLite database for like counters (defaults to --store)
    #[arg(long, global = true, env = "SONGMATCH_LIKES")]
    likes: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Fuzzy search for a song
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Minimum similarity score (0-100)
        #[arg(short, long, default_value_t = DEFAULT_THRESHOLD,
              value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: u8,
    },

    /// Every cluster containing a song
    Connections {
        #[arg(required = true, num_args = 1..)]
        song: Vec<String>,
    },

    /// Most frequently submitted songs
    Top {
        #[arg(short, long, default_value_t = DEFAULT_TOP_LIMIT)]
        limit: usize,
    },

    /// List all contributors
    Contributors,

    /// Songs brought by one contributor
    Contributor { name: String },

    /// List every indexed song
    Songs,

    /// Like a song
    Like {
        #[arg(required = true, num_args = 1..)]
        song: Vec<String>,
    },

    /// Show like counts
    Likes,

    /// Report columns and songs the index would skip
    Validate,
}

// ============================================================================
// Data Sources
// ============================================================================

enum DataSource {
    Sheets(PathBuf),
    Store(PathBuf),
}

impl DataSource {
    fn resolve(cli: &Cli) -> Result<Self> {
        match (&cli.sheets, &cli.store) {
            (Some(_), Some(_)) => bail!("Use either --sheets or --store, not both"),
            (Some(path), None) => Ok(Self::Sheets(path.clone())),
            (None, Some(path)) => Ok(Self::Store(path.clone())),
            (None, None) => bail!("No data source: pass --sheets or --store"),
        }
    }

    fn load(&self) -> songmatch::Result<Vec<Round>> {
        match self {
            Self::Sheets(path) => sheet::load_rounds(path),
            Self::Store(path) => Store::open(path)?.load_rounds(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Sheets(path) => format!("sheets at {}", path.display()),
            Self::Store(path) => format!("store {}", path.display()),
        }
    }
}

fn load_rounds(cli: &Cli) -> Result<Vec<Round>> {
    let source = DataSource::resolve(cli)?;
    let phase = Phase::open("Loading rounds");
    let rounds = source
        .load()
        .with_context(|| format!("Failed to load {}", source.describe()))?;
    phase.clear();
    info!(rounds = rounds.len(), source = %source.describe(), "rounds loaded");
    Ok(rounds)
}

/// Build the index through the handle so a failed load publishes nothing.
fn load_index(rounds: Vec<Round>) -> Result<std::sync::Arc<SongIndex>> {
    let handle = IndexHandle::default();
    handle.rebuild(move || Ok(rounds))?;
    Ok(handle.snapshot())
}

fn likes_path(cli: &Cli) -> Option<PathBuf> {
    cli.likes.clone().or_else(|| cli.store.clone())
}

fn open_likes(cli: &Cli) -> Result<Option<LikeStore>> {
    likes_path(cli)
        .map(|path| {
            LikeStore::open(&path)
                .with_context(|| format!("Failed to open likes database {}", path.display()))
        })
        .transpose()
}

fn like_counts<'a>(
    likes: Option<&LikeStore>,
    names: impl Iterator<Item = &'a str>,
) -> Result<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    if let Some(likes) = likes {
        for name in names {
            let count = likes.count(name)?;
            if count > 0 {
                counts.insert(name.to_string(), count);
            }
        }
    }
    Ok(counts)
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn variants_note(count: usize) -> String {
    if count > 1 {
        format!("  [{} spelling variants]", count)
    } else {
        String::new()
    }
}

fn likes_note(likes: &BTreeMap<String, u64>, name: &str) -> String {
    match likes.get(name) {
        Some(n) => format!("  ({} likes)", n),
        None => String::new(),
    }
}

fn print_cluster_results(results: &[ClusterResult], likes: &BTreeMap<String, u64>) {
    for result in results {
        println!("\n{}  [best {}]", result.round_display, result.best_score());
        for (i, song) in result.songs.iter().enumerate() {
            let contributor = song
                .contributor
                .as_deref()
                .map(|c| format!(" ({})", c))
                .unwrap_or_default();
            let seed = if i == 0 { "Seed: " } else { "" };
            let hit = result
                .hits
                .iter()
                .find(|h| h.variants.iter().any(|v| v == &song.song));
            match hit {
                Some(h) => println!(
                    "  * {}{}{}  {}{}{}",
                    seed,
                    song.song,
                    contributor,
                    h.score,
                    variants_note(h.variants.len()),
                    likes_note(likes, &h.name)
                ),
                None => println!("    {}{}{}", seed, song.song, contributor),
            }
        }
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    threshold: u8,
    results: &'a [ClusterResult],
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    likes: BTreeMap<String, u64>,
}

#[derive(Serialize)]
struct ContributorOutput<'a> {
    contributor: &'a str,
    songs: &'a [ContributorSong],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<String>,
}

// ============================================================================
// Commands
// ============================================================================

fn run_search(cli: &Cli, query: &str, threshold: u8) -> Result<()> {
    let threshold = Threshold::new(u32::from(threshold))?;
    let index = load_index(load_rounds(cli)?)?;
    let results = search_clusters(query, &index, threshold);
    let likes = open_likes(cli)?;
    let counts = like_counts(
        likes.as_ref(),
        results.iter().flat_map(|r| r.hits.iter().map(|h| h.name.as_str())),
    )?;

    if cli.format == OutputFormat::Json {
        return print_json(&SearchOutput {
            query,
            threshold: threshold.value(),
            results: &results,
            likes: counts,
        });
    }

    if results.is_empty() {
        println!("No results for \"{}\"", query);
        return Ok(());
    }
    println!("{} clusters match \"{}\"", results.len(), query);
    print_cluster_results(&results, &counts);
    Ok(())
}

fn run_connections(cli: &Cli, song: &str) -> Result<()> {
    let index = load_index(load_rounds(cli)?)?;
    let results = index.connections(song);

    if cli.format == OutputFormat::Json {
        return print_json(&results);
    }
    if results.is_empty() {
        println!("\"{}\" does not appear in any round", song);
        return Ok(());
    }
    println!("\"{}\" appears in {} clusters", song, results.len());
    print_cluster_results(&results, &BTreeMap::new());
    Ok(())
}

fn run_top(cli: &Cli, limit: usize) -> Result<()> {
    let index = load_index(load_rounds(cli)?)?;
    let top: Vec<TopSong> = index.top_songs(limit);
    let likes = open_likes(cli)?;
    let counts = like_counts(likes.as_ref(), top.iter().map(|t| t.name.as_str()))?;

    if cli.format == OutputFormat::Json {
        return print_json(&top);
    }
    for (rank, song) in top.iter().enumerate() {
        println!(
            "{:>3}. {}  {}x{}{}",
            rank + 1,
            song.name,
            song.count,
            variants_note(song.variants.len()),
            likes_note(&counts, &song.name)
        );
    }
    Ok(())
}

fn run_contributors(cli: &Cli) -> Result<()> {
    let names = all_contributors(&load_rounds(cli)?);
    if cli.format == OutputFormat::Json {
        return print_json(&names);
    }
    for name in &names {
        println!("{}", name);
    }
    Ok(())
}

fn run_contributor(cli: &Cli, name: &str) -> Result<()> {
    let rounds = load_rounds(cli)?;
    let songs = contributor_songs(&rounds, name);
    let suggestions = if songs.is_empty() {
        suggest_contributors(&rounds, name, MAX_SUGGESTIONS)
    } else {
        Vec::new()
    };

    if cli.format == OutputFormat::Json {
        return print_json(&ContributorOutput {
            contributor: name,
            songs: &songs,
            suggestions,
        });
    }

    if songs.is_empty() {
        println!("No songs by \"{}\"", name);
        if !suggestions.is_empty() {
            println!("Did you mean: {}?", suggestions.join(", "));
        }
        return Ok(());
    }

    println!("{} songs by {}", songs.len(), name);
    for s in &songs {
        let kind = match s.kind {
            ContributionKind::Seed => "seed ",
            ContributionKind::Match => "match",
        };
        println!("  [{}] {}  ({})", kind, s.song, s.round_display);
    }
    Ok(())
}

fn run_songs(cli: &Cli) -> Result<()> {
    let songs = all_songs(&load_rounds(cli)?);
    if cli.format == OutputFormat::Json {
        return print_json(&songs);
    }
    for song in &songs {
        println!("{}", song);
    }
    Ok(())
}

fn run_like(cli: &Cli, song: &str) -> Result<()> {
    let Some(likes) = open_likes(cli)? else {
        bail!("No likes database: pass --likes or --store");
    };
    // Likes are counted per identity, under its display name
    let index = load_index(load_rounds(cli)?)?;
    let Some(name) = index.lookup(song).map(IndexEntry::display_name) else {
        bail!("\"{}\" does not appear in any round", song);
    };
    let count = likes.like(name)?;
    if cli.format == OutputFormat::Json {
        return print_json(&BTreeMap::from([(name, count)]));
    }
    println!("{}: {} likes", name, count);
    Ok(())
}

fn run_likes(cli: &Cli) -> Result<()> {
    let Some(likes) = open_likes(cli)? else {
        bail!("No likes database: pass --likes or --store");
    };
    let all = likes.all()?;
    if cli.format == OutputFormat::Json {
        return print_json(&all);
    }
    let mut ranked: Vec<(&String, &u64)> = all.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1));
    for (song, count) in ranked {
        println!("{:>5}  {}", count, song);
    }
    Ok(())
}

fn print_validation(report: &ValidationReport) {
    println!("{:=<60}", "");
    println!("DATA VALIDATION REPORT");
    println!("{:=<60}", "");

    for round in &report.rounds {
        println!("\n--- {} ---", round.round);
        for skipped in &round.skipped {
            println!(
                "    Column {}: [!] EMPTY SEED TRACK - column skipped",
                skipped.column_letter
            );
            if !skipped.lost_songs.is_empty() {
                println!("        {} songs would be lost:", skipped.lost_songs.len());
                for song in skipped.lost_songs.iter().take(LOST_SONGS_PREVIEW) {
                    println!("          - {}", song);
                }
                if skipped.lost_songs.len() > LOST_SONGS_PREVIEW {
                    println!(
                        "          ... and {} more",
                        skipped.lost_songs.len() - LOST_SONGS_PREVIEW
                    );
                }
            }
        }
        for id in &round.missing_seed_contributor {
            println!("    {}: no seed contributor", id);
        }
        println!(
            "    Summary: {} songs indexed, {} songs skipped",
            round.songs_indexed, round.songs_skipped
        );
    }

    println!("\n{:=<60}", "");
    println!("  Rounds:            {}", report.rounds.len());
    println!("  Columns:           {}", report.columns_total);
    println!("  Columns OK:        {}", report.columns_ok);
    println!("  Columns skipped:   {}", report.columns_skipped);
    println!("  Songs indexed:     {}", report.songs_indexed);
    println!("  Songs skipped:     {}", report.songs_skipped);
    if report.has_lost_songs() {
        println!("\n[!] Add a seed track in row 1 of every skipped column.");
    } else {
        println!("\n[OK] All songs will be indexed.");
    }
}

fn run_validate(cli: &Cli) -> Result<ExitCode> {
    let report = validate_rounds(&load_rounds(cli)?);
    if cli.format == OutputFormat::Json {
        print_json(&report)?;
    } else {
        print_validation(&report);
    }
    Ok(if report.has_lost_songs() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
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

    set_log_only(cli.log_only || cli.format == OutputFormat::Json);

    match &cli.command {
        Command::Search { query, threshold } => run_search(&cli, &query.join(" "), *threshold)?,
        Command::Connections { song } => run_connections(&cli, &song.join(" "))?,
        Command::Top { limit } => run_top(&cli, *limit)?,
        Command::Contributors => run_contributors(&cli)?,
        Command::Contributor { name } => run_contributor(&cli, name)?,
        Command::Songs => run_songs(&cli)?,
        Command::Like { song } => run_like(&cli, &song.join(" "))?,
        Command::Likes => run_likes(&cli)?,
        Command::Validate => return run_validate(&cli),
    }

    Ok(ExitCode::SUCCESS)
}
