//! Tabular round sheets.
//!
//! Each round is one delimited text file exported from the game workbook. The
//! layout is fixed:
//!
//! - row 1: seed tracks, one per column; column A is reserved
//! - row 2: seed annotations of the form "Ausgangssong von: NAME"
//! - row 3+: matching songs in column N, contributor name in column A
//!
//! Files are parsed once into a [`Sheet`] (rows of fixed-arity optional cells)
//! and only then converted into a [`Round`].

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Cluster, ClusterId, Round, SongOccurrence};
use crate::normalize::parse_seed_annotation;

/// File extensions recognised as round sheets.
pub const SHEET_EXTENSIONS: [&str; 3] = ["tsv", "csv", "txt"];

/// Row holding the seed tracks.
pub const SEED_ROW: usize = 0;
/// Row holding the "Ausgangssong von" annotations.
pub const ANNOTATION_ROW: usize = 1;
/// First row with matching songs.
pub const FIRST_MATCH_ROW: usize = 2;
/// Column holding contributor names.
pub const CONTRIBUTOR_COLUMN: usize = 0;

/// A parsed sheet: every row has exactly `width` cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub width: usize,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Sheet {
    /// Cell text, None when blank or out of range.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    /// Number of seed columns (every column except the contributor column).
    pub fn seed_columns(&self) -> usize {
        self.width.saturating_sub(1)
    }

    /// Convert into a round. Columns with a blank seed become seedless
    /// clusters so validation can report the songs they carry.
    pub fn to_round(&self) -> Round {
        let mut round = Round::new(self.name.clone());

        for col in 1..self.width {
            let seed_track = self
                .cell(SEED_ROW, col)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let (seed_contributor, seed_annotated) =
                parse_seed_annotation(self.cell(ANNOTATION_ROW, col));

            let matches = (FIRST_MATCH_ROW..self.rows.len())
                .filter_map(|row| {
                    let song = self.cell(row, col)?;
                    let contributor = self
                        .cell(row, CONTRIBUTOR_COLUMN)
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string);
                    Some(SongOccurrence::new(song, contributor))
                })
                .collect();

            round.clusters.push(Cluster {
                id: ClusterId::new(self.name.clone(), col),
                seed_track,
                seed_contributor,
                seed_annotated,
                matches,
            });
        }

        round
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Delimiter for a sheet file, inferred from its extension.
pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

/// Parse sheet data into a fixed-arity table.
///
/// Quoted cells may contain delimiters and line breaks. Rows are padded with
/// blank cells to the width of the widest row.
///
/// # Errors
///
/// Returns `Error::Sheet` if the data has no rows, fewer than two columns, or
/// a record that is not valid UTF-8.
pub fn parse_sheet(name: &str, data: &[u8], delimiter: u8, path: &Path) -> Result<Sheet> {
    let malformed = |line: usize, message: String| Error::Sheet {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e
                .position()
                .map_or(raw_rows.len() + 1, |pos| pos.line() as usize);
            malformed(line, e.to_string())
        })?;
        raw_rows.push(record.iter().map(str::to_string).collect());
    }

    // Trailing blank lines carry nothing
    while raw_rows
        .last()
        .is_some_and(|r| r.iter().all(|f| f.trim().is_empty()))
    {
        raw_rows.pop();
    }

    if raw_rows.is_empty() {
        return Err(malformed(1, "sheet has no seed row".to_string()));
    }

    let width = raw_rows.iter().map(Vec::len).max().unwrap_or(0);
    if width < 2 {
        return Err(malformed(
            1,
            "sheet needs a contributor column and at least one seed column".to_string(),
        ));
    }

    let rows = raw_rows
        .into_iter()
        .map(|fields| {
            let mut cells: Vec<Option<String>> = fields
                .into_iter()
                .map(|f| if f.trim().is_empty() { None } else { Some(f) })
                .collect();
            cells.resize(width, None);
            cells
        })
        .collect();

    let sheet = Sheet {
        name: name.to_string(),
        width,
        rows,
    };

    if sheet.cell(SEED_ROW, CONTRIBUTOR_COLUMN).is_some() {
        warn!(sheet = name, "cell A1 should be empty; its content is ignored");
    }

    Ok(sheet)
}

/// Round name for a sheet file: the file stem.
pub fn round_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read and parse one sheet file.
pub fn load_sheet_file(path: &Path) -> Result<Sheet> {
    let data = std::fs::read(path)?;
    let sheet = parse_sheet(&round_name(path), &data, delimiter_for(path), path)?;
    debug!(
        sheet = %sheet.name,
        rows = sheet.rows.len(),
        columns = sheet.width,
        "parsed sheet"
    );
    Ok(sheet)
}

/// Sheet files for a path: the file itself, or every sheet file in a
/// directory sorted by file name (the round order).
///
/// Two files with the same stem would define the same round, so that is an
/// error.
pub fn sheet_paths(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| SHEET_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(Error::NoSheets(path.to_path_buf()));
    }

    let mut seen: FxHashMap<String, &PathBuf> = FxHashMap::default();
    for p in &paths {
        let name = round_name(p);
        if let Some(first) = seen.get(&name) {
            return Err(Error::DuplicateRound {
                name,
                first: first.to_path_buf(),
                second: p.clone(),
            });
        }
        seen.insert(name, p);
    }
    Ok(paths)
}

/// Load every sheet under `path` into rounds, in round order.
///
/// Fails on the first unreadable or malformed sheet; no partial result is
/// returned.
pub fn load_rounds(path: &Path) -> Result<Vec<Round>> {
    let paths = sheet_paths(path)?;
    paths
        .par_iter()
        .map(|p| load_sheet_file(p).map(|sheet| sheet.to_round()))
        .collect()
}
