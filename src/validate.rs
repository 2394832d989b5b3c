//! Data checks run before import: columns the index would skip and songs
//! recorded under more than one spelling.

use std::cmp::Reverse;
use tracing::{info, warn};

use crate::index::SongIndex;
use crate::models::{DuplicateEntry, RoundReport, Round, SkippedColumn, ValidationReport};

/// Spreadsheet column letter for a 0-based column index (0 → "A", 26 → "AA").
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Report what indexing would keep and lose, per round and in total.
pub fn validate_rounds(rounds: &[Round]) -> ValidationReport {
    let mut report = ValidationReport::default();

    for round in rounds {
        let mut rr = RoundReport {
            round: round.name.clone(),
            ..RoundReport::default()
        };

        for cluster in &round.clusters {
            rr.columns_total += 1;

            if !cluster.has_seed() {
                let lost_songs: Vec<String> =
                    cluster.matches.iter().map(|m| m.song.clone()).collect();
                warn!(
                    cluster = %cluster.id,
                    column = %column_letter(cluster.id.column),
                    lost = lost_songs.len(),
                    "empty seed track, column skipped"
                );
                rr.columns_skipped += 1;
                rr.songs_skipped += lost_songs.len();
                rr.skipped.push(SkippedColumn {
                    cluster: cluster.id.clone(),
                    column_letter: column_letter(cluster.id.column),
                    lost_songs,
                });
                continue;
            }

            rr.columns_ok += 1;
            rr.songs_indexed += 1 + cluster.matches.len();
            if cluster.seed_contributor.is_none() {
                rr.missing_seed_contributor.push(cluster.id.clone());
            }
        }

        report.columns_total += rr.columns_total;
        report.columns_ok += rr.columns_ok;
        report.columns_skipped += rr.columns_skipped;
        report.songs_indexed += rr.songs_indexed;
        report.songs_skipped += rr.songs_skipped;
        report.rounds.push(rr);
    }

    info!(
        rounds = report.rounds.len(),
        columns = report.columns_total,
        skipped = report.columns_skipped,
        songs_indexed = report.songs_indexed,
        songs_skipped = report.songs_skipped,
        "validation finished"
    );
    report
}

/// Identities observed under more than one spelling, most variants first.
/// Ties keep index order.
pub fn find_duplicates(index: &SongIndex) -> Vec<DuplicateEntry> {
    let mut duplicates: Vec<DuplicateEntry> = index
        .entries()
        .filter(|e| e.variants.len() > 1)
        .map(|e| DuplicateEntry {
            normalized: e.key.clone(),
            variants: e.variant_list(),
            locations: e.clusters.iter().map(|c| c.label()).collect(),
        })
        .collect();
    duplicates.sort_by_key(|d| Reverse(d.variants.len()));
    duplicates
}
