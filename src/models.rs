//! Core data models for the song archive.
//!
//! Rounds and clusters are the ingested source data; everything in the
//! "Query Output" section is derived from an index snapshot per request.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Source Data
// ============================================================================

/// Stable identity of a cluster: the round it belongs to and the sheet column
/// holding its seed track (column 0 is reserved for contributor names).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClusterId {
    pub round: String,
    pub column: usize,
}

impl ClusterId {
    pub fn new(round: impl Into<String>, column: usize) -> Self {
        Self {
            round: round.into(),
            column,
        }
    }

    /// Display label, e.g. "Runde 3, Woche 4".
    pub fn label(&self) -> String {
        format!("{}, Woche {}", self.round, self.column)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A song as written in the sheet, with the person who brought it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SongOccurrence {
    pub song: String,
    pub contributor: Option<String>,
}

impl SongOccurrence {
    pub fn new(song: impl Into<String>, contributor: Option<String>) -> Self {
        Self {
            song: song.into(),
            contributor,
        }
    }
}

/// One seed track ("Ausgangssong") plus the songs submitted as matches to it.
///
/// A cluster read from a sheet column with a blank seed cell keeps an empty
/// `seed_track`; such clusters are never indexed but stay visible to the
/// validation pass so their lost songs can be reported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub seed_track: String,
    pub seed_contributor: Option<String>,
    /// True when the seed contributor came from an "Ausgangssong von" annotation.
    #[serde(skip)]
    pub seed_annotated: bool,
    pub matches: Vec<SongOccurrence>,
}

impl Cluster {
    pub fn has_seed(&self) -> bool {
        !self.seed_track.trim().is_empty()
    }

    pub fn label(&self) -> String {
        self.id.label()
    }

    /// Seed first, then matches in source order.
    pub fn all_songs(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.seed_track.as_str()).chain(self.matches.iter().map(|m| m.song.as_str()))
    }

    /// Seed plus matches as occurrences, preserving source order.
    pub fn occurrences(&self) -> Vec<SongOccurrence> {
        let mut songs = Vec::with_capacity(self.matches.len() + 1);
        songs.push(SongOccurrence::new(
            self.seed_track.clone(),
            self.seed_contributor.clone(),
        ));
        songs.extend(self.matches.iter().cloned());
        songs
    }

    /// Contributor lookup keyed by the song as written.
    /// If a song appears twice in one cluster the last occurrence wins.
    pub fn contributor_of(&self, song: &str) -> Option<&str> {
        match self.matches.iter().rev().find(|m| m.song == song) {
            Some(m) => m.contributor.as_deref(),
            None if song == self.seed_track => self.seed_contributor.as_deref(),
            None => None,
        }
    }
}

/// One edition of the game (one worksheet).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Round {
    pub name: String,
    pub clusters: Vec<Cluster>,
}

impl Round {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clusters: Vec::new(),
        }
    }
}

// ============================================================================
// Query Output
// ============================================================================

/// A song inside a cluster result that matched the query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchedSong {
    /// Display name of the matched identity (first variant in sort order).
    pub name: String,
    pub score: u8,
    /// Every spelling observed for this identity across the archive.
    pub variants: Vec<String>,
}

/// One cluster in a result list, with the songs that caused it to match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterResult {
    pub cluster: ClusterId,
    pub round_display: String,
    pub seed_track: String,
    pub seed_contributor: Option<String>,
    /// Full ordered song list, seed first.
    pub songs: Vec<SongOccurrence>,
    /// Matched songs, best score first.
    pub hits: Vec<MatchedSong>,
}

impl ClusterResult {
    pub fn best_score(&self) -> u8 {
        self.hits.iter().map(|h| h.score).max().unwrap_or(0)
    }

    pub fn hit(&self, name: &str) -> Option<&MatchedSong> {
        self.hits.iter().find(|h| h.name == name)
    }

    pub fn is_hit(&self, song: &str) -> bool {
        self.hits.iter().any(|h| h.name == song || h.variants.iter().any(|v| v == song))
    }

    /// Last occurrence wins, as in [`Cluster::contributor_of`].
    pub fn contributor_of(&self, song: &str) -> Option<&str> {
        self.songs
            .iter()
            .rev()
            .find(|s| s.song == song)
            .and_then(|s| s.contributor.as_deref())
    }

    /// Per-song contributor map (songs without a contributor are omitted).
    pub fn contributors(&self) -> BTreeMap<&str, &str> {
        let mut map = BTreeMap::new();
        for s in &self.songs {
            match s.contributor.as_deref() {
                Some(c) => {
                    map.insert(s.song.as_str(), c);
                }
                None => {
                    map.remove(s.song.as_str());
                }
            }
        }
        map
    }
}

/// Entry in the "most popular songs" ranking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopSong {
    pub name: String,
    pub normalized: String,
    pub count: usize,
    pub variants: Vec<String>,
    pub clusters: Vec<ClusterId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    /// The contributor chose the seed track of the cluster.
    Seed,
    /// The contributor submitted the song as a match.
    Match,
}

/// A song brought by one contributor, for the contributor browsing view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContributorSong {
    pub song: String,
    pub cluster: ClusterId,
    pub round_display: String,
    pub kind: ContributionKind,
}

// ============================================================================
// Validation
// ============================================================================

/// A sheet column that is excluded from the index because row 1 is blank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedColumn {
    pub cluster: ClusterId,
    /// Spreadsheet column letter, e.g. "C".
    pub column_letter: String,
    pub lost_songs: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub round: String,
    pub columns_total: usize,
    pub columns_ok: usize,
    pub columns_skipped: usize,
    pub songs_indexed: usize,
    pub songs_skipped: usize,
    /// Indexed clusters whose row 2 carries no seed contributor.
    pub missing_seed_contributor: Vec<ClusterId>,
    pub skipped: Vec<SkippedColumn>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub rounds: Vec<RoundReport>,
    pub columns_total: usize,
    pub columns_ok: usize,
    pub columns_skipped: usize,
    pub songs_indexed: usize,
    pub songs_skipped: usize,
}

impl ValidationReport {
    pub fn has_lost_songs(&self) -> bool {
        self.songs_skipped > 0
    }
}

/// A normalized identity observed under more than one spelling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DuplicateEntry {
    pub normalized: String,
    pub variants: Vec<String>,
    /// Cluster labels where the identity appears, in ingest order.
    pub locations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster {
            id: ClusterId::new("R1", 2),
            seed_track: "A - B".to_string(),
            seed_contributor: Some("John".to_string()),
            seed_annotated: true,
            matches: vec![
                SongOccurrence::new("C - D", Some("Emma".to_string())),
                SongOccurrence::new("E - F", None),
            ],
        }
    }

    #[test]
    fn test_cluster_label() {
        assert_eq!(cluster().label(), "R1, Woche 2");
    }

    #[test]
    fn test_all_songs_seed_first() {
        let c = cluster();
        let songs: Vec<&str> = c.all_songs().collect();
        assert_eq!(songs, vec!["A - B", "C - D", "E - F"]);
    }

    #[test]
    fn test_contributor_of() {
        let c = cluster();
        assert_eq!(c.contributor_of("A - B"), Some("John"));
        assert_eq!(c.contributor_of("C - D"), Some("Emma"));
        assert_eq!(c.contributor_of("E - F"), None);
        assert_eq!(c.contributor_of("X - Y"), None);
    }

    #[test]
    fn test_repeated_song_uses_last_contributor() {
        let mut c = cluster();
        c.matches.push(SongOccurrence::new("C - D", Some("Max".to_string())));
        c.matches.push(SongOccurrence::new("A - B", None));
        assert_eq!(c.contributor_of("C - D"), Some("Max"));
        assert_eq!(c.contributor_of("A - B"), None);
        // Each occurrence is still listed
        assert_eq!(c.occurrences().len(), 5);
    }

    #[test]
    fn test_has_seed() {
        let mut c = cluster();
        assert!(c.has_seed());
        c.seed_track = "   ".to_string();
        assert!(!c.has_seed());
    }
}
