//! Song index: normalized name → spelling variants and owning clusters.
//!
//! The index is a derived artifact. It is rebuilt wholesale from rounds and
//! published through [`IndexHandle`], so readers always hold a complete
//! snapshot.

use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{
    ClusterId, ClusterResult, ContributionKind, ContributorSong, Cluster, Round, TopSong,
};
use crate::normalize::normalize;
use crate::results::assemble;
use crate::scoring::{KeyMatch, PERFECT_SCORE};

/// Separator that marks an "Artist - Title" entry.
pub const ARTIST_TITLE_SEPARATOR: &str = " - ";

/// Default size of the "most popular songs" ranking.
pub const DEFAULT_TOP_LIMIT: usize = 50;

// ============================================================================
// Index Entries
// ============================================================================

/// All occurrences of one normalized identity.
#[derive(Clone, Debug)]
pub struct IndexEntry {
    pub key: String,
    /// Distinct spellings as written. Sorted, so the display name is stable.
    pub variants: BTreeSet<String>,
    /// One reference per occurrence, in ingest order. A song listed twice in
    /// the same cluster is referenced twice.
    pub clusters: Vec<Arc<Cluster>>,
}

impl IndexEntry {
    fn new(key: String) -> Self {
        Self {
            key,
            variants: BTreeSet::new(),
            clusters: Vec::new(),
        }
    }

    /// Display name: first variant in sort order.
    pub fn display_name(&self) -> &str {
        self.variants
            .iter()
            .next()
            .map(String::as_str)
            .unwrap_or(&self.key)
    }

    pub fn count(&self) -> usize {
        self.clusters.len()
    }

    pub fn variant_list(&self) -> Vec<String> {
        self.variants.iter().cloned().collect()
    }
}

/// Index over every seeded cluster of every round.
///
/// Entries live in a Vec in first-seen order; `positions` maps a key to its
/// slot, so iteration order is deterministic for identical input.
#[derive(Clone, Debug, Default)]
pub struct SongIndex {
    entries: Vec<IndexEntry>,
    positions: FxHashMap<String, usize>,
    skipped_clusters: usize,
}

impl SongIndex {
    /// Build the index from rounds, in round then column order.
    /// Clusters without a seed track are skipped (see `validate`).
    pub fn build(rounds: &[Round]) -> Self {
        let mut index = SongIndex::default();

        for round in rounds {
            for cluster in &round.clusters {
                if !cluster.has_seed() {
                    warn!(
                        cluster = %cluster.id,
                        lost_songs = cluster.matches.len(),
                        "skipping cluster without seed track"
                    );
                    index.skipped_clusters += 1;
                    continue;
                }

                let shared = Arc::new(cluster.clone());
                for song in cluster.all_songs() {
                    index.insert(song, &shared);
                }
            }
        }

        info!(
            keys = index.entries.len(),
            skipped_clusters = index.skipped_clusters,
            "song index built"
        );
        index
    }

    fn insert(&mut self, song: &str, cluster: &Arc<Cluster>) {
        let key = normalize(song);
        let slot = match self.positions.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.positions.insert(key.clone(), slot);
                self.entries.push(IndexEntry::new(key));
                slot
            }
        };

        let entry = &mut self.entries[slot];
        entry.variants.insert(song.to_string());
        entry.clusters.push(Arc::clone(cluster));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of clusters left out because their seed was blank.
    pub fn skipped_clusters(&self) -> usize {
        self.skipped_clusters
    }

    /// Entry for an already-normalized key.
    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.positions.get(key).map(|&slot| &self.entries[slot])
    }

    /// Entry for a song as written (normalized first).
    pub fn lookup(&self, song: &str) -> Option<&IndexEntry> {
        self.get(&normalize(song))
    }

    /// Entries in first-seen order.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// All clusters containing the identity of `song`, grouped the same way as
    /// search results. Every hit carries a perfect score.
    pub fn connections(&self, song: &str) -> Vec<ClusterResult> {
        let key = normalize(song);
        if self.get(&key).is_none() {
            debug!(song, "no connections");
            return Vec::new();
        }
        let matches = [KeyMatch {
            key,
            score: PERFECT_SCORE,
        }];
        assemble(&matches, self)
    }

    /// Most frequent songs, counting every occurrence.
    ///
    /// Only entries whose display name looks like "Artist - Title" are ranked.
    /// Ties keep first-seen order.
    pub fn top_songs(&self, limit: usize) -> Vec<TopSong> {
        let mut songs: Vec<&IndexEntry> = self
            .entries
            .iter()
            .filter(|e| e.display_name().contains(ARTIST_TITLE_SEPARATOR))
            .collect();
        songs.sort_by(|a, b| b.count().cmp(&a.count()));

        songs
            .into_iter()
            .take(limit)
            .map(|e| TopSong {
                name: e.display_name().to_string(),
                normalized: e.key.clone(),
                count: e.count(),
                variants: e.variant_list(),
                clusters: e.clusters.iter().map(|c| c.id.clone()).collect(),
            })
            .collect()
    }
}

// ============================================================================
// Round-level Queries
// ============================================================================

/// Every distinct indexed spelling, sorted (autocomplete source).
pub fn all_songs(rounds: &[Round]) -> Vec<String> {
    let songs: BTreeSet<String> = seeded_clusters(rounds)
        .flat_map(|c| c.all_songs().map(str::to_string))
        .collect();
    songs.into_iter().collect()
}

/// Every distinct contributor name, sorted.
///
/// Seed contributors count only when they come from an "Ausgangssong von"
/// annotation, so free text in row 2 is not mistaken for a person.
pub fn all_contributors(rounds: &[Round]) -> Vec<String> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    for round in rounds {
        for cluster in &round.clusters {
            names.extend(cluster.matches.iter().filter_map(|m| m.contributor.clone()));
            if cluster.has_seed() && cluster.seed_annotated {
                names.extend(cluster.seed_contributor.clone());
            }
        }
    }
    names.into_iter().collect()
}

/// Songs brought by `contributor`, in round then column order. Within a
/// cluster the seed comes before matches.
pub fn contributor_songs(rounds: &[Round], contributor: &str) -> Vec<ContributorSong> {
    let mut songs = Vec::new();

    for cluster in seeded_clusters(rounds) {
        let entry = |song: &str, kind| ContributorSong {
            song: song.to_string(),
            cluster: cluster.id.clone(),
            round_display: cluster.label(),
            kind,
        };

        if cluster.seed_annotated && cluster.seed_contributor.as_deref() == Some(contributor) {
            songs.push(entry(&cluster.seed_track, ContributionKind::Seed));
        }
        for m in &cluster.matches {
            if m.contributor.as_deref() == Some(contributor) {
                songs.push(entry(&m.song, ContributionKind::Match));
            }
        }
    }

    songs
}

/// Contributor names closest to `query`, best first, for "did you mean" output.
pub fn suggest_contributors(rounds: &[Round], query: &str, limit: usize) -> Vec<String> {
    /// Below this similarity a name is not worth suggesting.
    const MIN_SIMILARITY: f64 = 0.5;

    let query = normalize(query);
    let mut scored: Vec<(f64, String)> = all_contributors(rounds)
        .into_iter()
        .map(|name| (strsim::normalized_levenshtein(&query, &normalize(&name)), name))
        .filter(|(sim, _)| *sim >= MIN_SIMILARITY)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(limit).map(|(_, name)| name).collect()
}

/// Clusters that take part in indexing.
fn seeded_clusters(rounds: &[Round]) -> impl Iterator<Item = &Cluster> {
    rounds
        .iter()
        .flat_map(|r| r.clusters.iter())
        .filter(|c| c.has_seed())
}

/// Cluster ids referenced by an entry, without repeats.
pub fn distinct_clusters(entry: &IndexEntry) -> Vec<ClusterId> {
    let mut seen = HashSet::new();
    entry
        .clusters
        .iter()
        .filter(|c| seen.insert(c.id.clone()))
        .map(|c| c.id.clone())
        .collect()
}

// ============================================================================
// Published Snapshot
// ============================================================================

/// Holder for the current index snapshot.
///
/// Rebuilds happen off to the side and are swapped in whole; a failed rebuild
/// leaves the previous snapshot in place.
#[derive(Debug, Default)]
pub struct IndexHandle {
    current: RwLock<Arc<SongIndex>>,
}

impl IndexHandle {
    pub fn new(index: SongIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The complete index as of now.
    pub fn snapshot(&self) -> Arc<SongIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Publish a freshly built index.
    pub fn install(&self, index: SongIndex) {
        let next = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    /// Load rounds and rebuild. Nothing is published if loading fails.
    pub fn rebuild<F>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<Vec<Round>>,
    {
        let rounds = load()?;
        self.install(SongIndex::build(&rounds));
        Ok(())
    }
}
