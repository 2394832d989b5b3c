//! Fuzzy matching of a free-text query against the index keys.
//!
//! Two mechanisms feed the result:
//! - token-sort similarity (word order insensitive, typo tolerant)
//! - literal substring containment, which always scores a perfect 100

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::SongIndex;
use crate::normalize::normalize;

// ============================================================================
// Score Thresholds
// ============================================================================

/// Default minimum similarity for a fuzzy candidate.
pub const DEFAULT_THRESHOLD: u8 = 70;

/// At most this many keys survive the similarity pass.
pub const MAX_FUZZY_CANDIDATES: usize = 100;

/// Score given to substring hits and exact identity lookups.
pub const PERFECT_SCORE: u8 = 100;

/// Minimum similarity score, validated to 0..=100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Threshold(u8);

impl Threshold {
    /// # Errors
    ///
    /// Returns `Error::InvalidThreshold` for values above 100.
    pub fn new(value: u32) -> Result<Self> {
        if value > u32::from(PERFECT_SCORE) {
            return Err(Error::InvalidThreshold(value));
        }
        Ok(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl TryFrom<u32> for Threshold {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

// ============================================================================
// Similarity
// ============================================================================

/// Sort whitespace tokens and rejoin them with single spaces.
pub fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Token-sort ratio in 0.0..=100.0: Indel similarity of the token-sorted
/// strings. Two empty strings are identical.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let sorted_a = sort_tokens(a);
    let sorted_b = sort_tokens(b);
    if sorted_a.is_empty() && sorted_b.is_empty() {
        return 100.0;
    }
    rapidfuzz::fuzz::ratio(sorted_a.chars(), sorted_b.chars()) * 100.0
}

/// Report a similarity as an integer score. Threshold checks are made on the
/// unrounded value, so rounding never lets a candidate in.
pub fn to_score(similarity: f64) -> u8 {
    similarity.round().clamp(0.0, 100.0) as u8
}

// ============================================================================
// Search
// ============================================================================

/// A matched index key with its score.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyMatch {
    pub key: String,
    pub score: u8,
}

/// Match a query against every key of the index.
///
/// Keys scoring at least `threshold` by token-sort similarity are kept, best
/// first and capped at [`MAX_FUZZY_CANDIDATES`]; ties keep index order. Any
/// key containing the normalized query scores [`PERFECT_SCORE`], overriding
/// its similarity score. Substring-only keys follow the similarity
/// candidates in index order. A query that normalizes to nothing matches
/// nothing.
pub fn search(query: &str, index: &SongIndex, threshold: Threshold) -> Vec<KeyMatch> {
    let query = normalize(query);
    if query.is_empty() {
        return Vec::new();
    }
    let cutoff = f64::from(threshold.value());

    let mut candidates: Vec<(usize, f64)> = index
        .keys()
        .enumerate()
        .filter_map(|(pos, key)| {
            let similarity = token_sort_ratio(&query, key);
            (similarity >= cutoff).then_some((pos, similarity))
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    candidates.truncate(MAX_FUZZY_CANDIDATES);

    let keys: Vec<&str> = index.keys().collect();
    let mut matches: Vec<KeyMatch> = candidates
        .iter()
        .map(|&(pos, similarity)| {
            let key = keys[pos];
            let score = if key.contains(query.as_str()) {
                PERFECT_SCORE
            } else {
                to_score(similarity)
            };
            KeyMatch {
                key: key.to_string(),
                score,
            }
        })
        .collect();

    let fuzzy_count = matches.len();
    let already: HashSet<usize> = candidates.iter().map(|&(pos, _)| pos).collect();
    for (pos, key) in keys.iter().enumerate() {
        if !already.contains(&pos) && key.contains(query.as_str()) {
            matches.push(KeyMatch {
                key: (*key).to_string(),
                score: PERFECT_SCORE,
            });
        }
    }

    debug!(
        query = %query,
        threshold = threshold.value(),
        fuzzy = fuzzy_count,
        substring_only = matches.len() - fuzzy_count,
        "search matched keys"
    );
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cluster, ClusterId, Round, SongOccurrence};

    fn index_of(songs: &[&str]) -> SongIndex {
        let clusters = songs
            .iter()
            .enumerate()
            .map(|(i, s)| Cluster {
                id: ClusterId::new("R", i + 1),
                seed_track: s.to_string(),
                seed_contributor: None,
                seed_annotated: false,
                matches: Vec::<SongOccurrence>::new(),
            })
            .collect();
        SongIndex::build(&[Round {
            name: "R".to_string(),
            clusters,
        }])
    }

    fn t(v: u32) -> Threshold {
        Threshold::new(v).unwrap()
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(Threshold::new(0).is_ok());
        assert!(Threshold::new(100).is_ok());
        assert!(matches!(Threshold::new(101), Err(Error::InvalidThreshold(101))));
        assert_eq!(Threshold::default().value(), 70);
    }

    #[test]
    fn test_token_sort_ratio() {
        assert_eq!(token_sort_ratio("hello world", "world hello"), 100.0);
        assert_eq!(token_sort_ratio("", ""), 100.0);
        assert_eq!(token_sort_ratio("abc", ""), 0.0);
        // 2 * 3 matching / (4 + 3) chars
        let partial = token_sort_ratio("abcd", "abc");
        assert!((partial - 600.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_substring_override() {
        let index = index_of(&["Queen - We Will Rock You", "Falco - Rock Me Amadeus"]);
        let matches = search("rock you", &index, t(70));
        let queen = matches
            .iter()
            .find(|m| m.key == "queen - we will rock you")
            .unwrap();
        assert_eq!(queen.score, 100);
    }

    #[test]
    fn test_word_order_tolerated() {
        let index = index_of(&["Falco - Rock Me Amadeus"]);
        let matches = search("amadeus rock me", &index, t(70));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, "falco - rock me amadeus");
        assert!(matches[0].score >= 70);
        assert!(matches[0].score < 100);
    }

    #[test]
    fn test_typo_tolerated() {
        let index = index_of(&["Falco - Rock Me Amadeus"]);
        let matches = search("falco - rock me amadeos", &index, t(70));
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score >= 90);
    }

    #[test]
    fn test_empty_and_unmatched() {
        let index = index_of(&["Queen - We Will Rock You"]);
        assert!(search("", &index, t(70)).is_empty());
        assert!(search("   ", &index, t(70)).is_empty());
        assert!(search("zzzzqqqq", &index, t(70)).is_empty());
    }

    #[test]
    fn test_substring_beats_threshold() {
        let index = index_of(&["AC/DC - Highway to Hell"]);
        // far below any similarity threshold, but a literal substring
        let matches = search("highway", &index, t(100));
        assert_eq!(
            matches,
            vec![KeyMatch {
                key: "ac/dc - highway to hell".to_string(),
                score: 100
            }]
        );
    }

    #[test]
    fn test_ranked_best_first() {
        let index = index_of(&["Rock Me Amadeus", "Falco - Rock Me Amadeus"]);
        let matches = search("amadeus me rock", &index, t(50));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].key, "rock me amadeus");
        assert_eq!(matches[0].score, 100);
        assert!(matches[1].score < 100);
    }

    #[test]
    fn test_candidate_cap() {
        let songs: Vec<String> = (0..150).map(|i| format!("Band {i:03} - Song")).collect();
        let refs: Vec<&str> = songs.iter().map(String::as_str).collect();
        let index = index_of(&refs);
        // similarity pass alone would keep at most the cap; substring hits are added on top
        let matches = search("band song", &index, t(60));
        assert!(matches.len() <= MAX_FUZZY_CANDIDATES);
        assert!(!matches.is_empty());
        let all = search("song", &index, t(100));
        assert_eq!(all.len(), 150);
    }
}
