//! Group matched keys back into the clusters that contain them.

use rustc_hash::FxHashMap;
use std::cmp::Reverse;

use crate::index::SongIndex;
use crate::models::{Cluster, ClusterId, ClusterResult, MatchedSong};
use crate::scoring::KeyMatch;

/// Hits collected for one cluster before ranking.
struct Pending<'a> {
    cluster: &'a Cluster,
    /// (display name, score, variants) in first-seen order.
    hits: Vec<(&'a str, u8, Vec<String>)>,
}

/// Build cluster-grouped results from matched keys.
///
/// A cluster appears once however many of its songs matched. Its hits are
/// ranked by score (ties keep first-seen order) and deduplicated by display
/// name, keeping the best score. Clusters are ranked by their best hit, ties
/// keeping the order in which they were first reached. Keys missing from the
/// index are ignored.
pub fn assemble(matches: &[KeyMatch], index: &SongIndex) -> Vec<ClusterResult> {
    let mut order: Vec<ClusterId> = Vec::new();
    let mut pending: FxHashMap<ClusterId, Pending<'_>> = FxHashMap::default();

    for m in matches {
        let Some(entry) = index.get(&m.key) else {
            continue;
        };
        let display = entry.display_name();
        let variants = entry.variant_list();

        for cluster in &entry.clusters {
            let slot = pending.entry(cluster.id.clone()).or_insert_with(|| {
                order.push(cluster.id.clone());
                Pending {
                    cluster: cluster.as_ref(),
                    hits: Vec::new(),
                }
            });
            slot.hits.push((display, m.score, variants.clone()));
        }
    }

    let mut results: Vec<ClusterResult> = order
        .into_iter()
        .filter_map(|id| pending.remove(&id))
        .map(finish)
        .collect();

    results.sort_by_key(|r| Reverse(r.best_score()));
    results
}

fn finish(mut pending: Pending<'_>) -> ClusterResult {
    pending.hits.sort_by_key(|&(_, score, _)| Reverse(score));

    let mut hits: Vec<MatchedSong> = Vec::with_capacity(pending.hits.len());
    for (name, score, variants) in pending.hits {
        if hits.iter().any(|h| h.name == name) {
            continue;
        }
        hits.push(MatchedSong {
            name: name.to_string(),
            score,
            variants,
        });
    }

    let cluster = pending.cluster;
    ClusterResult {
        cluster: cluster.id.clone(),
        round_display: cluster.label(),
        seed_track: cluster.seed_track.clone(),
        seed_contributor: cluster.seed_contributor.clone(),
        songs: cluster.occurrences(),
        hits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Round, SongOccurrence};
    use crate::scoring::{search, Threshold};

    fn round() -> Round {
        Round {
            name: "R1".to_string(),
            clusters: vec![
                Cluster {
                    id: ClusterId::new("R1", 1),
                    seed_track: "A - B".to_string(),
                    seed_contributor: Some("Seedy".to_string()),
                    seed_annotated: true,
                    matches: vec![
                        SongOccurrence::new("C - D", Some("Carl".to_string())),
                        SongOccurrence::new("E - F", Some("Eve".to_string())),
                    ],
                },
                Cluster {
                    id: ClusterId::new("R1", 2),
                    seed_track: "G - H".to_string(),
                    seed_contributor: None,
                    seed_annotated: false,
                    matches: vec![
                        SongOccurrence::new("c-d", None),
                        SongOccurrence::new("C - D", None),
                    ],
                },
            ],
        }
    }

    fn km(key: &str, score: u8) -> KeyMatch {
        KeyMatch {
            key: key.to_string(),
            score,
        }
    }

    #[test]
    fn test_one_result_per_cluster() {
        let index = SongIndex::build(&[round()]);
        let results = assemble(&[km("c - d", 90), km("e - f", 80)], &index);
        let first = results
            .iter()
            .find(|r| r.cluster == ClusterId::new("R1", 1))
            .unwrap();
        assert_eq!(results.iter().filter(|r| r.cluster == first.cluster).count(), 1);
        let names: Vec<&str> = first.hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["C - D", "E - F"]);
        assert_eq!(first.seed_track, "A - B");
        assert_eq!(first.songs.len(), 3);
        assert_eq!(first.contributor_of("E - F"), Some("Eve"));
        assert_eq!(first.contributors().get("A - B"), Some(&"Seedy"));
        assert_eq!(first.hit("E - F").map(|h| h.score), Some(80));
        assert_eq!(first.round_display, "R1, Woche 1");
    }

    #[test]
    fn test_hits_sorted_and_deduplicated() {
        let index = SongIndex::build(&[round()]);
        let results = assemble(&[km("e - f", 80), km("c - d", 95)], &index);
        let first = results
            .iter()
            .find(|r| r.cluster == ClusterId::new("R1", 1))
            .unwrap();
        assert_eq!(first.hits[0].name, "C - D");
        assert_eq!(first.hits[0].score, 95);

        // Both spellings in R1/2 map to one identity: one hit, with both variants
        let second = results
            .iter()
            .find(|r| r.cluster == ClusterId::new("R1", 2))
            .unwrap();
        assert_eq!(second.hits.len(), 1);
        assert_eq!(second.hits[0].variants, vec!["C - D", "c-d"]);
        assert!(second.is_hit("c-d"));
    }

    #[test]
    fn test_clusters_ranked_by_best_hit() {
        let index = SongIndex::build(&[round()]);
        let results = assemble(&[km("g - h", 75), km("e - f", 99)], &index);
        assert_eq!(results[0].cluster, ClusterId::new("R1", 1));
        assert_eq!(results[1].cluster, ClusterId::new("R1", 2));
    }

    #[test]
    fn test_no_matches_no_results() {
        let index = SongIndex::build(&[round()]);
        assert!(assemble(&[], &index).is_empty());
        assert!(assemble(&[km("not - indexed", 100)], &index).is_empty());
    }

    #[test]
    fn test_repeated_song_credits_last_contributor() {
        let mut round = round();
        round.clusters[0]
            .matches
            .push(SongOccurrence::new("C - D", Some("Dora".to_string())));
        let index = SongIndex::build(&[round]);
        let results = assemble(&[km("c - d", 100)], &index);
        let first = results
            .iter()
            .find(|r| r.cluster == ClusterId::new("R1", 1))
            .unwrap();
        assert_eq!(first.hits.len(), 1);
        assert_eq!(first.contributor_of("C - D"), Some("Dora"));
        assert_eq!(first.contributors().get("C - D"), Some(&"Dora"));
    }

    #[test]
    fn test_scenario_highway() {
        let round = Round {
            name: "R1".to_string(),
            clusters: vec![Cluster {
                id: ClusterId::new("R1", 1),
                seed_track: "AC/DC - Highway to Hell".to_string(),
                seed_contributor: Some("John".to_string()),
                seed_annotated: true,
                matches: vec![SongOccurrence::new(
                    "Led Zeppelin - Whole Lotta Love",
                    Some("Emma".to_string()),
                )],
            }],
        };
        let index = SongIndex::build(&[round]);
        let matches = search("highway", &index, Threshold::new(70).unwrap());
        let results = assemble(&matches, &index);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].seed_track, "AC/DC - Highway to Hell");
        assert_eq!(results[0].seed_contributor.as_deref(), Some("John"));
        assert_eq!(results[0].hits[0].name, "AC/DC - Highway to Hell");
        assert_eq!(results[0].hits[0].score, 100);
    }
}
