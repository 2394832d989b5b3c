//! songmatch - searchable archive of song-matching game rounds.
//!
//! Rounds are read from sheets or the SQLite store, indexed by normalized
//! song name and queried with fuzzy search.

pub mod error;
pub mod index;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod results;
pub mod safety;
pub mod scoring;
pub mod sheet;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
pub use index::{IndexHandle, SongIndex};
pub use models::{Cluster, ClusterId, ClusterResult, Round};
pub use scoring::Threshold;

/// Fuzzy search grouped by cluster: [`scoring::search`] then
/// [`results::assemble`].
pub fn search_clusters(query: &str, index: &SongIndex, threshold: Threshold) -> Vec<ClusterResult> {
    let matches = scoring::search(query, index, threshold);
    results::assemble(&matches, index)
}
