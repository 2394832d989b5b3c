//! SQLite backing store.
//!
//! Rounds are persisted in three tables (`runden`, `clusters`, `songs`) and
//! read back into the same [`Round`] values the sheet loader produces, so the
//! index, matcher and assembler behave identically in both modes. Likes live
//! in their own `likes` table and may share the database file.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{Cluster, ClusterId, Round, SongOccurrence};
use crate::normalize::normalize;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS runden (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        position INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS clusters (
        id INTEGER PRIMARY KEY,
        runde_id INTEGER NOT NULL REFERENCES runden(id),
        week_number INTEGER NOT NULL,
        seed_track TEXT NOT NULL,
        seed_contributor TEXT,
        seed_annotated INTEGER NOT NULL DEFAULT 0,
        UNIQUE (runde_id, week_number)
    );

    CREATE TABLE IF NOT EXISTS songs (
        id INTEGER PRIMARY KEY,
        cluster_id INTEGER NOT NULL REFERENCES clusters(id),
        song_name TEXT NOT NULL,
        song_name_normalized TEXT NOT NULL,
        contributor TEXT,
        is_seed_track INTEGER NOT NULL,
        row_index INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_songs_cluster ON songs(cluster_id, row_index);
    CREATE INDEX IF NOT EXISTS idx_songs_normalized ON songs(song_name_normalized);";

const LIKES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS likes (
        song_name TEXT PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0
    );";

/// Row counts written by [`Store::replace_rounds`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub rounds: usize,
    pub clusters: usize,
    pub songs: usize,
}

impl ImportSummary {
    /// Counts [`Store::replace_rounds`] would write, without touching a database.
    pub fn preview(rounds: &[Round]) -> Self {
        let mut summary = Self {
            rounds: rounds.len(),
            ..Self::default()
        };
        for cluster in rounds.iter().flat_map(|r| &r.clusters).filter(|c| c.has_seed()) {
            summary.clusters += 1;
            summary.songs += 1 + cluster.matches.len();
        }
        summary
    }
}

// ============================================================================
// Rounds
// ============================================================================

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open an existing store for reading. A missing file or schema is
    /// reported as a store error, not created.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!(path = %path.display(), "opened store read-only");
        Ok(Self { conn })
    }

    /// Open or create a store for writing, creating the schema if needed.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Replace every stored round in a single transaction.
    ///
    /// Clusters without a seed track are not written; they are never indexed
    /// and the sheets remain their source of truth. The seed is stored as a
    /// song row with `is_seed_track = 1` and `row_index = 0`.
    pub fn replace_rounds(&mut self, rounds: &[Round]) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let tx = self.conn.transaction()?;
        tx.execute_batch("DELETE FROM songs; DELETE FROM clusters; DELETE FROM runden;")?;

        {
            let mut insert_round =
                tx.prepare_cached("INSERT INTO runden (name, position) VALUES (?1, ?2)")?;
            let mut insert_cluster = tx.prepare_cached(
                "INSERT INTO clusters (runde_id, week_number, seed_track, seed_contributor, seed_annotated)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut insert_song = tx.prepare_cached(
                "INSERT INTO songs (cluster_id, song_name, song_name_normalized, contributor, is_seed_track, row_index)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for (position, round) in rounds.iter().enumerate() {
                let runde_id = insert_round.insert(params![round.name, position as i64])?;
                summary.rounds += 1;

                for cluster in round.clusters.iter().filter(|c| c.has_seed()) {
                    let cluster_id = insert_cluster.insert(params![
                        runde_id,
                        cluster.id.column as i64,
                        cluster.seed_track,
                        cluster.seed_contributor,
                        cluster.seed_annotated,
                    ])?;
                    summary.clusters += 1;

                    insert_song.execute(params![
                        cluster_id,
                        cluster.seed_track,
                        normalize(&cluster.seed_track),
                        cluster.seed_contributor,
                        true,
                        0i64,
                    ])?;
                    for (i, m) in cluster.matches.iter().enumerate() {
                        insert_song.execute(params![
                            cluster_id,
                            m.song,
                            normalize(&m.song),
                            m.contributor,
                            false,
                            (i + 1) as i64,
                        ])?;
                    }
                    summary.songs += 1 + cluster.matches.len();
                }
            }
        }

        tx.commit()?;
        info!(
            rounds = summary.rounds,
            clusters = summary.clusters,
            songs = summary.songs,
            "store replaced"
        );
        Ok(summary)
    }

    /// Read all rounds back in their original order.
    pub fn load_rounds(&self) -> Result<Vec<Round>> {
        let mut round_stmt = self
            .conn
            .prepare_cached("SELECT id, name FROM runden ORDER BY position")?;
        let mut cluster_stmt = self.conn.prepare_cached(
            "SELECT id, week_number, seed_track, seed_contributor, seed_annotated
             FROM clusters WHERE runde_id = ?1 ORDER BY week_number",
        )?;
        let mut song_stmt = self.conn.prepare_cached(
            "SELECT song_name, contributor FROM songs
             WHERE cluster_id = ?1 AND is_seed_track = 0
             ORDER BY row_index",
        )?;

        let stored: Vec<(i64, String)> = round_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let mut rounds = Vec::with_capacity(stored.len());
        for (runde_id, name) in stored {
            let mut round = Round::new(name);

            let clusters: Vec<(i64, i64, String, Option<String>, bool)> = cluster_stmt
                .query_map([runde_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?
                .collect::<rusqlite::Result<_>>()?;

            for (cluster_id, week, seed_track, seed_contributor, seed_annotated) in clusters {
                let matches: Vec<SongOccurrence> = song_stmt
                    .query_map([cluster_id], |row| {
                        Ok(SongOccurrence::new(row.get::<_, String>(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<_>>()?;

                round.clusters.push(Cluster {
                    id: ClusterId::new(round.name.clone(), week as usize),
                    seed_track,
                    seed_contributor,
                    seed_annotated,
                    matches,
                });
            }
            rounds.push(round);
        }

        debug!(rounds = rounds.len(), "loaded rounds from store");
        Ok(rounds)
    }
}

// ============================================================================
// Likes
// ============================================================================

/// Per-song like counter keyed by display name. Last write wins.
pub struct LikeStore {
    conn: Connection,
}

impl LikeStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(LIKES_SCHEMA)?;
        Ok(Self { conn })
    }

    /// Add one like and return the new count.
    pub fn like(&self, song: &str) -> Result<u64> {
        self.conn
            .prepare_cached(
                "INSERT INTO likes (song_name, count) VALUES (?1, 1)
                 ON CONFLICT(song_name) DO UPDATE SET count = count + 1",
            )?
            .execute([song])?;
        self.count(song)
    }

    /// Likes recorded for `song`; 0 when it was never liked.
    pub fn count(&self, song: &str) -> Result<u64> {
        let count: Option<i64> = self
            .conn
            .prepare_cached("SELECT count FROM likes WHERE song_name = ?1")?
            .query_row([song], |row| row.get(0))
            .optional()?;
        Ok(count.map_or(0, |c| c.max(0) as u64))
    }

    /// Overwrite counts from an exported map (e.g. a likes JSON file), in one
    /// transaction. Returns the number of songs written.
    pub fn import(&mut self, counts: &BTreeMap<String, u64>) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO likes (song_name, count) VALUES (?1, ?2)
                 ON CONFLICT(song_name) DO UPDATE SET count = excluded.count",
            )?;
            for (song, count) in counts {
                stmt.execute(params![song, i64::try_from(*count).unwrap_or(i64::MAX)])?;
            }
        }
        tx.commit()?;
        Ok(counts.len())
    }

    pub fn all(&self) -> Result<BTreeMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT song_name, count FROM likes")?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok((row.get::<_, String>(0)?, count.max(0) as u64))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    fn rounds() -> Vec<Round> {
        vec![
            Round {
                name: "Runde 2".to_string(),
                clusters: vec![
                    Cluster {
                        id: ClusterId::new("Runde 2", 1),
                        seed_track: "AC/DC - Highway to Hell".to_string(),
                        seed_contributor: Some("John".to_string()),
                        seed_annotated: true,
                        matches: vec![
                            SongOccurrence::new(
                                "Led Zeppelin - Whole Lotta Love",
                                Some("Emma".to_string()),
                            ),
                            SongOccurrence::new("  spaced - as written ", None),
                        ],
                    },
                    Cluster {
                        id: ClusterId::new("Runde 2", 2),
                        seed_track: String::new(),
                        seed_contributor: None,
                        seed_annotated: false,
                        matches: vec![SongOccurrence::new("Lost - Song", None)],
                    },
                ],
            },
            Round {
                name: "Runde 10".to_string(),
                clusters: vec![Cluster {
                    id: ClusterId::new("Runde 10", 4),
                    seed_track: "Falco - Rock Me Amadeus".to_string(),
                    seed_contributor: Some("free text".to_string()),
                    seed_annotated: false,
                    matches: Vec::new(),
                }],
            },
        ]
    }

    #[test]
    fn test_round_trip_keeps_seeded_clusters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.sqlite3");

        let mut store = Store::create(&path).unwrap();
        let summary = store.replace_rounds(&rounds()).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                rounds: 2,
                clusters: 2,
                songs: 4
            }
        );
        drop(store);

        let loaded = Store::open(&path).unwrap().load_rounds().unwrap();
        let mut expected = rounds();
        expected[0].clusters.remove(1);
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_replace_overwrites_previous_import() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.db");
        let mut store = Store::create(&path).unwrap();
        store.replace_rounds(&rounds()).unwrap();
        store.replace_rounds(&rounds()[1..]).unwrap();

        let loaded = store.load_rounds().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Runde 10");
    }

    #[test]
    fn test_open_missing_store_fails() {
        let dir = TempDir::new().unwrap();
        let result = Store::open(&dir.path().join("missing.sqlite3"));
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[test]
    fn test_likes() {
        let dir = TempDir::new().unwrap();
        let likes = LikeStore::open(&dir.path().join("likes.sqlite3")).unwrap();
        assert_eq!(likes.count("Queen - We Will Rock You").unwrap(), 0);
        assert_eq!(likes.like("Queen - We Will Rock You").unwrap(), 1);
        assert_eq!(likes.like("Queen - We Will Rock You").unwrap(), 2);
        assert_eq!(likes.like("Falco - Rock Me Amadeus").unwrap(), 1);

        let all = likes.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["Queen - We Will Rock You"], 2);
    }

    #[test]
    fn test_likes_import_overwrites() {
        let dir = TempDir::new().unwrap();
        let mut likes = LikeStore::open(&dir.path().join("likes.sqlite3")).unwrap();
        likes.like("A - B").unwrap();
        let exported = BTreeMap::from([("A - B".to_string(), 7), ("C - D".to_string(), 2)]);
        assert_eq!(likes.import(&exported).unwrap(), 2);
        assert_eq!(likes.count("A - B").unwrap(), 7);
        assert_eq!(likes.like("C - D").unwrap(), 3);
    }

    #[test]
    fn test_preview_matches_import() {
        let dir = TempDir::new().unwrap();
        let mut store = Store::create(&dir.path().join("archive.sqlite3")).unwrap();
        let preview = ImportSummary::preview(&rounds());
        assert_eq!(store.replace_rounds(&rounds()).unwrap(), preview);
    }

    #[test]
    fn test_likes_share_store_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.sqlite3");
        Store::create(&path).unwrap().replace_rounds(&rounds()).unwrap();

        LikeStore::open(&path).unwrap().like("AC/DC - Highway to Hell").unwrap();
        assert_eq!(Store::open(&path).unwrap().load_rounds().unwrap().len(), 2);
    }
}
