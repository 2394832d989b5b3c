#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Two rounds. Column D of "Runde 1" has no seed, so "Lost - Song" is never
/// indexed.
pub const RUNDE_1: &str = "\tAC/DC - Highway to Hell\tFalco - Rock Me Amadeus\t\n\
                           \tAusgangssong von: John\tAusgangssong von: Lisa\t\n\
                           Emma\tLed Zeppelin - Whole Lotta Love\tQueen - We Will Rock You\tLost - Song\n\
                           Max\tQueen-We Will Rock You\t\t\n";

pub const RUNDE_2: &str = "\tQueen - We Will Rock You\n\
                           \tAusgangssong von: Emma\n\
                           John\tFalco – Rock Me Amadeus\n";

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let sheets = dir.path().join("runden");
        fs::create_dir(&sheets).unwrap();
        fs::write(sheets.join("Runde 1.tsv"), RUNDE_1).unwrap();
        fs::write(sheets.join("Runde 2.tsv"), RUNDE_2).unwrap();
        Self { dir }
    }

    pub fn sheets(&self) -> PathBuf {
        self.dir.path().join("runden")
    }

    pub fn store(&self) -> PathBuf {
        self.dir.path().join("archive.sqlite3")
    }
}

/// A binary of this package with the configuration environment cleared.
pub fn bin(name: &str) -> Command {
    let mut cmd = Command::cargo_bin(name).unwrap();
    cmd.env_remove("SONGMATCH_SHEETS")
        .env_remove("SONGMATCH_STORE")
        .env_remove("SONGMATCH_LIKES")
        .env_remove("RUST_LOG");
    cmd
}
