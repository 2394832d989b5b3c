//! Library error type.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A sheet that does not follow the seed / annotation / matches layout.
    #[error("Malformed sheet '{}' (line {line}): {message}", .path.display())]
    Sheet {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Fuzzy threshold must be between 0 and 100, got {0}")]
    InvalidThreshold(u32),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("No sheet files found at '{}'", .0.display())]
    NoSheets(PathBuf),

    /// Two sheet files that map to the same round name.
    #[error("Round '{name}' is defined twice: '{}' and '{}'", .first.display(), .second.display())]
    DuplicateRound {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}
