//! Safety checks before a store file is created or overwritten.
//!
//! `push-store` rewrites its output database; these checks keep it from
//! clobbering the round sheets it was pointed at.

use anyhow::{bail, Result};
use std::path::Path;

use crate::sheet::SHEET_EXTENSIONS;

/// Extensions accepted for a store database.
pub const STORE_EXTENSIONS: [&str; 3] = ["sqlite", "sqlite3", "db"];

/// Validates that a store path is safe to write.
///
/// Checks:
/// - the file has a database extension (never a sheet extension)
/// - it is not one of the source paths
pub fn validate_store_path(output: &Path, source_paths: &[&Path]) -> Result<()> {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if SHEET_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Safety check failed: output '{}' looks like a round sheet",
            output.display()
        );
    }

    if !STORE_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Safety check failed: output '{}' must end in one of: {}",
            output.display(),
            STORE_EXTENSIONS.join(", ")
        );
    }

    for source in source_paths {
        if output == *source {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_store_path() {
        let output = PathBuf::from("/tmp/archive.sqlite3");
        let source = PathBuf::from("/data/runden");
        assert!(validate_store_path(&output, &[&source]).is_ok());
        assert!(validate_store_path(&PathBuf::from("/tmp/archive.DB"), &[]).is_ok());
    }

    #[test]
    fn test_sheet_extension_blocked() {
        let output = PathBuf::from("/data/runden/Runde 1.tsv");
        let result = validate_store_path(&output, &[]);
        assert!(result.unwrap_err().to_string().contains("looks like a round sheet"));
    }

    #[test]
    fn test_missing_extension() {
        let result = validate_store_path(&PathBuf::from("/tmp/archive"), &[]);
        assert!(result.unwrap_err().to_string().contains("must end in one of"));
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/archive.sqlite3");
        let result = validate_store_path(&path, &[&path]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }
}
