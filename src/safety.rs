//! Guards for files the tools overwrite.
//!
//! Review files are written next to the database they describe, so a typo in
//! an output argument must never clobber the database or the review file
//! being read.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions that mark a SQLite database.
const DATABASE_EXTENSIONS: &[&str] = &["sqlite3", "sqlite", "db"];

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - the file name contains `required_pattern` (e.g. "enrichment")
/// - the file is not a database by extension
/// - the file is none of `protected` (the database, the input review file)
pub fn validate_output_path(output: &Path, required_pattern: &str, protected: &[&Path]) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if DATABASE_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Safety check failed: output '{}' looks like a database file",
            output.display()
        );
    }

    for path in protected {
        if same_file(output, path) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as '{}'",
                output.display(),
                path.display()
            );
        }
    }

    Ok(())
}
