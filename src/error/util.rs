//! Utility functions for error handling
//!
//! Startup inputs (configuration, dictionaries, vocabularies) are opened
//! through these helpers so that a failure names the file and its purpose.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{CohortError, Result};

/// Safely open a file with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(CohortError::config_file(
            path,
            format!("file not found (needed for {purpose})"),
        ));
    }

    if !path.is_file() {
        return Err(CohortError::config_file(
            path,
            format!("path is not a file (expected for {purpose})"),
        ));
    }

    fs::File::open(path).map_err(|e| {
        let context = match e.kind() {
            io::ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => format!("failed to open file for {purpose}: {e}"),
        };
        CohortError::config_file(path, context)
    })
}

/// Check that a directory exists and is readable
pub fn validate_directory(path: &Path, purpose: &str) -> Result<()> {
    if !path.is_dir() {
        return Err(CohortError::config_file(
            path,
            format!("directory not found (needed for {purpose})"),
        ));
    }

    fs::read_dir(path)
        .map(|_| ())
        .map_err(|e| CohortError::config_file(path, format!("failed to access directory: {e}")))
}

/// Parse a JSON file into `T`, reporting failures as configuration errors
pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path, purpose: &str) -> Result<T> {
    let file = safe_open_file(path, purpose)?;
    serde_json::from_reader(io::BufReader::new(file))
        .map_err(|e| CohortError::config_file(path, format!("invalid JSON for {purpose}: {e}")))
}
