// src/catalog.rs

//! Source catalog loading
//!
//! The catalog is a JSON list of package sources. Each source names the
//! release endpoint to query, the architecture bucket it feeds, and an
//! optional set of exclusion keywords. The catalog is loaded once at the
//! start of a run and is read-only afterwards.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// A single package source from the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct PackageSource {
    /// Human-readable source name, used in logs and run summaries
    pub name: String,

    /// Release-listing endpoint, queried once per run
    pub release_endpoint: String,

    /// Architecture bucket this source feeds
    pub architecture: String,

    /// Assets whose filename contains any of these keywords are skipped
    #[serde(default)]
    pub exclude_keywords: BTreeSet<String>,
}

/// Load the source catalog from a JSON file
///
/// Fails with a `Config` error if the file is missing, does not parse, or
/// any record lacks a required field. No side effects.
pub fn load(path: &Path) -> Result<Vec<PackageSource>> {
    debug!("Loading source catalog from {}", path.display());

    let raw = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read catalog {}: {}", path.display(), e))
    })?;

    let sources: Vec<PackageSource> = serde_json::from_str(&raw).map_err(|e| {
        Error::Config(format!("Failed to parse catalog {}: {}", path.display(), e))
    })?;

    for source in &sources {
        if source.name.is_empty()
            || source.release_endpoint.is_empty()
            || source.architecture.is_empty()
        {
            return Err(Error::Config(format!(
                "Source '{}' is missing a required field (name, release_endpoint, architecture)",
                source.name
            )));
        }
    }

    debug!("Loaded {} sources", sources.len());
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_catalog(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_catalog() {
        let file = write_catalog(
            r#"[
                {
                    "name": "luci-app-example",
                    "release_endpoint": "https://api.example.com/releases/latest",
                    "architecture": "all",
                    "exclude_keywords": ["dbg", "src"]
                },
                {
                    "name": "example-daemon",
                    "release_endpoint": "https://api.example.com/daemon/latest",
                    "architecture": "x86_64"
                }
            ]"#,
        );

        let sources = load(file.path()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "luci-app-example");
        assert_eq!(sources[0].architecture, "all");
        assert!(sources[0].exclude_keywords.contains("dbg"));

        // exclude_keywords defaults to an empty set
        assert!(sources[1].exclude_keywords.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load(Path::new("/nonexistent/repo_sources.json"));
        assert!(matches!(result.unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn test_load_invalid_json() {
        let file = write_catalog("{ not a list");
        let result = load(file.path());
        assert!(matches!(result.unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn test_load_missing_required_field() {
        let file = write_catalog(
            r#"[{"name": "x", "release_endpoint": "", "architecture": "all"}]"#,
        );
        let result = load(file.path());
        assert!(matches!(result.unwrap_err(), Error::Config(_)));
    }
}
