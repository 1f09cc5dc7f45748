// src/index/mod.rs

//! Index artifact publishing
//!
//! Rebuilds the four artifacts of a bucket from the current directory
//! listing: the textual `Packages` index, an optional detached signature,
//! the gzip copy, and the `index.json` dashboard summary. Every artifact
//! is overwritten unconditionally; nothing is ever merged with previous
//! artifact contents.

pub mod opkg;

use crate::bucket::ArchitectureBucket;
use crate::error::{Error, Result};
use crate::sign;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Repository identity embedded in detached signatures
const SIGNER_COMMENT: &str = "Custom Repo";

/// Textual package index filename
pub const PACKAGES_FILE: &str = "Packages";

/// Gzip-compressed index filename
pub const PACKAGES_GZ_FILE: &str = "Packages.gz";

/// Detached signature filename
pub const SIGNATURE_FILE: &str = "Packages.sig";

/// Dashboard summary filename
pub const SUMMARY_FILE: &str = "index.json";

/// Dashboard summary format version
const SUMMARY_VERSION: u32 = 2;

/// Produces the textual package index for a bucket directory
///
/// The index must consist of repeating blocks carrying at least `Package:`
/// and `Version:` fields, separated by blank lines.
pub trait IndexGenerator: Send + Sync {
    fn generate(&self, dir: &Path) -> Result<String>;
}

/// Dashboard summary, a projection of the textual index
#[derive(Debug, Serialize)]
struct Summary<'a> {
    version: u32,
    architecture: &'a str,
    packages: &'a BTreeMap<String, String>,
}

/// Outcome of one index rebuild
#[derive(Debug)]
pub struct RebuildOutcome {
    /// Whether a detached signature was produced
    pub signed: bool,

    /// Package name to version, as listed by the new index
    pub packages: BTreeMap<String, String>,
}

/// Rebuilds index artifacts for buckets
pub struct IndexBuilder {
    generator: Box<dyn IndexGenerator>,
    signing_key: Option<PathBuf>,
}

impl IndexBuilder {
    pub fn new(generator: Box<dyn IndexGenerator>, signing_key: Option<PathBuf>) -> Self {
        Self {
            generator,
            signing_key,
        }
    }

    /// Regenerate all index artifacts for a bucket
    ///
    /// Holds the bucket lock for the whole rebuild so the directory
    /// listing the index describes cannot change mid-build. Must only be
    /// called after every install for the bucket in the current run has
    /// completed.
    pub fn rebuild(&self, bucket: &ArchitectureBucket) -> Result<RebuildOutcome> {
        let _guard = bucket.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        info!("Rebuilding index for {}", bucket.architecture());

        // 1. Fresh textual index from the current directory listing
        let text = self.generator.generate(bucket.dir()).map_err(|e| {
            Error::IndexBuild(format!("{}: {}", bucket.architecture(), e))
        })?;
        let packages_path = bucket.dir().join(PACKAGES_FILE);
        write_atomic(&packages_path, text.as_bytes())?;

        // 2. Detached signature; a missing key or a signing failure keeps
        // the index published, just unsigned
        let signed = match &self.signing_key {
            Some(key) if key.exists() => {
                match sign::sign_file(&packages_path, key, SIGNER_COMMENT) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to sign {} index: {}", bucket.architecture(), e);
                        false
                    }
                }
            }
            _ => {
                warn!(
                    "No signing key available, publishing {} index unsigned",
                    bucket.architecture()
                );
                false
            }
        };

        // 3. Gzip copy at maximum compression
        let gz_path = bucket.dir().join(PACKAGES_GZ_FILE);
        let tmp_gz = gz_path.with_extension("gz.tmp");
        let mut encoder = GzEncoder::new(File::create(&tmp_gz)?, Compression::best());
        encoder.write_all(text.as_bytes())?;
        encoder.finish()?;
        fs::rename(&tmp_gz, &gz_path)?;

        // 4. Dashboard summary
        let packages = parse_packages(&text);
        let summary = Summary {
            version: SUMMARY_VERSION,
            architecture: bucket.architecture(),
            packages: &packages,
        };
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| Error::IndexBuild(format!("Failed to serialize summary: {}", e)))?;
        write_atomic(&bucket.dir().join(SUMMARY_FILE), json.as_bytes())?;

        info!(
            "Index for {} lists {} packages",
            bucket.architecture(),
            packages.len()
        );
        Ok(RebuildOutcome { signed, packages })
    }
}

/// Parse `Package:`/`Version:` line pairs out of a textual index
pub fn parse_packages(text: &str) -> BTreeMap<String, String> {
    let mut packages = BTreeMap::new();
    let mut name: Option<String> = None;
    let mut version: Option<String> = None;

    for line in text.lines() {
        let line = line.trim_end();
        if let Some(value) = line.strip_prefix("Package:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Version:") {
            version = Some(value.trim().to_string());
        } else if line.is_empty() {
            if let (Some(n), Some(v)) = (name.take(), version.take()) {
                packages.insert(n, v);
            }
            name = None;
            version = None;
        }
    }

    // The last block may not end with a blank line
    if let (Some(n), Some(v)) = (name, version) {
        packages.insert(n, v);
    }

    packages
}

/// Write a file through a temp-then-rename sequence
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    /// Generator returning fixed text, for exercising the builder alone
    struct FixedGenerator(String);

    impl IndexGenerator for FixedGenerator {
        fn generate(&self, _dir: &Path) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    const INDEX_TEXT: &str = "Package: bar\nVersion: 2.0\nArchitecture: all\n\n\
                              Package: foo\nVersion: 1.1\nArchitecture: all\n\n";

    #[test]
    fn test_parse_packages_pairs() {
        let packages = parse_packages(INDEX_TEXT);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages["foo"], "1.1");
        assert_eq!(packages["bar"], "2.0");
    }

    #[test]
    fn test_parse_packages_without_trailing_blank_line() {
        let packages = parse_packages("Package: foo\nVersion: 1.1");
        assert_eq!(packages["foo"], "1.1");
    }

    #[test]
    fn test_parse_packages_skips_incomplete_blocks() {
        let packages = parse_packages("Package: nameless\n\nPackage: foo\nVersion: 1.0\n\n");
        assert_eq!(packages.len(), 1);
        assert!(packages.contains_key("foo"));
    }

    #[test]
    fn test_rebuild_without_key_publishes_unsigned() {
        let root = tempdir().unwrap();
        let bucket = ArchitectureBucket::open(root.path(), "all").unwrap();

        let builder = IndexBuilder::new(
            Box::new(FixedGenerator(INDEX_TEXT.to_string())),
            None,
        );
        let outcome = builder.rebuild(&bucket).unwrap();

        assert!(!outcome.signed);
        assert_eq!(outcome.packages.len(), 2);
        assert!(bucket.dir().join(PACKAGES_FILE).exists());
        assert!(bucket.dir().join(PACKAGES_GZ_FILE).exists());
        assert!(bucket.dir().join(SUMMARY_FILE).exists());
        assert!(!bucket.dir().join(SIGNATURE_FILE).exists());

        // Gzip copy decompresses back to the exact index text
        let mut decoder =
            GzDecoder::new(File::open(bucket.dir().join(PACKAGES_GZ_FILE)).unwrap());
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, INDEX_TEXT);

        // Summary carries the fixed format version and the package map
        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(bucket.dir().join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["version"], 2);
        assert_eq!(summary["architecture"], "all");
        assert_eq!(summary["packages"]["foo"], "1.1");
    }

    #[test]
    fn test_rebuild_with_key_signs_index() {
        let root = tempdir().unwrap();
        let bucket = ArchitectureBucket::open(root.path(), "all").unwrap();

        let basename = root.path().join("repo");
        sign::generate_keypair(&basename, "test repo").unwrap();

        let builder = IndexBuilder::new(
            Box::new(FixedGenerator(INDEX_TEXT.to_string())),
            Some(basename.with_extension("key")),
        );
        let outcome = builder.rebuild(&bucket).unwrap();

        assert!(outcome.signed);
        let sig_path = bucket.dir().join(SIGNATURE_FILE);
        assert!(sig_path.exists());
        assert!(
            sign::verify_file(
                &bucket.dir().join(PACKAGES_FILE),
                &sig_path,
                &basename.with_extension("pub"),
            )
            .unwrap()
        );
    }

    #[test]
    fn test_rebuild_overwrites_previous_artifacts() {
        let root = tempdir().unwrap();
        let bucket = ArchitectureBucket::open(root.path(), "all").unwrap();
        fs::write(bucket.dir().join(PACKAGES_FILE), "Package: stale\nVersion: 0\n").unwrap();

        let builder = IndexBuilder::new(
            Box::new(FixedGenerator(INDEX_TEXT.to_string())),
            None,
        );
        builder.rebuild(&bucket).unwrap();

        let text = fs::read_to_string(bucket.dir().join(PACKAGES_FILE)).unwrap();
        assert!(!text.contains("stale"));
    }
}
