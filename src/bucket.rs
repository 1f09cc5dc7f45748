// src/bucket.rs

//! Architecture buckets and revision replacement
//!
//! A bucket is the per-architecture directory holding mirrored package
//! files and their index artifacts. Every filesystem mutation of a bucket
//! (package install, index rebuild) must hold the bucket's lock so that an
//! index never observes a half-replaced directory.

use crate::error::Result;
use crate::filter::AcceptedAsset;
use crate::resolver::{PACKAGE_EXTENSION, ReleaseClient};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// A per-architecture package directory and its mutation lock
pub struct ArchitectureBucket {
    architecture: String,
    dir: PathBuf,

    /// Serializes installs and index rebuilds for this bucket
    pub(crate) lock: Mutex<()>,
}

impl ArchitectureBucket {
    /// Open the bucket for an architecture, creating the directory on
    /// first use
    pub fn open(repo_root: &Path, architecture: &str) -> Result<Self> {
        let dir = repo_root.join(architecture);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            architecture: architecture.to_string(),
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List the package files currently in the bucket, sorted by name
    pub fn package_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_package = path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(PACKAGE_EXTENSION));
            if is_package {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Package files in the bucket belonging to a package prefix
    fn revisions_of(&self, package_prefix: &str) -> Result<Vec<PathBuf>> {
        let needle = format!("{}_", package_prefix);
        Ok(self
            .package_files()?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&needle))
            })
            .collect())
    }
}

/// Download an accepted asset and supersede any prior revision
///
/// Returns `true` if the bucket changed. An asset whose exact filename is
/// already present is a no-op without a network call; a failed download
/// leaves the bucket untouched so the asset is retried on the next run.
pub fn apply(
    client: &ReleaseClient,
    asset: &AcceptedAsset,
    bucket: &ArchitectureBucket,
    staging_dir: &Path,
) -> Result<bool> {
    let dest = bucket.dir().join(&asset.filename);
    if dest.exists() {
        debug!("{} already mirrored, skipping", asset.filename);
        return Ok(false);
    }

    info!("New revision found: {}", asset.filename);

    // The staging directory must live on the same filesystem as the
    // bucket for the final rename to stay atomic.
    let staged = staging_dir.join(&asset.filename);
    client.download_file(&asset.download_url, &staged)?;

    install_staged(bucket, &asset.package_prefix, &staged, &asset.filename)?;
    Ok(true)
}

/// Move an already-staged package file into the bucket, deleting every
/// older revision sharing its prefix
///
/// Delete-old plus rename-new runs as one critical section under the
/// bucket lock, so an index rebuild cannot interleave with it. There
/// should be at most one prior revision, but prior partial runs can leave
/// more; all of them go.
pub fn install_staged(
    bucket: &ArchitectureBucket,
    package_prefix: &str,
    staged: &Path,
    filename: &str,
) -> Result<()> {
    let _guard = bucket.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    for stale in bucket.revisions_of(package_prefix)? {
        if let Some(name) = stale.file_name().and_then(|name| name.to_str()) {
            info!("Removing superseded revision: {}", name);
        }
        fs::remove_file(&stale)?;
    }

    fs::rename(staged, bucket.dir().join(filename))?;
    Ok(())
}
