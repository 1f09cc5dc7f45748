// src/orchestrator.rs

//! Run orchestration
//!
//! Iterates the source catalog, pushes every source through the
//! resolve/filter/replace pipeline, and rebuilds the index once per dirty
//! bucket after all sources have been processed. Sources are independent
//! and run in parallel; buckets are the shared resource and every mutation
//! of one is serialized by its lock. Failures are contained at the
//! smallest unit: one asset, one source, one bucket.

use crate::bucket::{self, ArchitectureBucket};
use crate::catalog::{self, PackageSource};
use crate::error::Result;
use crate::filter;
use crate::index::IndexBuilder;
use crate::resolver::ReleaseClient;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Cooperative run-level cancellation
///
/// Checked between sources and between assets. An install or rebuild
/// already inside a bucket's critical section always runs to completion,
/// so cancellation never leaves a bucket mid-replacement.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Structured outcome of one run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// RFC 3339 timestamp of when the run started
    pub started: String,
    pub sources_checked: usize,
    pub assets_installed: usize,
    pub buckets_rebuilt: usize,

    /// Every skip, failure and unsigned-index condition, one line each
    pub warnings: Vec<String>,
}

/// Drives the full sync-and-publish pipeline
pub struct Orchestrator {
    repo_root: PathBuf,
    client: ReleaseClient,
    index: IndexBuilder,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(repo_root: PathBuf, index: IndexBuilder) -> Result<Self> {
        Ok(Self {
            repo_root,
            client: ReleaseClient::new()?,
            index,
            cancel: CancelToken::new(),
        })
    }

    /// Token for cancelling this orchestrator's runs from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Sync every source in the catalog, then rebuild dirty buckets
    ///
    /// A bucket touched by several sources is rebuilt exactly once, after
    /// all sources have been processed. Only a catalog failure aborts the
    /// run; everything else is contained and reported in the summary.
    pub fn run(&self, catalog_path: &Path) -> Result<RunSummary> {
        let started = chrono::Utc::now().to_rfc3339();
        let sources = catalog::load(catalog_path)?;
        info!("Starting sync for {} sources", sources.len());

        fs::create_dir_all(&self.repo_root)?;

        // Staging lives inside the repo root so the final rename into a
        // bucket stays on one filesystem; dropped (and deleted) on return
        let staging = tempfile::Builder::new()
            .prefix(".staging")
            .tempdir_in(&self.repo_root)?;

        let buckets = self.open_buckets(&sources)?;

        let sources_checked = AtomicUsize::new(0);
        let assets_installed = AtomicUsize::new(0);
        let dirty: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());
        let warnings: Mutex<Vec<String>> = Mutex::new(Vec::new());

        sources.par_iter().for_each(|source| {
            if self.cancel.is_cancelled() {
                return;
            }
            sources_checked.fetch_add(1, Ordering::Relaxed);

            let bucket = &buckets[&source.architecture];
            match self.sync_source(source, bucket, staging.path(), &warnings) {
                Ok(installed) => {
                    if installed > 0 {
                        assets_installed.fetch_add(installed, Ordering::Relaxed);
                        lock(&dirty).insert(source.architecture.clone());
                    }
                }
                Err(e) => {
                    warn!("Skipping source {}: {}", source.name, e);
                    lock(&warnings).push(format!("{}: {}", source.name, e));
                }
            }
        });

        let dirty = dirty.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut warnings = warnings
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut buckets_rebuilt = 0;
        for architecture in &dirty {
            if self.cancel.is_cancelled() {
                info!("Run cancelled, skipping remaining rebuilds");
                break;
            }
            if self.rebuild_bucket(&buckets[architecture], &mut warnings) {
                buckets_rebuilt += 1;
            }
        }

        let summary = RunSummary {
            started,
            sources_checked: sources_checked.into_inner(),
            assets_installed: assets_installed.into_inner(),
            buckets_rebuilt,
            warnings,
        };
        info!(
            "Run complete: {} sources checked, {} assets installed, {} buckets rebuilt",
            summary.sources_checked, summary.assets_installed, summary.buckets_rebuilt
        );
        Ok(summary)
    }

    /// Rebuild index artifacts for every architecture the catalog names,
    /// without syncing anything
    ///
    /// Architectures whose bucket directory does not exist yet are skipped
    /// with a warning; rebuilding an unchanged bucket is wasted work but
    /// not incorrect.
    pub fn publish(&self, catalog_path: &Path) -> Result<RunSummary> {
        let started = chrono::Utc::now().to_rfc3339();
        let sources = catalog::load(catalog_path)?;

        let architectures: BTreeSet<&str> =
            sources.iter().map(|s| s.architecture.as_str()).collect();

        let mut warnings = Vec::new();
        let mut buckets_rebuilt = 0;
        for architecture in architectures {
            if !self.repo_root.join(architecture).is_dir() {
                warn!("No bucket directory for {}, skipping", architecture);
                warnings.push(format!("{}: bucket directory does not exist", architecture));
                continue;
            }
            let bucket = ArchitectureBucket::open(&self.repo_root, architecture)?;
            if self.rebuild_bucket(&bucket, &mut warnings) {
                buckets_rebuilt += 1;
            }
        }

        Ok(RunSummary {
            started,
            sources_checked: 0,
            assets_installed: 0,
            buckets_rebuilt,
            warnings,
        })
    }

    /// One shared bucket handle (and lock) per architecture in the catalog
    fn open_buckets(
        &self,
        sources: &[PackageSource],
    ) -> Result<BTreeMap<String, Arc<ArchitectureBucket>>> {
        let mut buckets = BTreeMap::new();
        for source in sources {
            if !buckets.contains_key(&source.architecture) {
                buckets.insert(
                    source.architecture.clone(),
                    Arc::new(ArchitectureBucket::open(
                        &self.repo_root,
                        &source.architecture,
                    )?),
                );
            }
        }
        Ok(buckets)
    }

    /// Resolve one source and install its accepted assets
    ///
    /// Returns the number of installed assets. A resolve failure is the
    /// source's failure and propagates; a download failure is the asset's
    /// failure, recorded as a warning so the rest of the source proceeds.
    fn sync_source(
        &self,
        source: &PackageSource,
        bucket: &ArchitectureBucket,
        staging: &Path,
        warnings: &Mutex<Vec<String>>,
    ) -> Result<usize> {
        let candidates = self.client.resolve(source)?;

        let mut installed = 0;
        for candidate in &candidates {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(accepted) = filter::accept(candidate, source) else {
                continue;
            };
            match bucket::apply(&self.client, &accepted, bucket, staging) {
                Ok(true) => installed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Skipping asset {}: {}", accepted.filename, e);
                    lock(warnings).push(format!("{}: {}", accepted.filename, e));
                }
            }
        }
        Ok(installed)
    }

    /// Rebuild one bucket, containing any failure to that bucket
    fn rebuild_bucket(&self, bucket: &ArchitectureBucket, warnings: &mut Vec<String>) -> bool {
        match self.index.rebuild(bucket) {
            Ok(outcome) => {
                if !outcome.signed {
                    warnings.push(format!(
                        "{}: index published unsigned",
                        bucket.architecture()
                    ));
                }
                true
            }
            Err(e) => {
                // The bucket keeps its previous index artifacts, stale
                // until the next successful run
                warn!("Index rebuild failed for {}: {}", bucket.architecture(), e);
                warnings.push(format!("{}: {}", bucket.architecture(), e));
                false
            }
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_run_summary_serializes() {
        let summary = RunSummary {
            started: "2025-01-01T00:00:00+00:00".to_string(),
            sources_checked: 2,
            assets_installed: 1,
            buckets_rebuilt: 1,
            warnings: vec!["all: index published unsigned".to_string()],
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"sources_checked\":2"));
        assert!(json.contains("index published unsigned"));
    }
}
