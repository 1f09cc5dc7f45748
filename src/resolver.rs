// src/resolver.rs

//! Release resolution and asset download
//!
//! This module provides functionality for:
//! - Querying a source's release-listing endpoint for candidate assets
//! - Downloading assets with retry support
//!
//! One HTTP client is shared across a run. Release endpoints return a JSON
//! document with an `assets` list; an error response is recognized by
//! carrying a `message` field instead of assets. Downloads always go
//! through a temp-file-then-rename sequence so a partial transfer never
//! lands under a final name.

use crate::catalog::PackageSource;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Package file extension accepted from release listings
pub const PACKAGE_EXTENSION: &str = ".ipk";

/// One downloadable asset from a release listing
#[derive(Debug, Clone)]
pub struct CandidateAsset {
    pub filename: String,
    pub download_url: String,
}

/// Release-listing response shape
#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
    /// Error payloads carry a message instead of an asset list
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

/// HTTP client wrapper with retry support
pub struct ReleaseClient {
    client: Client,
    max_retries: u32,
}

impl ReleaseClient {
    /// Create a new release client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("opkgmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Resolve(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Resolve the current release assets for one source
    ///
    /// Issues one request to the source's release endpoint, following
    /// redirects. A failure here is contained to the source; the caller
    /// logs it and moves on to other sources.
    pub fn resolve(&self, source: &PackageSource) -> Result<Vec<CandidateAsset>> {
        info!(
            "Resolving release assets for {} ({})",
            source.name, source.architecture
        );

        let body = self
            .client
            .get(&source.release_endpoint)
            .send()
            .and_then(|response| response.text())
            .map_err(|e| {
                Error::Resolve(format!(
                    "Request to {} failed: {}",
                    source.release_endpoint, e
                ))
            })?;

        let assets = parse_release_body(&body)?;
        debug!("{}: {} candidate package assets", source.name, assets.len());
        Ok(assets)
    }

    /// Download a file to the specified path with retry support
    ///
    /// Writes into `<dest>.tmp` first and renames on success, so a partial
    /// transfer never appears under the final name.
    pub fn download_file(&self, url: &str, dest_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Download(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::Download(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    // Write to temporary file first
                    let temp_path = dest_path.with_extension("tmp");
                    let mut file = File::create(&temp_path).map_err(|e| {
                        Error::Download(format!(
                            "Failed to create file {}: {}",
                            temp_path.display(),
                            e
                        ))
                    })?;

                    io::copy(&mut response, &mut file).map_err(|e| {
                        Error::Download(format!("Failed to write downloaded data: {}", e))
                    })?;

                    // Atomic rename from temp to final destination
                    fs::rename(&temp_path, dest_path).map_err(|e| {
                        Error::Download(format!(
                            "Failed to move {} to {}: {}",
                            temp_path.display(),
                            dest_path.display(),
                            e
                        ))
                    })?;

                    debug!("Downloaded {}", dest_path.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Download(format!(
                            "Failed to download after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

/// Parse a release-listing body into candidate assets
///
/// Only assets with the package extension survive; other extensions are
/// silently dropped. An empty body or an error payload is a resolve
/// failure.
pub fn parse_release_body(body: &str) -> Result<Vec<CandidateAsset>> {
    if body.trim().is_empty() {
        return Err(Error::Resolve(
            "Empty response from release endpoint".to_string(),
        ));
    }

    let release: ReleaseResponse = serde_json::from_str(body)
        .map_err(|e| Error::Resolve(format!("Failed to parse release listing: {}", e)))?;

    if release.assets.is_empty() {
        if let Some(message) = release.message {
            return Err(Error::Resolve(format!(
                "Release endpoint returned an error: {}",
                message
            )));
        }
    }

    Ok(release
        .assets
        .into_iter()
        .filter(|asset| asset.name.ends_with(PACKAGE_EXTENSION))
        .map(|asset| CandidateAsset {
            filename: asset.name,
            download_url: asset.browser_download_url,
        })
        .collect())
}
