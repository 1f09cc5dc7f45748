// src/filter.rs

//! Exclusion and architecture filtering
//!
//! Decides whether a candidate asset belongs in a source's architecture
//! bucket. The decision is data-driven: each architecture maps to an
//! allow-list of filename substrings, with a generic fallback for
//! architectures the table does not name. A rejection here is routine
//! filtering, not a failure.

use crate::catalog::PackageSource;
use crate::resolver::CandidateAsset;
use tracing::debug;

/// Per-architecture allow-lists of filename substrings
///
/// Architectures not listed here fall back to the architecture name itself
/// plus the universal-package markers, so adding an architecture to the
/// catalog needs no new code.
static ARCH_ALLOW: &[(&str, &[&str])] = &[
    // luci-i18n localization packages are always architecture-independent
    ("all", &["all", "_all_", "luci-i18n"]),
    ("x86_64", &["x86_64", "all", "_all_"]),
];

/// Universal-package markers accepted for any architecture
static UNIVERSAL_MARKERS: &[&str] = &["all", "_all_"];

/// A candidate that passed exclusion and architecture filtering
#[derive(Debug, Clone)]
pub struct AcceptedAsset {
    pub filename: String,
    pub download_url: String,

    /// Filename segment before the first `_`, the replacement key
    pub package_prefix: String,

    /// Architecture bucket this asset installs into
    pub architecture: String,
}

/// Apply exclusion keywords and architecture rules to one candidate
///
/// Returns `None` when the asset is excluded by keyword or incompatible
/// with the source's architecture.
pub fn accept(asset: &CandidateAsset, source: &PackageSource) -> Option<AcceptedAsset> {
    for keyword in &source.exclude_keywords {
        if asset.filename.contains(keyword.as_str()) {
            debug!("Excluding {} (keyword '{}')", asset.filename, keyword);
            return None;
        }
    }

    if !matches_architecture(&asset.filename, &source.architecture) {
        debug!(
            "Skipping {} (not compatible with {})",
            asset.filename, source.architecture
        );
        return None;
    }

    let package_prefix = asset
        .filename
        .split('_')
        .next()
        .unwrap_or(&asset.filename)
        .to_string();

    Some(AcceptedAsset {
        filename: asset.filename.clone(),
        download_url: asset.download_url.clone(),
        package_prefix,
        architecture: source.architecture.clone(),
    })
}

/// Check a filename against the allow-list for an architecture
fn matches_architecture(filename: &str, architecture: &str) -> bool {
    let allowed = ARCH_ALLOW
        .iter()
        .find(|(arch, _)| *arch == architecture)
        .map(|(_, list)| *list);

    match allowed {
        Some(list) => list.iter().any(|marker| filename.contains(marker)),
        None => {
            filename.contains(architecture)
                || UNIVERSAL_MARKERS
                    .iter()
                    .any(|marker| filename.contains(marker))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn source(architecture: &str, exclude: &[&str]) -> PackageSource {
        PackageSource {
            name: "test-source".to_string(),
            release_endpoint: "https://api.example.com/latest".to_string(),
            architecture: architecture.to_string(),
            exclude_keywords: exclude.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn candidate(filename: &str) -> CandidateAsset {
        CandidateAsset {
            filename: filename.to_string(),
            download_url: format!("https://dl.example.com/{}", filename),
        }
    }

    #[test]
    fn test_all_bucket_rejects_foreign_architecture() {
        let src = source("all", &[]);
        assert!(accept(&candidate("foo_1.0_x86_64.ipk"), &src).is_none());
        assert!(accept(&candidate("foo_1.0_all.ipk"), &src).is_some());
    }

    #[test]
    fn test_x86_64_bucket_accepts_both() {
        let src = source("x86_64", &[]);
        assert!(accept(&candidate("foo_1.0_x86_64.ipk"), &src).is_some());
        assert!(accept(&candidate("foo_1.0_all.ipk"), &src).is_some());
    }

    #[test]
    fn test_localization_packages_are_universal() {
        let src = source("all", &[]);
        let accepted = accept(&candidate("luci-i18n-base-ru_24.1_x.ipk"), &src);
        assert!(accepted.is_some());
    }

    #[test]
    fn test_exclusion_beats_architecture_match() {
        let src = source("all", &["dbg"]);
        assert!(accept(&candidate("foo-dbg_1.0_all.ipk"), &src).is_none());

        let src = source("x86_64", &["dbg"]);
        assert!(accept(&candidate("foo-dbg_1.0_x86_64.ipk"), &src).is_none());
    }

    #[test]
    fn test_unlisted_architecture_uses_generic_rule() {
        let src = source("mips_24kc", &[]);
        assert!(accept(&candidate("foo_1.0_mips_24kc.ipk"), &src).is_some());
        assert!(accept(&candidate("foo_1.0_all.ipk"), &src).is_some());
        assert!(accept(&candidate("foo_1.0_aarch64.ipk"), &src).is_none());
    }

    #[test]
    fn test_package_prefix_derivation() {
        let src = source("all", &[]);
        let accepted = accept(&candidate("luci-app-foo_1.2.3-r1_all.ipk"), &src).unwrap();
        assert_eq!(accepted.package_prefix, "luci-app-foo");
        assert_eq!(accepted.architecture, "all");
    }
}
