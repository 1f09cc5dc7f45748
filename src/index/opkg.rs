// src/index/opkg.rs

//! Built-in opkg index generation
//!
//! Reads the control block out of each `.ipk` in a directory and emits the
//! textual `Packages` index: one control block per package plus the
//! `Filename`, `Size` and `SHA256sum` fields opkg clients expect, sorted
//! by package name. A package that cannot be read is skipped with a
//! warning rather than failing the whole index.

use crate::error::{Error, Result};
use crate::index::IndexGenerator;
use crate::resolver::PACKAGE_EXTENSION;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::warn;

/// Index generator that reads `.ipk` control data directly
pub struct OpkgIndexGenerator;

struct PackageEntry {
    name: String,
    control: String,
    filename: String,
    size: u64,
    sha256: String,
}

impl IndexGenerator for OpkgIndexGenerator {
    fn generate(&self, dir: &Path) -> Result<String> {
        let mut entries = Vec::new();

        for path in package_paths(dir)? {
            let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            match read_entry(&path, filename) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping {} in index: {}", filename, e),
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = String::new();
        for entry in entries {
            out.push_str(entry.control.trim_end());
            out.push('\n');
            out.push_str(&format!("Filename: {}\n", entry.filename));
            out.push_str(&format!("Size: {}\n", entry.size));
            out.push_str(&format!("SHA256sum: {}\n", entry.sha256));
            out.push('\n');
        }
        Ok(out)
    }
}

fn package_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_package = path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(PACKAGE_EXTENSION));
        if is_package {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn read_entry(path: &Path, filename: &str) -> Result<PackageEntry> {
    let control = extract_control(path)?;
    let name = field(&control, "Package")
        .ok_or_else(|| {
            Error::IndexBuild(format!("{}: control block has no Package field", filename))
        })?
        .to_string();
    let size = fs::metadata(path)?.len();
    let sha256 = file_sha256(path)?;

    Ok(PackageEntry {
        name,
        control,
        filename: filename.to_string(),
        size,
        sha256,
    })
}

/// Extract the `control` file from an `.ipk`
///
/// An ipk is a gzipped tar whose `control.tar.gz` member is itself a
/// gzipped tar containing the control block.
fn extract_control(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut outer = Archive::new(GzDecoder::new(file));

    for entry in outer.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.to_string_lossy().to_string();
        if member.trim_start_matches("./") == "control.tar.gz" {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            return control_from_tar_gz(&data, path);
        }
    }

    Err(Error::IndexBuild(format!(
        "{}: no control.tar.gz member",
        path.display()
    )))
}

fn control_from_tar_gz(data: &[u8], path: &Path) -> Result<String> {
    let mut inner = Archive::new(GzDecoder::new(data));

    for entry in inner.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.to_string_lossy().to_string();
        if member.trim_start_matches("./") == "control" {
            let mut control = String::new();
            entry.read_to_string(&mut control)?;
            return Ok(control);
        }
    }

    Err(Error::IndexBuild(format!(
        "{}: control.tar.gz has no control file",
        path.display()
    )))
}

/// Look up a single-line field in a control block
fn field<'a>(control: &'a str, name: &str) -> Option<&'a str> {
    control.lines().find_map(|line| {
        line.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
