// src/sign.rs

//! usign-compatible detached signatures
//!
//! Keys and signatures use the signify/usign container: an
//! `untrusted comment:` line followed by one base64 line of packed binary
//! fields. Only the Ed25519 algorithm (tag `Ed`) exists in this format.
//! Signatures produced here verify with stock `usign -V`, and opkg clients
//! accept the resulting `Packages.sig`.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Algorithm tag used by signify/usign for Ed25519
const PK_ALGO: [u8; 2] = *b"Ed";

/// Key fingerprint length in bytes
const FINGERPRINT_LEN: usize = 8;

/// Packed secret key layout: pkalg(2) kdfalg(2) kdfrounds(4) salt(16)
/// checksum(8) fingerprint(8) seckey(64: seed + pubkey)
const SECRET_LEN: usize = 104;

/// Packed public key layout: pkalg(2) fingerprint(8) pubkey(32)
const PUBLIC_LEN: usize = 42;

/// Packed signature layout: pkalg(2) fingerprint(8) sig(64)
const SIG_LEN: usize = 74;

/// A loaded usign secret key
#[derive(Debug)]
pub struct SecretKey {
    fingerprint: [u8; FINGERPRINT_LEN],
    key: SigningKey,
}

impl SecretKey {
    /// Hex form of the 8-byte key fingerprint
    pub fn fingerprint_hex(&self) -> String {
        hex(&self.fingerprint)
    }
}

/// Load a usign secret key file
pub fn load_secret(path: &Path) -> Result<SecretKey> {
    let raw = read_container(path)?;
    if raw.len() != SECRET_LEN {
        return Err(Error::Signing(format!(
            "{}: unexpected secret key size: {} bytes",
            path.display(),
            raw.len()
        )));
    }
    check_algo(&raw, path)?;

    let mut fingerprint = [0u8; FINGERPRINT_LEN];
    fingerprint.copy_from_slice(&raw[32..40]);

    // seckey is seed + pubkey; only the 32-byte seed is needed
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&raw[40..72]);

    Ok(SecretKey {
        fingerprint,
        key: SigningKey::from_bytes(&seed),
    })
}

/// Load a usign public key file, returning the fingerprint and verify key
pub fn load_public(path: &Path) -> Result<([u8; FINGERPRINT_LEN], VerifyingKey)> {
    let raw = read_container(path)?;
    if raw.len() != PUBLIC_LEN {
        return Err(Error::Signing(format!(
            "{}: unexpected public key size: {} bytes",
            path.display(),
            raw.len()
        )));
    }
    check_algo(&raw, path)?;

    let mut fingerprint = [0u8; FINGERPRINT_LEN];
    fingerprint.copy_from_slice(&raw[2..10]);

    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&raw[10..42]);
    let key = VerifyingKey::from_bytes(&pubkey)
        .map_err(|e| Error::Signing(format!("{}: invalid public key: {}", path.display(), e)))?;

    Ok((fingerprint, key))
}

/// Produce a detached signature for a file
///
/// The signature lands next to the file as `<name>.sig`, carrying the
/// signer comment and the key fingerprint in its comment line.
pub fn sign_file(file: &Path, key_path: &Path, comment: &str) -> Result<()> {
    let secret = load_secret(key_path)?;
    let message = fs::read(file)?;
    let signature = secret.key.sign(&message);

    let mut raw = Vec::with_capacity(SIG_LEN);
    raw.extend_from_slice(&PK_ALGO);
    raw.extend_from_slice(&secret.fingerprint);
    raw.extend_from_slice(&signature.to_bytes());

    let sig_path = sig_path_for(file);
    let contents = format!(
        "untrusted comment: {} signed by key {}\n{}\n",
        comment,
        secret.fingerprint_hex(),
        BASE64.encode(&raw)
    );
    fs::write(&sig_path, contents)?;

    debug!("Signed {} -> {}", file.display(), sig_path.display());
    Ok(())
}

/// Verify a detached signature against a public key file
///
/// Returns `Ok(false)` for a well-formed signature that does not match;
/// malformed inputs and fingerprint mismatches are errors.
pub fn verify_file(file: &Path, sig_path: &Path, pubkey_path: &Path) -> Result<bool> {
    let (fingerprint, key) = load_public(pubkey_path)?;

    let raw = read_container(sig_path)?;
    if raw.len() != SIG_LEN {
        return Err(Error::Signing(format!(
            "{}: unexpected signature size: {} bytes",
            sig_path.display(),
            raw.len()
        )));
    }
    check_algo(&raw, sig_path)?;

    if raw[2..10] != fingerprint {
        return Err(Error::Signing(format!(
            "Key fingerprint mismatch: {} != {}",
            hex(&raw[2..10]),
            hex(&fingerprint)
        )));
    }

    let mut sig_bytes = [0u8; 64];
    sig_bytes.copy_from_slice(&raw[10..74]);
    let signature = Signature::from_bytes(&sig_bytes);

    let message = fs::read(file)?;
    Ok(key.verify(&message, &signature).is_ok())
}

/// Generate a usign-compatible Ed25519 keypair
///
/// Writes `<basename>.key` (secret, unencrypted) and `<basename>.pub`,
/// and returns the fingerprint in hex.
pub fn generate_keypair(basename: &Path, comment: &str) -> Result<String> {
    let mut seed = [0u8; 32];
    rand::rng().fill_bytes(&mut seed);
    let signing_key = SigningKey::from_bytes(&seed);
    let pubkey = signing_key.verifying_key().to_bytes();

    let mut fingerprint = [0u8; FINGERPRINT_LEN];
    rand::rng().fill_bytes(&mut fingerprint);

    // Secret container: unencrypted, so kdf fields and checksum stay zero
    let mut secret_raw = Vec::with_capacity(SECRET_LEN);
    secret_raw.extend_from_slice(&PK_ALGO);
    secret_raw.extend_from_slice(&[0u8; 2]); // kdfalg
    secret_raw.extend_from_slice(&[0u8; 4]); // kdfrounds
    secret_raw.extend_from_slice(&[0u8; 16]); // salt
    secret_raw.extend_from_slice(&[0u8; 8]); // checksum
    secret_raw.extend_from_slice(&fingerprint);
    secret_raw.extend_from_slice(&seed);
    secret_raw.extend_from_slice(&pubkey);

    let mut public_raw = Vec::with_capacity(PUBLIC_LEN);
    public_raw.extend_from_slice(&PK_ALGO);
    public_raw.extend_from_slice(&fingerprint);
    public_raw.extend_from_slice(&pubkey);

    let key_path = PathBuf::from(format!("{}.key", basename.display()));
    let pub_path = PathBuf::from(format!("{}.pub", basename.display()));

    fs::write(
        &key_path,
        format!(
            "untrusted comment: {} secret key\n{}\n",
            comment,
            BASE64.encode(&secret_raw)
        ),
    )?;
    fs::write(
        &pub_path,
        format!(
            "untrusted comment: {} public key\n{}\n",
            comment,
            BASE64.encode(&public_raw)
        ),
    )?;

    Ok(hex(&fingerprint))
}

/// Signature path for a file: `Packages` -> `Packages.sig`
pub fn sig_path_for(file: &Path) -> PathBuf {
    let mut name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".sig");
    file.with_file_name(name)
}

/// Decode the base64 payload of a signify/usign container file
fn read_container(path: &Path) -> Result<Vec<u8>> {
    let contents = fs::read_to_string(path)?;
    let mut lines = contents.lines();

    let header = lines.next().unwrap_or_default();
    if !header.starts_with("untrusted comment:") {
        return Err(Error::Signing(format!(
            "{}: missing untrusted comment header",
            path.display()
        )));
    }

    let payload = lines.next().ok_or_else(|| {
        Error::Signing(format!("{}: missing base64 payload line", path.display()))
    })?;
    BASE64
        .decode(payload.trim())
        .map_err(|e| Error::Signing(format!("{}: invalid base64 payload: {}", path.display(), e)))
}

fn check_algo(raw: &[u8], path: &Path) -> Result<()> {
    if raw[0..2] != PK_ALGO {
        return Err(Error::Signing(format!(
            "{}: unsupported algorithm tag {:?}",
            path.display(),
            &raw[0..2]
        )));
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_keygen_sign_verify_roundtrip() {
        let dir = tempdir().unwrap();
        let basename = dir.path().join("repo");
        let fingerprint = generate_keypair(&basename, "test repo").unwrap();
        assert_eq!(fingerprint.len(), 16);

        let file = dir.path().join("Packages");
        fs::write(&file, b"Package: foo\nVersion: 1.0\n").unwrap();

        let key_path = dir.path().join("repo.key");
        let pub_path = dir.path().join("repo.pub");
        sign_file(&file, &key_path, "Custom Repo").unwrap();

        let sig_path = dir.path().join("Packages.sig");
        assert!(sig_path.exists());
        assert!(verify_file(&file, &sig_path, &pub_path).unwrap());
    }

    #[test]
    fn test_tampered_file_fails_verification() {
        let dir = tempdir().unwrap();
        let basename = dir.path().join("repo");
        generate_keypair(&basename, "test repo").unwrap();

        let file = dir.path().join("Packages");
        fs::write(&file, b"original contents").unwrap();
        sign_file(&file, &dir.path().join("repo.key"), "Custom Repo").unwrap();

        fs::write(&file, b"tampered contents").unwrap();
        let verified = verify_file(
            &file,
            &dir.path().join("Packages.sig"),
            &dir.path().join("repo.pub"),
        )
        .unwrap();
        assert!(!verified);
    }

    #[test]
    fn test_signature_comment_carries_fingerprint() {
        let dir = tempdir().unwrap();
        let basename = dir.path().join("repo");
        generate_keypair(&basename, "test repo").unwrap();

        let file = dir.path().join("Packages");
        fs::write(&file, b"index").unwrap();
        sign_file(&file, &dir.path().join("repo.key"), "Custom Repo").unwrap();

        let secret = load_secret(&dir.path().join("repo.key")).unwrap();
        let sig = fs::read_to_string(dir.path().join("Packages.sig")).unwrap();
        assert!(sig.starts_with("untrusted comment: Custom Repo signed by key"));
        assert!(sig.contains(&secret.fingerprint_hex()));
    }

    #[test]
    fn test_load_rejects_bad_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.key");
        fs::write(&path, "no header here\nAAAA\n").unwrap();
        assert!(matches!(load_secret(&path).unwrap_err(), Error::Signing(_)));
    }

    #[test]
    fn test_load_rejects_truncated_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.key");
        fs::write(
            &path,
            format!("untrusted comment: x\n{}\n", BASE64.encode(b"Ed")),
        )
        .unwrap();
        assert!(matches!(load_secret(&path).unwrap_err(), Error::Signing(_)));
    }
}
