//! Subplebbit signing seed persistence.
//!
//! The seed is stored as 64 hex characters. Losing it means losing the
//! subplebbit address.

use std::path::Path;

use plebwire_crypto::signing::Keypair;
use zeroize::Zeroize;

/// Loads the seed at `path`, or generates and writes a fresh one.
pub fn load_or_create(path: &Path) -> Result<Keypair, String> {
    if path.exists() {
        let keypair = load(path)?;
        tracing::info!(path = %path.display(), "signing seed loaded");
        return Ok(keypair);
    }

    let keypair = Keypair::generate();
    save(path, &keypair)?;
    tracing::info!(path = %path.display(), "new signing seed written");
    Ok(keypair)
}

pub fn load(path: &Path) -> Result<Keypair, String> {
    let mut text = std::fs::read_to_string(path).map_err(|e| format!("failed to read seed file: {e}"))?;
    let decoded = hex::decode(text.trim());
    text.zeroize();
    let mut bytes = decoded.map_err(|e| format!("seed file is not hex: {e}"))?;

    let seed: Result<[u8; 32], _> = bytes.as_slice().try_into();
    let len = bytes.len();
    bytes.zeroize();
    let mut seed = seed.map_err(|_| format!("seed must be 32 bytes, found {len}"))?;
    let keypair = Keypair::from_seed(&seed);
    seed.zeroize();
    Ok(keypair)
}

pub fn save(path: &Path, keypair: &Keypair) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("failed to create seed directory: {e}"))?;
    }
    let mut seed = keypair.seed_bytes();
    let mut text = hex::encode(seed);
    seed.zeroize();
    let written = std::fs::write(path, &text).map_err(|e| format!("failed to write seed file: {e}"));
    text.zeroize();
    written?;
    restrict_permissions(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| format!("failed to restrict seed file permissions: {e}"))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), String> {
    Ok(())
}
