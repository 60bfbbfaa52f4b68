use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{info, warn};
use md5::{Digest, Md5};

const READ_CHUNK: usize = 16 * 1024;

/// Expansion package the engine needs before it may start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSpec {
    pub path: PathBuf,
    /// Expected MD5, hex.
    pub md5: String,
    /// Store key for the fetch collaborator.
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    Valid,
    Missing,
    Corrupt,
}

/// Lowercase hex MD5 of a file, streamed in fixed-size chunks.
pub fn md5_hex(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

/// Unreadable files count as corrupt.
pub fn verify_package(spec: &AssetSpec) -> Integrity {
    if !spec.path.is_file() {
        return Integrity::Missing;
    }

    match md5_hex(&spec.path) {
        Ok(actual) if actual.eq_ignore_ascii_case(spec.md5.trim()) => Integrity::Valid,
        Ok(actual) => {
            warn!(
                "package checksum mismatch: path={:?} expected={} actual={actual}",
                spec.path, spec.md5
            );
            Integrity::Corrupt
        }
        Err(e) => {
            warn!("package unreadable: path={:?} err={e}", spec.path);
            Integrity::Corrupt
        }
    }
}

/// Verifies the package and deletes it when corrupt, so the fetcher starts clean.
pub fn ensure_package(spec: &AssetSpec) -> Integrity {
    let integrity = verify_package(spec);
    if integrity == Integrity::Corrupt {
        match fs::remove_file(&spec.path) {
            Ok(()) => info!("deleted corrupt package {:?}", spec.path),
            Err(e) => warn!("could not delete corrupt package {:?}: {e}", spec.path),
        }
    }
    integrity
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// Nothing to download; proceed with startup.
    Present,
    /// Download started; completion arrives through the bridge later.
    Fetching,
    Failed(String),
}

/// Download collaborator for the expansion package.
pub trait AssetFetcher {
    fn fetch_if_needed(&mut self, expected: &AssetSpec) -> FetchStatus;
}
