use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::progress::Progress;

const READ_BUF: usize = 1 << 20;

/// Stream `path` through SHA-256; returns 64 lowercase hex chars.
pub fn sha256_file(
    path: &Path,
    progress: Option<&Progress>,
    cancel: Option<&CancelToken>,
) -> Result<String> {
    let mut f = File::open(path).map_err(|e| Error::io(path, e))?;
    if let Some(p) = progress {
        let len = f.metadata().map(|m| m.len()).unwrap_or(0);
        p.reset_bytes(len);
    }
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        if let Some(c) = cancel {
            c.check()?;
        }
        let n = f.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        if let Some(p) = progress {
            p.add_bytes(n as u64);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// First whitespace-delimited token of checksum tool output, validated as a
/// SHA-256 hex digest and lower-cased.
pub fn parse_digest(output: &str) -> Result<String> {
    let token = output.split_whitespace().next().unwrap_or("");
    if token.len() != 64 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::BadDigest(output.trim().chars().take(200).collect()));
    }
    Ok(token.to_ascii_lowercase())
}
