// src/artifact/hash.rs

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::errors::Result;

/// Content identifier of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    /// Subresource-integrity string, `sha256-<base64 digest>`.
    pub sri: String,
    /// URL-safe base64 of the SRI string, used as the registry lookup key.
    pub urlsafe: String,
}

impl ContentHash {
    pub fn from_digest(digest: &[u8]) -> Self {
        let sri = format!("sha256-{}", STANDARD.encode(digest));
        let urlsafe = urlsafe_token(&sri);
        Self { sri, urlsafe }
    }
}

/// Registry lookup key for an SRI string.
pub fn urlsafe_token(sri: &str) -> String {
    URL_SAFE.encode(sri.as_bytes())
}

/// Hash a file by streaming it through SHA-256.
pub fn content_id(path: &Path) -> Result<ContentHash> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(ContentHash::from_digest(&hasher.finalize()))
}
