use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identity for an image, shared by both persisted tables.
///
/// The key is the hex SHA-256 of the reference *path string*, not the file
/// bytes. Renaming or moving a file therefore changes its identity and orphans
/// its rows; that semantic is kept on purpose so that identity never requires
/// reading file content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(String);

impl ImageKey {
    /// Wraps an already hex-encoded digest, e.g. read back from a CSV index
    /// column. No validation beyond ownership; the digest is opaque.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        ImageKey(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the key for a reference path string. Pure and deterministic:
/// identical strings always map to identical keys.
pub fn key_for(reference: &str) -> ImageKey {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    ImageKey(hex_encode(&hasher.finalize()[..]))
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push(HEX[(byte >> 4) as usize] as char);
        output.push(HEX[(byte & 0x0f) as usize] as char);
    }
    output
}
