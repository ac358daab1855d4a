//! Hash-omission caching for large, mostly static payloads.

use sha2::{Digest, Sha256};

/// First 8 bytes of SHA-256 over `bytes`, read little-endian.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// A payload together with its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedBlob {
    hash: u64,
    bytes: Vec<u8>,
}

impl HashedBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            hash: content_hash(&bytes),
            bytes,
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// What to send a client that already holds `client_hash`: always the
    /// current hash, the payload only when it changed.
    pub fn reply_for(&self, client_hash: u64) -> (u64, &[u8]) {
        if client_hash == self.hash {
            (self.hash, &[])
        } else {
            (self.hash, &self.bytes)
        }
    }
}
