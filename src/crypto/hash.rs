//! Hashing utilities for schedule signing
//!
//! Key holders never sign raw payload bytes. They sign a SHA-256 digest that
//! binds the action ("sign" or "delete") to a specific schedule id and body,
//! so a signature for one schedule can't be replayed against another.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash a list of fields under a domain tag.
///
/// Each field is length-prefixed so `["ab", "c"]` and `["a", "bc"]`
/// produce different digests.
pub fn domain_digest(domain: &str, fields: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u64).to_be_bytes());
    hasher.update(domain.as_bytes());
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field);
    }
    hasher.finalize().to_vec()
}
