//! Cryptographic primitives used by schedule signers
//!
//! This module provides:
//! - SHA-256 digests with domain separation
//! - secp256k1 key pairs, signing and verification

pub mod hash;
pub mod keys;

pub use hash::{domain_digest, sha256, sha256_hex};
pub use keys::{public_key_from_hex, sign_message, verify_signature, KeyError, KeyPair};
