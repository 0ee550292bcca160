//! Threshold key lists
//!
//! A `KeySet` names the N key holders allowed to authorize a schedule and
//! the number K of them that must sign.

use crate::crypto::KeyPair;
use crate::schedule::ScheduleError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Signer identity: hex-encoded compressed public key
pub type MemberId = String;

/// An N-member key list with signing threshold K
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawKeySet")]
pub struct KeySet {
    members: Vec<MemberId>,
    threshold: usize,
}

/// Unvalidated form used when deserializing
#[derive(Deserialize)]
struct RawKeySet {
    members: Vec<MemberId>,
    threshold: usize,
}

impl TryFrom<RawKeySet> for KeySet {
    type Error = ScheduleError;

    fn try_from(raw: RawKeySet) -> Result<Self, Self::Error> {
        KeySet::new(raw.members, raw.threshold)
    }
}

impl KeySet {
    /// Create a key list
    ///
    /// # Errors
    /// `InvalidThreshold` unless `1 <= threshold <= members.len()`,
    /// `DuplicateMember` if a key appears twice.
    pub fn new(members: Vec<MemberId>, threshold: usize) -> Result<Self, ScheduleError> {
        if threshold == 0 {
            return Err(ScheduleError::InvalidThreshold(
                "threshold must be at least 1".to_string(),
            ));
        }

        if threshold > members.len() {
            return Err(ScheduleError::InvalidThreshold(format!(
                "threshold {} exceeds member count {}",
                threshold,
                members.len()
            )));
        }

        let mut seen = HashSet::with_capacity(members.len());
        for member in &members {
            if !seen.insert(member.as_str()) {
                return Err(ScheduleError::DuplicateMember(member.clone()));
            }
        }

        Ok(Self { members, threshold })
    }

    /// Build a key list from the public halves of `keys`
    pub fn from_keys(keys: &[KeyPair], threshold: usize) -> Result<Self, ScheduleError> {
        Self::new(keys.iter().map(|k| k.public_key_hex()).collect(), threshold)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    /// Description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.members.len())
    }
}
