//! Signature collection against a key list

use crate::schedule::{KeySet, MemberId, ScheduleError};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result of submitting one signer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Distinct members that have signed so far
    pub count: usize,
    /// Whether the threshold is met
    pub satisfied: bool,
    /// False when the member had already signed
    pub newly_added: bool,
}

/// Tracks which members of a key list have signed.
///
/// Each member counts once no matter how often it submits, so a signature
/// resent after a network retry is harmless.
#[derive(Clone, Debug)]
pub struct SignatureCollector {
    key_set: Arc<KeySet>,
    signed: BTreeSet<MemberId>,
}

impl SignatureCollector {
    pub fn new(key_set: Arc<KeySet>) -> Self {
        Self {
            key_set,
            signed: BTreeSet::new(),
        }
    }

    /// Record a signature from `member`.
    ///
    /// Non-members are rejected without touching the signed set;
    /// repeat submissions are a no-op.
    pub fn submit(&mut self, member: &str) -> Result<SubmitOutcome, ScheduleError> {
        if !self.key_set.contains(member) {
            return Err(ScheduleError::UnknownSigner(member.to_string()));
        }

        let newly_added = self.signed.insert(member.to_string());

        Ok(SubmitOutcome {
            count: self.signed.len(),
            satisfied: self.satisfied(),
            newly_added,
        })
    }

    pub fn satisfied(&self) -> bool {
        self.signed.len() >= self.key_set.threshold()
    }

    pub fn count(&self) -> usize {
        self.signed.len()
    }

    pub fn has_signed(&self, member: &str) -> bool {
        self.signed.contains(member)
    }

    /// Members that have signed, in sorted order
    pub fn signed(&self) -> Vec<MemberId> {
        self.signed.iter().cloned().collect()
    }

    pub fn key_set(&self) -> &KeySet {
        &self.key_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(threshold: usize) -> SignatureCollector {
        let members = ["a", "b", "c"].iter().map(|m| m.to_string()).collect();
        SignatureCollector::new(Arc::new(KeySet::new(members, threshold).unwrap()))
    }

    #[test]
    fn test_threshold_reached() {
        let mut c = collector(2);

        let first = c.submit("a").unwrap();
        assert_eq!(first.count, 1);
        assert!(!first.satisfied);

        let second = c.submit("b").unwrap();
        assert_eq!(second.count, 2);
        assert!(second.satisfied);
        assert!(c.satisfied());
    }

    #[test]
    fn test_resubmission_is_idempotent() {
        let mut c = collector(2);
        assert!(c.submit("a").unwrap().newly_added);

        let again = c.submit("a").unwrap();
        assert!(!again.newly_added);
        assert_eq!(again.count, 1);
        assert!(!again.satisfied);
    }

    #[test]
    fn test_unknown_signer_does_not_mutate() {
        let mut c = collector(1);
        let result = c.submit("d");

        assert!(matches!(result, Err(ScheduleError::UnknownSigner(m)) if m == "d"));
        assert_eq!(c.count(), 0);
        assert!(!c.satisfied());
    }

    #[test]
    fn test_satisfied_depends_only_on_distinct_signers() {
        let members: Vec<MemberId> = ["a", "b", "c", "d"].iter().map(|m| m.to_string()).collect();

        for threshold in 1..=members.len() {
            let key_set = Arc::new(KeySet::new(members.clone(), threshold).unwrap());

            // Every subset of signers, submitted forwards with repeats and backwards
            for mask in 0u32..(1 << members.len()) {
                let subset: Vec<&MemberId> = members
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, m)| m)
                    .collect();
                let expected = subset.len() >= threshold;

                let mut forward = SignatureCollector::new(key_set.clone());
                for member in subset.iter().chain(subset.iter()) {
                    forward.submit(member).unwrap();
                }

                let mut backward = SignatureCollector::new(key_set.clone());
                for member in subset.iter().rev() {
                    backward.submit(member).unwrap();
                }

                assert_eq!(forward.satisfied(), expected, "mask {:04b} k {}", mask, threshold);
                assert_eq!(backward.satisfied(), expected, "mask {:04b} k {}", mask, threshold);
                assert_eq!(forward.count(), subset.len());
            }
        }
    }
}
