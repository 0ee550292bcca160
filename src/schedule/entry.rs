//! A single scheduled transaction and its state machine
//!
//! ```text
//! PENDING --[threshold met, before expiry]--> EXECUTED
//! PENDING --[expiry reached]----------------> EXPIRED
//! PENDING --[admin delete]------------------> DELETED
//! ```
//!
//! Terminal states never change again. Execution is two-phase: the entry is
//! first claimed (`try_claim_execution`) and then completed or aborted once
//! the ledger answers. While a claim is outstanding the entry stays PENDING
//! but cannot be claimed again, expired or deleted.

use crate::crypto::{domain_digest, public_key_from_hex, verify_signature, KeyError, KeyPair};
use crate::ledger::{
    AccountId, ExecutionReceipt, Payload, RemoteSnapshot, RemoteState, ScheduleId,
    ScheduleRecord,
};
use crate::schedule::{KeySet, MemberId, ScheduleError, SignatureCollector, SubmitOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const SIGN_DOMAIN: &str = "schedule-sign";
const DELETE_DOMAIN: &str = "schedule-delete";

/// Shorten a member id for log lines
fn short(member: &str) -> &str {
    member.get(..16).unwrap_or(member)
}

/// A key holder's signature over a schedule digest
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleSignature {
    /// Public key of the signer (hex)
    pub signer: MemberId,
    /// Compact signature (hex)
    pub signature: String,
    pub signed_at: DateTime<Utc>,
}

impl ScheduleSignature {
    pub fn new(signer: MemberId, signature: String) -> Self {
        Self {
            signer,
            signature,
            signed_at: Utc::now(),
        }
    }

    /// Sign `digest` with `key_pair`
    pub fn create(key_pair: &KeyPair, digest: &[u8]) -> Result<Self, KeyError> {
        let signature = key_pair.sign(digest)?;
        Ok(Self::new(key_pair.public_key_hex(), hex::encode(signature)))
    }

    pub fn verify(&self, digest: &[u8]) -> Result<bool, KeyError> {
        let public_key = public_key_from_hex(&self.signer)?;
        let bytes = hex::decode(&self.signature).map_err(|_| KeyError::InvalidSignature)?;
        verify_signature(&public_key, digest, &bytes)
    }
}

/// Lifecycle state of a schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleState {
    Pending,
    Executed,
    Expired,
    Deleted,
}

impl ScheduleState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScheduleState::Pending)
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScheduleState::Pending => "PENDING",
            ScheduleState::Executed => "EXECUTED",
            ScheduleState::Expired => "EXPIRED",
            ScheduleState::Deleted => "DELETED",
        };
        f.write_str(name)
    }
}

/// Read-only copy of an entry, safe to hand out and serialize
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub id: ScheduleId,
    pub memo: String,
    pub creator: AccountId,
    pub payer: AccountId,
    pub admin: Option<MemberId>,
    pub payload: Payload,
    pub key_set: KeySet,
    /// Members that have signed, sorted
    pub signers: Vec<MemberId>,
    pub created_at: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub state: ScheduleState,
    pub executed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub receipt: Option<ExecutionReceipt>,
    /// Execution has been claimed and the ledger hasn't answered yet
    pub executing: bool,
}

impl ScheduleSnapshot {
    pub fn signature_count(&self) -> usize {
        self.signers.len()
    }

    pub fn threshold(&self) -> usize {
        self.key_set.threshold()
    }

    pub fn is_executed(&self) -> bool {
        self.state == ScheduleState::Executed
    }
}

/// One pending (or closed) scheduled transaction
#[derive(Debug)]
pub struct ScheduleEntry {
    id: ScheduleId,
    payload: Payload,
    creator: AccountId,
    payer: AccountId,
    admin: Option<MemberId>,
    memo: String,
    created_at: DateTime<Utc>,
    expiration_time: DateTime<Utc>,
    state: ScheduleState,
    executed_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    receipt: Option<ExecutionReceipt>,
    collector: SignatureCollector,
    execution_in_flight: bool,
}

impl ScheduleEntry {
    /// Wrap a record the ledger has accepted under `id`
    pub fn new(id: ScheduleId, record: ScheduleRecord, created_at: DateTime<Utc>) -> Self {
        let ScheduleRecord {
            payload,
            key_set,
            creator,
            payer,
            admin,
            memo,
            expiration_time,
        } = record;

        Self {
            id,
            payload,
            creator,
            payer,
            admin,
            memo,
            created_at,
            expiration_time,
            state: ScheduleState::Pending,
            executed_at: None,
            deleted_at: None,
            receipt: None,
            collector: SignatureCollector::new(Arc::new(key_set)),
            execution_in_flight: false,
        }
    }

    pub fn id(&self) -> &ScheduleId {
        &self.id
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == ScheduleState::Pending
    }

    pub fn expiration_time(&self) -> DateTime<Utc> {
        self.expiration_time
    }

    pub fn execution_in_flight(&self) -> bool {
        self.execution_in_flight
    }

    pub fn collector(&self) -> &SignatureCollector {
        &self.collector
    }

    /// Digest key holders sign to approve this schedule
    pub fn signing_digest(&self) -> Vec<u8> {
        domain_digest(
            SIGN_DOMAIN,
            &[self.id.as_str().as_bytes(), self.payload.as_bytes()],
        )
    }

    /// Digest the admin signs to delete this schedule
    pub fn delete_digest(&self) -> Vec<u8> {
        domain_digest(DELETE_DOMAIN, &[self.id.as_str().as_bytes()])
    }

    /// When the entry reached its terminal state
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            ScheduleState::Pending => None,
            ScheduleState::Executed => self.executed_at,
            ScheduleState::Deleted => self.deleted_at,
            ScheduleState::Expired => Some(self.expiration_time),
        }
    }

    fn closed_error(&self, state: ScheduleState) -> ScheduleError {
        ScheduleError::ScheduleClosed {
            id: self.id.clone(),
            state,
        }
    }

    fn check_signature(
        &self,
        signature: &ScheduleSignature,
        digest: &[u8],
    ) -> Result<bool, ScheduleError> {
        match signature.verify(digest) {
            Ok(valid) => Ok(valid),
            Err(KeyError::InvalidPublicKey) | Err(KeyError::InvalidSignature) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify and record a key holder's signature.
    ///
    /// Fails without side effects if the entry is closed or past its
    /// expiration time, the signer is not a member, or the signature does
    /// not verify.
    pub fn add_signature(
        &mut self,
        signature: &ScheduleSignature,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, ScheduleError> {
        if !self.is_pending() {
            return Err(self.closed_error(self.state));
        }
        if now >= self.expiration_time {
            return Err(self.closed_error(ScheduleState::Expired));
        }
        if !self.collector.key_set().contains(&signature.signer) {
            return Err(ScheduleError::UnknownSigner(signature.signer.clone()));
        }
        if !self.check_signature(signature, &self.signing_digest())? {
            return Err(ScheduleError::InvalidSignature(signature.signer.clone()));
        }

        let outcome = self.collector.submit(&signature.signer)?;
        if outcome.newly_added {
            log::debug!(
                "Schedule {} signed by {}... ({}/{})",
                self.id,
                short(&signature.signer),
                outcome.count,
                self.collector.key_set().threshold()
            );
        }
        Ok(outcome)
    }

    /// Claim the right to execute. At most one caller gets `true` until the
    /// claim is aborted.
    pub fn try_claim_execution(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_pending()
            || self.execution_in_flight
            || !self.collector.satisfied()
            || now >= self.expiration_time
        {
            return false;
        }
        self.execution_in_flight = true;
        true
    }

    /// Record a successful execution
    pub fn complete_execution(&mut self, receipt: ExecutionReceipt) {
        if !self.is_pending() {
            return;
        }
        self.state = ScheduleState::Executed;
        self.executed_at = Some(receipt.consensus_at);
        self.receipt = Some(receipt);
        self.execution_in_flight = false;
    }

    /// Release a claim after the ledger failed; the entry stays PENDING
    pub fn abort_execution(&mut self) {
        self.execution_in_flight = false;
    }

    /// Move to EXPIRED if pending, unclaimed and due
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_pending() || self.execution_in_flight || now < self.expiration_time {
            return false;
        }
        self.state = ScheduleState::Expired;
        true
    }

    /// Check that `signature` is the admin's approval to delete this entry.
    ///
    /// Only a PENDING entry can be deleted; anything else is `Unauthorized`.
    pub fn authorize_delete(&self, signature: &ScheduleSignature) -> Result<(), ScheduleError> {
        if !self.is_pending() {
            return Err(ScheduleError::Unauthorized(self.id.clone()));
        }
        if self.execution_in_flight {
            return Err(ScheduleError::ExecutionInProgress(self.id.clone()));
        }

        let authorized = match &self.admin {
            Some(admin) if *admin == signature.signer => {
                self.check_signature(signature, &self.delete_digest())?
            }
            _ => false,
        };
        if !authorized {
            return Err(ScheduleError::Unauthorized(self.id.clone()));
        }
        Ok(())
    }

    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        if !self.is_pending() {
            return;
        }
        self.state = ScheduleState::Deleted;
        self.deleted_at = Some(at);
    }

    /// Take on a terminal state reported by the ledger.
    ///
    /// Local terminal states and claimed executions are left alone.
    pub fn adopt_remote(&mut self, remote: &RemoteSnapshot) -> bool {
        if !self.is_pending() || self.execution_in_flight {
            return false;
        }
        match &remote.state {
            RemoteState::Pending => return false,
            RemoteState::Executed { at } => {
                self.state = ScheduleState::Executed;
                self.executed_at = Some(*at);
            }
            RemoteState::Deleted { at } => {
                self.state = ScheduleState::Deleted;
                self.deleted_at = Some(*at);
            }
            RemoteState::Expired => {
                self.state = ScheduleState::Expired;
            }
        }
        true
    }

    pub fn snapshot(&self) -> ScheduleSnapshot {
        ScheduleSnapshot {
            id: self.id.clone(),
            memo: self.memo.clone(),
            creator: self.creator.clone(),
            payer: self.payer.clone(),
            admin: self.admin.clone(),
            payload: self.payload.clone(),
            key_set: self.collector.key_set().clone(),
            signers: self.collector.signed(),
            created_at: self.created_at,
            expiration_time: self.expiration_time,
            state: self.state,
            executed_at: self.executed_at,
            deleted_at: self.deleted_at,
            receipt: self.receipt.clone(),
            executing: self.execution_in_flight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        entry: ScheduleEntry,
        keys: Vec<KeyPair>,
        admin: KeyPair,
        now: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let keys = KeyPair::generate_many(3);
        let admin = KeyPair::generate();
        let now = Utc::now();
        let record = ScheduleRecord {
            payload: Payload::new(b"transfer".to_vec()),
            key_set: KeySet::from_keys(&keys, 2).unwrap(),
            creator: AccountId::new("0.0.2"),
            payer: AccountId::new("0.0.2"),
            admin: Some(admin.public_key_hex()),
            memo: "Scheduled TX With Multi Signature Account".to_string(),
            expiration_time: now + chrono::Duration::hours(1),
        };
        let entry = ScheduleEntry::new(ScheduleId::new("0.0.1001"), record, now);
        Fixture {
            entry,
            keys,
            admin,
            now,
        }
    }

    fn sign(entry: &ScheduleEntry, key: &KeyPair) -> ScheduleSignature {
        ScheduleSignature::create(key, &entry.signing_digest()).unwrap()
    }

    fn receipt(id: &ScheduleId) -> ExecutionReceipt {
        ExecutionReceipt {
            schedule_id: id.clone(),
            transaction_id: "0.0.2@1.000000000".to_string(),
            consensus_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_entry_is_pending() {
        let f = fixture();
        let snapshot = f.entry.snapshot();
        assert_eq!(snapshot.state, ScheduleState::Pending);
        assert!(snapshot.executed_at.is_none());
        assert_eq!(snapshot.signature_count(), 0);
        assert_eq!(snapshot.threshold(), 2);
    }

    #[test]
    fn test_signatures_reach_threshold() {
        let mut f = fixture();
        let sig_a = sign(&f.entry, &f.keys[0]);
        let sig_b = sign(&f.entry, &f.keys[1]);

        assert!(!f.entry.add_signature(&sig_a, f.now).unwrap().satisfied);
        assert!(f.entry.add_signature(&sig_b, f.now).unwrap().satisfied);
        assert!(f.entry.try_claim_execution(f.now));
    }

    #[test]
    fn test_signature_over_wrong_digest_rejected() {
        let mut f = fixture();
        let forged = ScheduleSignature::create(&f.keys[0], &f.entry.delete_digest()).unwrap();

        let result = f.entry.add_signature(&forged, f.now);
        assert!(matches!(result, Err(ScheduleError::InvalidSignature(_))));
        assert_eq!(f.entry.collector().count(), 0);
    }

    #[test]
    fn test_garbled_signature_rejected() {
        let mut f = fixture();
        let mut sig = sign(&f.entry, &f.keys[0]);
        sig.signature = "zz".to_string();

        let result = f.entry.add_signature(&sig, f.now);
        assert!(matches!(result, Err(ScheduleError::InvalidSignature(_))));
    }

    #[test]
    fn test_signing_after_deadline_is_closed_without_state_change() {
        let mut f = fixture();
        let sig = sign(&f.entry, &f.keys[0]);
        let late = f.entry.expiration_time();

        let result = f.entry.add_signature(&sig, late);
        assert!(matches!(
            result,
            Err(ScheduleError::ScheduleClosed {
                state: ScheduleState::Expired,
                ..
            })
        ));
        assert_eq!(f.entry.state(), ScheduleState::Pending);
        assert_eq!(f.entry.collector().count(), 0);
    }

    #[test]
    fn test_claim_is_exclusive_until_aborted() {
        let mut f = fixture();
        for key in &f.keys[..2] {
            let sig = sign(&f.entry, key);
            f.entry.add_signature(&sig, f.now).unwrap();
        }

        assert!(f.entry.try_claim_execution(f.now));
        assert!(!f.entry.try_claim_execution(f.now));

        // An outstanding claim blocks expiry and deletion
        assert!(!f.entry.expire_if_due(f.entry.expiration_time()));
        let del = ScheduleSignature::create(&f.admin, &f.entry.delete_digest()).unwrap();
        assert!(matches!(
            f.entry.authorize_delete(&del),
            Err(ScheduleError::ExecutionInProgress(_))
        ));

        f.entry.abort_execution();
        assert_eq!(f.entry.state(), ScheduleState::Pending);
        assert!(f.entry.try_claim_execution(f.now));
    }

    #[test]
    fn test_claim_refused_after_deadline() {
        let mut f = fixture();
        for key in &f.keys[..2] {
            let sig = sign(&f.entry, key);
            f.entry.add_signature(&sig, f.now).unwrap();
        }
        assert!(!f.entry.try_claim_execution(f.entry.expiration_time()));
    }

    #[test]
    fn test_executed_entry_is_immutable() {
        let mut f = fixture();
        for key in &f.keys[..2] {
            let sig = sign(&f.entry, key);
            f.entry.add_signature(&sig, f.now).unwrap();
        }
        assert!(f.entry.try_claim_execution(f.now));
        let id = f.entry.id().clone();
        f.entry.complete_execution(receipt(&id));

        assert_eq!(f.entry.state(), ScheduleState::Executed);
        assert!(f.entry.snapshot().executed_at.is_some());

        let late_sig = sign(&f.entry, &f.keys[2]);
        assert!(matches!(
            f.entry.add_signature(&late_sig, f.now),
            Err(ScheduleError::ScheduleClosed {
                state: ScheduleState::Executed,
                ..
            })
        ));
        assert!(!f.entry.expire_if_due(f.entry.expiration_time()));
        f.entry.mark_deleted(f.now);
        assert_eq!(f.entry.state(), ScheduleState::Executed);
        assert_eq!(f.entry.collector().count(), 2);

        let del = ScheduleSignature::create(&f.admin, &f.entry.delete_digest()).unwrap();
        assert!(matches!(
            f.entry.authorize_delete(&del),
            Err(ScheduleError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expire_if_due() {
        let mut f = fixture();
        let deadline = f.entry.expiration_time();

        assert!(!f.entry.expire_if_due(deadline - chrono::Duration::seconds(1)));
        assert!(f.entry.expire_if_due(deadline));
        assert_eq!(f.entry.state(), ScheduleState::Expired);
        assert_eq!(f.entry.closed_at(), Some(deadline));
        assert!(!f.entry.expire_if_due(deadline));
    }

    #[test]
    fn test_delete_requires_admin_signature() {
        let mut f = fixture();

        let by_member = ScheduleSignature::create(&f.keys[0], &f.entry.delete_digest()).unwrap();
        assert!(matches!(
            f.entry.authorize_delete(&by_member),
            Err(ScheduleError::Unauthorized(_))
        ));

        // Right key, wrong message
        let wrong_digest = ScheduleSignature::create(&f.admin, &f.entry.signing_digest()).unwrap();
        assert!(matches!(
            f.entry.authorize_delete(&wrong_digest),
            Err(ScheduleError::Unauthorized(_))
        ));

        let by_admin = ScheduleSignature::create(&f.admin, &f.entry.delete_digest()).unwrap();
        f.entry.authorize_delete(&by_admin).unwrap();
        f.entry.mark_deleted(f.now);
        assert_eq!(f.entry.state(), ScheduleState::Deleted);
        assert_eq!(f.entry.closed_at(), Some(f.now));
    }

    #[test]
    fn test_adopt_remote_terminal_state() {
        let mut f = fixture();
        let executed_at = f.now + chrono::Duration::seconds(3);
        let remote = RemoteSnapshot {
            schedule_id: f.entry.id().clone(),
            state: RemoteState::Executed { at: executed_at },
            memo: String::new(),
            expiration_time: f.entry.expiration_time(),
        };

        assert!(f.entry.adopt_remote(&remote));
        assert_eq!(f.entry.state(), ScheduleState::Executed);
        assert_eq!(f.entry.snapshot().executed_at, Some(executed_at));

        // Already terminal: a different remote answer is ignored
        let deleted = RemoteSnapshot {
            state: RemoteState::Deleted { at: f.now },
            ..remote
        };
        assert!(!f.entry.adopt_remote(&deleted));
        assert_eq!(f.entry.state(), ScheduleState::Executed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ScheduleState::Pending.to_string(), "PENDING");
        assert_eq!(ScheduleState::Executed.to_string(), "EXECUTED");
        assert!(ScheduleState::Expired.is_terminal());
        assert!(!ScheduleState::Pending.is_terminal());
    }
}
