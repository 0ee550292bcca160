//! Schedule registry
//!
//! Owns every `ScheduleEntry` and coordinates creation, signing, deletion,
//! expiry and execution. Each entry sits behind its own mutex, so signers of
//! different schedules never wait on each other. Ledger calls are made with
//! no registry lock held, except `delete`, which keeps the entry's lock so a
//! concurrent signer can't execute a schedule that is being deleted.

use crate::config::SchedulerConfig;
use crate::ledger::{
    AccountId, ExecutionReceipt, LedgerError, LedgerGateway, Payload, ScheduleId, ScheduleRecord,
};
use crate::schedule::{
    Clock, KeySet, MemberId, ScheduleEntry, ScheduleError, ScheduleSignature, ScheduleSnapshot,
    ScheduleState,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Parameters for a new schedule
#[derive(Clone, Debug)]
pub struct NewSchedule {
    pub payload: Payload,
    /// Key list whose threshold authorizes execution
    pub key_set: KeySet,
    pub creator: AccountId,
    /// Defaults to the creator
    pub payer: Option<AccountId>,
    /// Key allowed to delete the schedule; none means it can't be deleted
    pub admin: Option<MemberId>,
    pub memo: String,
    /// Defaults to `SchedulerConfig::default_ttl`
    pub ttl: Option<chrono::Duration>,
}

impl NewSchedule {
    pub fn new(payload: Payload, key_set: KeySet, creator: AccountId) -> Self {
        Self {
            payload,
            key_set,
            creator,
            payer: None,
            admin: None,
            memo: String::new(),
            ttl: None,
        }
    }

    pub fn with_payer(mut self, payer: AccountId) -> Self {
        self.payer = Some(payer);
        self
    }

    pub fn with_admin(mut self, admin: MemberId) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// What a `sign` call achieved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignOutcome {
    pub schedule_id: ScheduleId,
    /// Distinct signers so far
    pub count: usize,
    pub threshold: usize,
    pub state: ScheduleState,
    /// True only for the call that executed the schedule
    pub executed: bool,
}

type SharedEntry = Arc<Mutex<ScheduleEntry>>;

/// Registry of scheduled transactions
pub struct ScheduleRegistry {
    entries: RwLock<HashMap<ScheduleId, SharedEntry>>,
    gateway: Arc<dyn LedgerGateway>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl ScheduleRegistry {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            gateway,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn entry(&self, id: &ScheduleId) -> Result<SharedEntry, ScheduleError> {
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound(id.clone()))
    }

    /// Create a schedule and persist it on the ledger.
    ///
    /// Nothing is registered unless the ledger accepts the schedule.
    pub async fn create(&self, request: NewSchedule) -> Result<ScheduleId, ScheduleError> {
        if request.memo.len() > self.config.max_memo_len {
            return Err(ScheduleError::MemoTooLong {
                len: request.memo.len(),
                max: self.config.max_memo_len,
            });
        }

        let now = self.clock.now();
        let ttl = request.ttl.unwrap_or(self.config.default_ttl);
        if ttl < chrono::Duration::zero() {
            return Err(ScheduleError::InvalidTtl(ttl));
        }
        let expiration_time = now
            .checked_add_signed(ttl)
            .ok_or(ScheduleError::InvalidTtl(ttl))?;

        let payer = request.payer.unwrap_or_else(|| request.creator.clone());
        let record = ScheduleRecord {
            payload: request.payload,
            key_set: request.key_set,
            creator: request.creator,
            payer,
            admin: request.admin,
            memo: request.memo,
            expiration_time,
        };

        let id = match self.gateway.submit_schedule(&record).await {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Ledger rejected new schedule: {}", e);
                return Err(ScheduleError::PersistenceFailed(e));
            }
        };

        let description = record.key_set.description();
        let expires = record.expiration_time;
        let entry = ScheduleEntry::new(id.clone(), record, now);

        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            return Err(ScheduleError::PersistenceFailed(LedgerError::Rejected(
                format!("ledger reused schedule id {}", id),
            )));
        }
        entries.insert(id.clone(), Arc::new(Mutex::new(entry)));

        log::info!(
            "Schedule {} created ({} signatures required, expires {})",
            id,
            description,
            expires
        );
        Ok(id)
    }

    /// Submit a key holder's signature.
    ///
    /// When this signature completes the threshold, exactly one caller wins
    /// the claim and asks the ledger to execute. If the ledger fails, the
    /// schedule stays PENDING with its signatures and `ExecutionFailed` is
    /// returned; signing again or calling `retry_execution` retries.
    pub async fn sign(
        &self,
        id: &ScheduleId,
        signature: &ScheduleSignature,
    ) -> Result<SignOutcome, ScheduleError> {
        let entry = self.entry(id).await?;
        let now = self.clock.now();

        let (outcome, threshold, claimed) = {
            let mut guard = entry.lock().await;
            let outcome = guard.add_signature(signature, now)?;
            let threshold = guard.collector().key_set().threshold();
            (outcome, threshold, guard.try_claim_execution(now))
        };

        if !claimed {
            return Ok(SignOutcome {
                schedule_id: id.clone(),
                count: outcome.count,
                threshold,
                state: ScheduleState::Pending,
                executed: false,
            });
        }

        self.execute_claimed(id, entry).await?;
        Ok(SignOutcome {
            schedule_id: id.clone(),
            count: outcome.count,
            threshold,
            state: ScheduleState::Executed,
            executed: true,
        })
    }

    /// Re-run execution for a PENDING schedule that already has enough
    /// signatures, e.g. after an `ExecutionFailed`
    pub async fn retry_execution(&self, id: &ScheduleId) -> Result<ExecutionReceipt, ScheduleError> {
        let entry = self.entry(id).await?;
        let now = self.clock.now();

        {
            let mut guard = entry.lock().await;
            if !guard.is_pending() {
                return Err(ScheduleError::ScheduleClosed {
                    id: id.clone(),
                    state: guard.state(),
                });
            }
            if guard.execution_in_flight() {
                return Err(ScheduleError::ExecutionInProgress(id.clone()));
            }
            if now >= guard.expiration_time() {
                return Err(ScheduleError::ScheduleClosed {
                    id: id.clone(),
                    state: ScheduleState::Expired,
                });
            }
            if !guard.try_claim_execution(now) {
                let collector = guard.collector();
                return Err(ScheduleError::ThresholdNotMet {
                    id: id.clone(),
                    have: collector.count(),
                    need: collector.key_set().threshold(),
                });
            }
        }

        self.execute_claimed(id, entry).await
    }

    /// Run the ledger execution for an entry this caller has claimed.
    ///
    /// The call runs on its own task so that a caller dropping its future
    /// can't strand the claim. The gateway call is nested in a second task
    /// so a panicking gateway still releases the claim.
    async fn execute_claimed(
        &self,
        id: &ScheduleId,
        entry: SharedEntry,
    ) -> Result<ExecutionReceipt, ScheduleError> {
        let gateway = self.gateway.clone();
        let task_id = id.clone();
        let task_entry = entry.clone();

        let task = tokio::spawn(async move {
            let call_id = task_id.clone();
            let call = tokio::spawn(async move { gateway.execute_payload(&call_id).await });
            let result = match call.await {
                Ok(result) => result,
                Err(join_error) => Err(LedgerError::Unavailable(format!(
                    "ledger call failed: {}",
                    join_error
                ))),
            };

            let mut guard = task_entry.lock().await;
            match &result {
                Ok(receipt) => {
                    guard.complete_execution(receipt.clone());
                    log::info!(
                        "Schedule {} executed as {}",
                        task_id,
                        receipt.transaction_id
                    );
                }
                Err(e) => {
                    guard.abort_execution();
                    log::warn!(
                        "Execution of schedule {} failed, back to PENDING: {}",
                        task_id,
                        e
                    );
                }
            }
            result
        });

        match task.await {
            Ok(result) => result.map_err(|source| ScheduleError::ExecutionFailed {
                id: id.clone(),
                source,
            }),
            Err(join_error) => {
                entry.lock().await.abort_execution();
                Err(ScheduleError::ExecutionFailed {
                    id: id.clone(),
                    source: LedgerError::Unavailable(format!(
                        "execution task failed: {}",
                        join_error
                    )),
                })
            }
        }
    }

    /// Delete a PENDING schedule with the admin's signature over its
    /// delete digest
    pub async fn delete(
        &self,
        id: &ScheduleId,
        signature: &ScheduleSignature,
    ) -> Result<(), ScheduleError> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        guard.authorize_delete(signature)?;

        self.gateway
            .delete_schedule(id)
            .await
            .map_err(ScheduleError::PersistenceFailed)?;

        guard.mark_deleted(self.clock.now());
        log::info!("Schedule {} deleted by admin", id);
        Ok(())
    }

    /// Snapshot of one schedule
    pub async fn query(&self, id: &ScheduleId) -> Result<ScheduleSnapshot, ScheduleError> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(guard.snapshot())
    }

    /// Snapshots of every schedule, ordered by id
    pub async fn list(&self) -> Vec<ScheduleSnapshot> {
        let entries: Vec<SharedEntry> = self.entries.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshots.push(entry.lock().await.snapshot());
        }
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Digest a key holder signs to approve schedule `id`
    pub async fn signing_digest(&self, id: &ScheduleId) -> Result<Vec<u8>, ScheduleError> {
        Ok(self.entry(id).await?.lock().await.signing_digest())
    }

    /// Digest the admin signs to delete schedule `id`
    pub async fn delete_digest(&self, id: &ScheduleId) -> Result<Vec<u8>, ScheduleError> {
        Ok(self.entry(id).await?.lock().await.delete_digest())
    }

    /// Expire every PENDING schedule whose expiration time is at or before
    /// `now`. Returns the ids that were expired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<ScheduleId> {
        let entries: Vec<SharedEntry> = self.entries.read().await.values().cloned().collect();

        let mut expired = Vec::new();
        for entry in entries {
            let mut guard = entry.lock().await;
            if guard.expire_if_due(now) {
                log::info!("Schedule {} expired", guard.id());
                expired.push(guard.id().clone());
            }
        }
        expired.sort();
        expired
    }

    /// Drop closed schedules that closed at or before `cutoff`.
    /// Later lookups of their ids fail with `NotFound`.
    ///
    /// Entries locked by another caller are skipped until the next purge.
    /// The map is only write-locked for the final removal.
    pub async fn purge_closed(&self, cutoff: DateTime<Utc>) -> usize {
        let entries: Vec<(ScheduleId, SharedEntry)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();

        let due: Vec<ScheduleId> = entries
            .into_iter()
            .filter(|(_, entry)| match entry.try_lock() {
                Ok(guard) => matches!(guard.closed_at(), Some(at) if at <= cutoff),
                Err(_) => false,
            })
            .map(|(id, _)| id)
            .collect();
        if due.is_empty() {
            return 0;
        }

        // Closed entries never reopen, so the ids are still due here
        let mut entries = self.entries.write().await;
        let mut purged = 0;
        for id in due {
            if entries.remove(&id).is_some() {
                log::debug!("Purged schedule {}", id);
                purged += 1;
            }
        }
        purged
    }

    /// Bring a local PENDING entry in line with the ledger's view.
    ///
    /// Only terminal remote states are adopted; a locally closed entry is
    /// never changed.
    pub async fn reconcile(&self, id: &ScheduleId) -> Result<ScheduleSnapshot, ScheduleError> {
        let entry = self.entry(id).await?;
        let remote = self
            .gateway
            .query_remote_state(id)
            .await
            .map_err(ScheduleError::PersistenceFailed)?;

        let mut guard = entry.lock().await;
        if guard.adopt_remote(&remote) {
            log::info!(
                "Schedule {} reconciled to {} from ledger",
                id,
                guard.state()
            );
        }
        Ok(guard.snapshot())
    }
}
