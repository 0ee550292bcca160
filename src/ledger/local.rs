//! In-process ledger
//!
//! Keeps accounts, balances and schedule records in memory and applies
//! transfer payloads on execution. Used by the demo command and by tests,
//! which can inject failures and latency to exercise the registry's
//! rollback and race handling.

use crate::config::LedgerConfig;
use crate::ledger::{
    AccountId, ExecutionReceipt, LedgerError, LedgerGateway, RemoteSnapshot, RemoteState,
    ScheduleId, ScheduleRecord, TransferPayload,
};
use crate::schedule::{Clock, KeySet, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct LedgerAccount {
    balance: u64,
    /// Key list that must authorize debits; `None` for the operator
    key_set: Option<KeySet>,
}

#[derive(Debug, Clone)]
struct StoredSchedule {
    record: ScheduleRecord,
    state: RemoteState,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, LedgerAccount>,
    schedules: HashMap<ScheduleId, StoredSchedule>,
    next_entity_num: u64,
}

/// Ledger that lives inside the process.
///
/// Consensus timestamps and lazy expiry read the ledger's own clock, the
/// wall clock unless `with_clock` replaces it. Share the registry's clock
/// to keep `reconcile` in step with local expiry.
pub struct LocalLedger {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<LedgerState>,
    /// Executions still to fail with `Unavailable`
    failing_executions: AtomicUsize,
    rejecting_submissions: AtomicBool,
    execute_calls: AtomicUsize,
}

impl LocalLedger {
    /// Create a ledger holding only the funded operator account
    pub fn new(config: LedgerConfig) -> Self {
        let mut state = LedgerState {
            next_entity_num: config.first_entity_num,
            ..Default::default()
        };
        state.accounts.insert(
            config.operator_account.clone(),
            LedgerAccount {
                balance: config.operator_initial_balance,
                key_set: None,
            },
        );

        Self {
            config,
            clock: Arc::new(SystemClock),
            state: RwLock::new(state),
            failing_executions: AtomicUsize::new(0),
            rejecting_submissions: AtomicBool::new(false),
            execute_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(LedgerConfig::default())
    }

    /// Use `clock` for consensus timestamps and expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn operator(&self) -> &AccountId {
        &self.config.operator_account
    }

    pub fn network(&self) -> &str {
        &self.config.network
    }

    /// Make the next `count` execute calls fail with `Unavailable`
    pub fn fail_next_executions(&self, count: usize) {
        self.failing_executions.store(count, Ordering::SeqCst);
    }

    /// Reject every schedule submission while set
    pub fn reject_submissions(&self, reject: bool) {
        self.rejecting_submissions.store(reject, Ordering::SeqCst);
    }

    /// Number of execute calls received, including failed ones
    pub fn execute_count(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    /// Overwrite a schedule's state, as if another client had acted on it
    pub async fn set_remote_state(
        &self,
        id: &ScheduleId,
        state: RemoteState,
    ) -> Result<(), LedgerError> {
        let mut ledger = self.state.write().await;
        let schedule = ledger
            .schedules
            .get_mut(id)
            .ok_or_else(|| LedgerError::ScheduleNotFound(id.clone()))?;
        schedule.state = state;
        Ok(())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.config.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_entity(&self, state: &mut LedgerState) -> String {
        let num = state.next_entity_num;
        state.next_entity_num += 1;
        format!("{}.{}.{}", self.config.shard, self.config.realm, num)
    }

    fn transaction_id(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}@{}.{:09}",
            self.config.operator_account,
            at.timestamp(),
            at.timestamp_subsec_nanos()
        )
    }

    /// Check every account's net change before touching any balance.
    ///
    /// Legs on the same account are merged, so splitting a debit can't get
    /// past the balance check.
    fn apply_transfers(
        accounts: &mut HashMap<AccountId, LedgerAccount>,
        transfer: &TransferPayload,
        authorized_by: &KeySet,
    ) -> Result<(), LedgerError> {
        let overflow = || LedgerError::InvalidPayload("transfer amounts overflow".to_string());

        let net = transfer.net().ok_or_else(overflow)?;
        if net != 0 {
            return Err(LedgerError::UnbalancedTransfer(net));
        }
        let deltas = transfer.net_by_account().ok_or_else(overflow)?;

        let mut updated = Vec::with_capacity(deltas.len());
        for (account_id, delta) in deltas {
            let account = accounts
                .get(&account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.clone()))?;

            let balance = if delta < 0 {
                if matches!(&account.key_set, Some(keys) if keys != authorized_by) {
                    return Err(LedgerError::KeyMismatch(account_id));
                }
                let need = delta.unsigned_abs();
                account
                    .balance
                    .checked_sub(need)
                    .ok_or_else(|| LedgerError::InsufficientBalance {
                        account: account_id.clone(),
                        have: account.balance,
                        need,
                    })?
            } else {
                account
                    .balance
                    .checked_add(delta.unsigned_abs())
                    .ok_or_else(overflow)?
            };
            updated.push((account_id, balance));
        }

        for (account_id, balance) in updated {
            if let Some(account) = accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for LocalLedger {
    async fn submit_schedule(&self, record: &ScheduleRecord) -> Result<ScheduleId, LedgerError> {
        self.simulate_latency().await;

        if self.rejecting_submissions.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected(
                "schedule submissions are disabled".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&record.payer) {
            return Err(LedgerError::AccountNotFound(record.payer.clone()));
        }

        let id = ScheduleId::new(self.next_entity(&mut state));
        state.schedules.insert(
            id.clone(),
            StoredSchedule {
                record: record.clone(),
                state: RemoteState::Pending,
            },
        );

        log::debug!("Ledger stored schedule {}", id);
        Ok(id)
    }

    async fn execute_payload(&self, id: &ScheduleId) -> Result<ExecutionReceipt, LedgerError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let injected = self
            .failing_executions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LedgerError::Unavailable(
                "injected execution failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let LedgerState {
            accounts,
            schedules,
            ..
        } = &mut *state;

        let schedule = schedules
            .get_mut(id)
            .ok_or_else(|| LedgerError::ScheduleNotFound(id.clone()))?;
        match schedule.state {
            RemoteState::Pending => {}
            RemoteState::Executed { .. } => return Err(LedgerError::AlreadyExecuted(id.clone())),
            RemoteState::Deleted { .. } => {
                return Err(LedgerError::Rejected(format!("schedule {} was deleted", id)))
            }
            RemoteState::Expired => {
                return Err(LedgerError::Rejected(format!("schedule {} expired", id)))
            }
        }

        let transfer = TransferPayload::from_payload(&schedule.record.payload)
            .map_err(|e| LedgerError::InvalidPayload(e.to_string()))?;
        Self::apply_transfers(accounts, &transfer, &schedule.record.key_set)?;

        let now = self.clock.now();
        schedule.state = RemoteState::Executed { at: now };

        Ok(ExecutionReceipt {
            schedule_id: id.clone(),
            transaction_id: self.transaction_id(now),
            consensus_at: now,
        })
    }

    async fn query_remote_state(&self, id: &ScheduleId) -> Result<RemoteSnapshot, LedgerError> {
        self.simulate_latency().await;

        let state = self.state.read().await;
        let schedule = state
            .schedules
            .get(id)
            .ok_or_else(|| LedgerError::ScheduleNotFound(id.clone()))?;

        // The ledger expires pending schedules lazily, on read
        let remote_state = match &schedule.state {
            RemoteState::Pending if self.clock.now() >= schedule.record.expiration_time => {
                RemoteState::Expired
            }
            other => other.clone(),
        };

        Ok(RemoteSnapshot {
            schedule_id: id.clone(),
            state: remote_state,
            memo: schedule.record.memo.clone(),
            expiration_time: schedule.record.expiration_time,
        })
    }

    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), LedgerError> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        let schedule = state
            .schedules
            .get_mut(id)
            .ok_or_else(|| LedgerError::ScheduleNotFound(id.clone()))?;

        match schedule.state {
            RemoteState::Pending => {
                schedule.state = RemoteState::Deleted {
                    at: self.clock.now(),
                };
                Ok(())
            }
            RemoteState::Executed { .. } => Err(LedgerError::AlreadyExecuted(id.clone())),
            _ => Err(LedgerError::Rejected(format!(
                "schedule {} is no longer pending",
                id
            ))),
        }
    }

    async fn get_balance(&self, account: &AccountId) -> Result<u64, LedgerError> {
        self.simulate_latency().await;

        let state = self.state.read().await;
        state
            .accounts
            .get(account)
            .map(|a| a.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    async fn create_account(
        &self,
        key_set: &KeySet,
        initial_balance: u64,
    ) -> Result<AccountId, LedgerError> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        let id = AccountId::new(self.next_entity(&mut state));
        state.accounts.insert(
            id.clone(),
            LedgerAccount {
                balance: initial_balance,
                key_set: Some(key_set.clone()),
            },
        );

        log::info!(
            "Created {} account {} with balance {}",
            key_set.description(),
            id,
            initial_balance
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::ledger::Payload;
    use crate::schedule::ManualClock;

    fn single_key_set() -> KeySet {
        KeySet::from_keys(&[KeyPair::generate()], 1).unwrap()
    }

    fn record(payload: Payload, payer: &AccountId) -> ScheduleRecord {
        record_with_keys(payload, payer, single_key_set())
    }

    fn record_with_keys(payload: Payload, payer: &AccountId, key_set: KeySet) -> ScheduleRecord {
        ScheduleRecord {
            payload,
            key_set,
            creator: payer.clone(),
            payer: payer.clone(),
            admin: None,
            memo: "test".to_string(),
            expiration_time: Utc::now() + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_accounts_and_balances() {
        let ledger = LocalLedger::with_defaults();
        assert_eq!(ledger.get_balance(ledger.operator()).await.unwrap(), 10_000);

        let account = ledger.create_account(&single_key_set(), 1000).await.unwrap();
        assert_eq!(account.as_str(), "0.0.1001");
        assert_eq!(ledger.get_balance(&account).await.unwrap(), 1000);

        let missing = AccountId::new("0.0.9999");
        assert!(matches!(
            ledger.get_balance(&missing).await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_applies_transfer_once() {
        let ledger = LocalLedger::with_defaults();
        let keys = single_key_set();
        let from = ledger.create_account(&keys, 1000).await.unwrap();
        let to = ledger.create_account(&single_key_set(), 0).await.unwrap();

        let payload = TransferPayload::new()
            .add_transfer(&from, -10)
            .add_transfer(&to, 10)
            .to_payload()
            .unwrap();
        let id = ledger
            .submit_schedule(&record_with_keys(payload, ledger.operator(), keys))
            .await
            .unwrap();

        let receipt = ledger.execute_payload(&id).await.unwrap();
        assert_eq!(receipt.schedule_id, id);
        assert!(receipt.transaction_id.starts_with("0.0.2@"));
        assert_eq!(ledger.get_balance(&from).await.unwrap(), 990);
        assert_eq!(ledger.get_balance(&to).await.unwrap(), 10);

        assert!(matches!(
            ledger.execute_payload(&id).await,
            Err(LedgerError::AlreadyExecuted(_))
        ));
        assert_eq!(ledger.get_balance(&to).await.unwrap(), 10);
        assert_eq!(ledger.execute_count(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_balances_untouched() {
        let ledger = LocalLedger::with_defaults();
        let keys = single_key_set();
        let from = ledger.create_account(&keys, 5).await.unwrap();
        let to = ledger.create_account(&single_key_set(), 0).await.unwrap();

        let payload = TransferPayload::new()
            .add_transfer(&from, -10)
            .add_transfer(&to, 10)
            .to_payload()
            .unwrap();
        let id = ledger
            .submit_schedule(&record_with_keys(payload, ledger.operator(), keys))
            .await
            .unwrap();

        assert!(matches!(
            ledger.execute_payload(&id).await,
            Err(LedgerError::InsufficientBalance { have: 5, need: 10, .. })
        ));
        assert_eq!(ledger.get_balance(&from).await.unwrap(), 5);
        assert_eq!(ledger.get_balance(&to).await.unwrap(), 0);

        let remote = ledger.query_remote_state(&id).await.unwrap();
        assert_eq!(remote.state, RemoteState::Pending);
    }

    #[tokio::test]
    async fn test_split_debit_checked_against_total() {
        let ledger = LocalLedger::with_defaults();
        let keys = single_key_set();
        let from = ledger.create_account(&keys, 1000).await.unwrap();
        let to = ledger.create_account(&single_key_set(), 0).await.unwrap();

        let payload = TransferPayload::new()
            .add_transfer(&from, -600)
            .add_transfer(&from, -600)
            .add_transfer(&to, 1200)
            .to_payload()
            .unwrap();
        let id = ledger
            .submit_schedule(&record_with_keys(payload, ledger.operator(), keys))
            .await
            .unwrap();

        assert!(matches!(
            ledger.execute_payload(&id).await,
            Err(LedgerError::InsufficientBalance { have: 1000, need: 1200, .. })
        ));
        assert_eq!(ledger.get_balance(&from).await.unwrap(), 1000);
        assert_eq!(ledger.get_balance(&to).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overflowing_amounts_rejected() {
        let ledger = LocalLedger::with_defaults();
        let keys = single_key_set();
        let from = ledger.create_account(&keys, 1000).await.unwrap();
        let to = ledger.create_account(&single_key_set(), 0).await.unwrap();

        let payload = TransferPayload::new()
            .add_transfer(&to, i64::MAX)
            .add_transfer(&to, i64::MAX)
            .add_transfer(&from, -1)
            .to_payload()
            .unwrap();
        let id = ledger
            .submit_schedule(&record_with_keys(payload, ledger.operator(), keys))
            .await
            .unwrap();

        assert!(matches!(
            ledger.execute_payload(&id).await,
            Err(LedgerError::InvalidPayload(_))
        ));
        assert_eq!(ledger.get_balance(&from).await.unwrap(), 1000);
        assert_eq!(ledger.get_balance(&to).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_debit_requires_account_key_list() {
        let ledger = LocalLedger::with_defaults();
        let from = ledger.create_account(&single_key_set(), 100).await.unwrap();
        let to = ledger.create_account(&single_key_set(), 0).await.unwrap();

        let payload = TransferPayload::new()
            .add_transfer(&from, -10)
            .add_transfer(&to, 10)
            .to_payload()
            .unwrap();
        // Authorized by some other key list
        let id = ledger
            .submit_schedule(&record(payload, ledger.operator()))
            .await
            .unwrap();

        assert!(matches!(
            ledger.execute_payload(&id).await,
            Err(LedgerError::KeyMismatch(account)) if account == from
        ));
        assert_eq!(ledger.get_balance(&from).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let ledger = LocalLedger::with_defaults();
        let to = ledger.create_account(&single_key_set(), 0).await.unwrap();
        let payload = TransferPayload::new()
            .add_transfer(ledger.operator(), -1)
            .add_transfer(&to, 1)
            .to_payload()
            .unwrap();
        let id = ledger
            .submit_schedule(&record(payload, ledger.operator()))
            .await
            .unwrap();

        ledger.fail_next_executions(1);
        assert!(matches!(
            ledger.execute_payload(&id).await,
            Err(LedgerError::Unavailable(_))
        ));
        assert!(ledger.execute_payload(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let ledger = LocalLedger::with_defaults();
        ledger.reject_submissions(true);

        let result = ledger
            .submit_schedule(&record(Payload::new(vec![1]), ledger.operator()))
            .await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));

        let unknown_payer = AccountId::new("0.0.4242");
        ledger.reject_submissions(false);
        let result = ledger
            .submit_schedule(&record(Payload::new(vec![1]), &unknown_payer))
            .await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_schedule() {
        let ledger = LocalLedger::with_defaults();
        let id = ledger
            .submit_schedule(&record(Payload::new(vec![1]), ledger.operator()))
            .await
            .unwrap();

        ledger.delete_schedule(&id).await.unwrap();
        let remote = ledger.query_remote_state(&id).await.unwrap();
        assert!(matches!(remote.state, RemoteState::Deleted { .. }));

        assert!(matches!(
            ledger.delete_schedule(&id).await,
            Err(LedgerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_schedule_reads_as_expired_after_deadline() {
        let ledger = LocalLedger::with_defaults();
        let mut expired = record(Payload::new(vec![1]), ledger.operator());
        expired.expiration_time = Utc::now() - chrono::Duration::seconds(1);

        let id = ledger.submit_schedule(&expired).await.unwrap();
        let remote = ledger.query_remote_state(&id).await.unwrap();
        assert_eq!(remote.state, RemoteState::Expired);
    }

    #[tokio::test]
    async fn test_expiry_follows_injected_clock() {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = LocalLedger::with_defaults().with_clock(clock.clone());
        let mut pending = record(Payload::new(vec![1]), ledger.operator());
        pending.expiration_time = clock.now() + chrono::Duration::minutes(5);

        let id = ledger.submit_schedule(&pending).await.unwrap();
        assert_eq!(
            ledger.query_remote_state(&id).await.unwrap().state,
            RemoteState::Pending
        );

        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(
            ledger.query_remote_state(&id).await.unwrap().state,
            RemoteState::Expired
        );
    }
}
