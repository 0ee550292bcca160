//! Ledger gateway
//!
//! The only component that talks to the ledger network. The schedule core
//! depends on the `LedgerGateway` trait; `LocalLedger` is an in-process
//! implementation used by the demo and the tests.

pub mod local;
pub mod types;

pub use local::LocalLedger;
pub use types::{
    AccountId, ExecutionReceipt, Payload, RemoteSnapshot, RemoteState, ScheduleId,
    ScheduleRecord, Transfer, TransferPayload,
};

use crate::schedule::KeySet;
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a ledger gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("Schedule not found on ledger: {0}")]
    ScheduleNotFound(ScheduleId),
    #[error("Schedule already executed: {0}")]
    AlreadyExecuted(ScheduleId),
    #[error("Insufficient balance in {account}: have {have}, need {need}")]
    InsufficientBalance {
        account: AccountId,
        have: u64,
        need: u64,
    },
    #[error("Debit from {0} is not authorized by the schedule's key list")]
    KeyMismatch(AccountId),
    #[error("Transfers do not balance: net {0}")]
    UnbalancedTransfer(i64),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Rejected by ledger: {0}")]
    Rejected(String),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Operations the schedule core needs from the ledger.
///
/// Implementations must be safe to call concurrently. Calls may be slow;
/// the registry never holds its map lock across them.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Persist a new schedule, returning the id the ledger assigned
    async fn submit_schedule(&self, record: &ScheduleRecord) -> Result<ScheduleId, LedgerError>;

    /// Apply the schedule's payload
    async fn execute_payload(&self, id: &ScheduleId) -> Result<ExecutionReceipt, LedgerError>;

    /// Read the ledger's view of a schedule
    async fn query_remote_state(&self, id: &ScheduleId) -> Result<RemoteSnapshot, LedgerError>;

    /// Mark a pending schedule deleted on the ledger
    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), LedgerError>;

    async fn get_balance(&self, account: &AccountId) -> Result<u64, LedgerError>;

    /// Open an account controlled by `key_set`
    async fn create_account(
        &self,
        key_set: &KeySet,
        initial_balance: u64,
    ) -> Result<AccountId, LedgerError>;
}
