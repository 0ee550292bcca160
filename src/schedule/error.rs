//! Errors raised by the schedule core

use crate::crypto::KeyError;
use crate::ledger::{LedgerError, ScheduleId};
use crate::schedule::{MemberId, ScheduleState};
use thiserror::Error;

/// Errors related to key lists, signatures and schedule lifecycle
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Duplicate key list member: {0}")]
    DuplicateMember(MemberId),
    #[error("Signer is not in the key list: {0}")]
    UnknownSigner(MemberId),
    #[error("Schedule {id} is closed ({state})")]
    ScheduleClosed { id: ScheduleId, state: ScheduleState },
    #[error("Schedule not found: {0}")]
    NotFound(ScheduleId),
    #[error("Not authorized to delete schedule {0}")]
    Unauthorized(ScheduleId),
    #[error("Ledger rejected the request: {0}")]
    PersistenceFailed(#[source] LedgerError),
    #[error("Execution of schedule {id} failed: {source}")]
    ExecutionFailed {
        id: ScheduleId,
        #[source]
        source: LedgerError,
    },
    #[error("Execution of schedule {0} is already in progress")]
    ExecutionInProgress(ScheduleId),
    #[error("Invalid signature from {0}")]
    InvalidSignature(MemberId),
    #[error("Invalid time to live: {0}")]
    InvalidTtl(chrono::Duration),
    #[error("Memo is {len} bytes, limit is {max}")]
    MemoTooLong { len: usize, max: usize },
    #[error("Schedule {id} has {have} of {need} required signatures")]
    ThresholdNotMet {
        id: ScheduleId,
        have: usize,
        need: usize,
    },
    #[error("Crypto error: {0}")]
    Crypto(#[from] KeyError),
}
