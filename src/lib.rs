//! Schedule Ledger: threshold-signature scheduled transactions in Rust
//!
//! This crate provides:
//! - K-of-N key lists with validated thresholds
//! - Order-independent signature collection with secp256k1 verification
//! - A schedule state machine (PENDING, EXECUTED, EXPIRED, DELETED) with
//!   exactly-once execution under concurrent signing
//! - A background expiry sweeper
//! - A ledger gateway trait with an in-process implementation
//! - JSON snapshot export
//!
//! # Example
//!
//! ```no_run
//! use schedule_ledger::config::SchedulerConfig;
//! use schedule_ledger::crypto::KeyPair;
//! use schedule_ledger::ledger::{LedgerGateway, LocalLedger, TransferPayload};
//! use schedule_ledger::schedule::{
//!     KeySet, NewSchedule, ScheduleRegistry, ScheduleSignature, SystemClock,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Arc::new(LocalLedger::with_defaults());
//! let registry = ScheduleRegistry::new(
//!     ledger.clone(),
//!     Arc::new(SystemClock),
//!     SchedulerConfig::default(),
//! );
//!
//! // 2-of-3 account holding 1000
//! let keys = KeyPair::generate_many(3);
//! let key_set = KeySet::from_keys(&keys, 2)?;
//! let account = ledger.create_account(&key_set, 1000).await?;
//!
//! let payload = TransferPayload::new()
//!     .add_transfer(&account, -10)
//!     .add_transfer(ledger.operator(), 10)
//!     .to_payload()?;
//! let id = registry
//!     .create(NewSchedule::new(payload, key_set, ledger.operator().clone()))
//!     .await?;
//!
//! let digest = registry.signing_digest(&id).await?;
//! registry.sign(&id, &ScheduleSignature::create(&keys[0], &digest)?).await?;
//! let outcome = registry.sign(&id, &ScheduleSignature::create(&keys[1], &digest)?).await?;
//! assert!(outcome.executed);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod schedule;
pub mod storage;

// Re-export commonly used types
pub use config::{LedgerConfig, SchedulerConfig};
pub use crypto::KeyPair;
pub use ledger::{
    AccountId, LedgerError, LedgerGateway, LocalLedger, Payload, ScheduleId, TransferPayload,
};
pub use schedule::{
    spawn_expiry_sweeper, KeySet, NewSchedule, ScheduleError, ScheduleRegistry,
    ScheduleSignature, ScheduleSnapshot, ScheduleState, SystemClock,
};
pub use storage::{load_snapshots, save_snapshots, StorageError};
