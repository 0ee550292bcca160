//! Configuration for the schedule registry and the local ledger
//!
//! Both are plain values handed to constructors; nothing is read from
//! process-wide state.

use crate::ledger::AccountId;
use std::time::Duration;

/// Schedules live for 30 minutes unless the creator asks otherwise
pub const DEFAULT_SCHEDULE_TTL_SECS: i64 = 30 * 60;

/// Longest memo the ledger accepts, in bytes
pub const MAX_MEMO_BYTES: usize = 100;

/// How often the expiry sweeper runs
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How long closed schedules stay queryable before being purged
pub const DEFAULT_RETENTION_SECS: i64 = 60 * 60;

/// Schedule registry configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// TTL applied when a schedule is created without one
    pub default_ttl: chrono::Duration,
    pub max_memo_len: usize,
    pub sweep_interval: Duration,
    /// Closed schedules older than this are dropped by the sweeper
    pub retention: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_ttl: chrono::Duration::seconds(DEFAULT_SCHEDULE_TTL_SECS),
            max_memo_len: MAX_MEMO_BYTES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            retention: chrono::Duration::seconds(DEFAULT_RETENTION_SECS),
        }
    }
}

/// Local ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Network name, informational only
    pub network: String,
    pub shard: u64,
    pub realm: u64,
    /// First entity number handed out for accounts and schedules
    pub first_entity_num: u64,
    /// Account that pays for schedule creation in the demo
    pub operator_account: AccountId,
    pub operator_initial_balance: u64,
    /// Artificial delay applied to every ledger call
    pub latency: Option<Duration>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network: "local".to_string(),
            shard: 0,
            realm: 0,
            first_entity_num: 1001,
            operator_account: AccountId::new("0.0.2"),
            operator_initial_balance: 10_000,
            latency: None,
        }
    }
}
