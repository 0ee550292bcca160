//! CLI commands for the schedule ledger
//!
//! Implements the command handlers for the CLI interface.

use crate::config::{LedgerConfig, SchedulerConfig};
use crate::crypto::KeyPair;
use crate::ledger::{AccountId, LedgerGateway, LocalLedger, TransferPayload};
use crate::schedule::{
    spawn_expiry_sweeper, KeySet, NewSchedule, ScheduleRegistry, ScheduleSignature,
    ScheduleSnapshot, SystemClock,
};
use crate::storage::save_snapshots;
use std::path::PathBuf;
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Memo attached to demo schedules
pub const DEMO_MEMO: &str = "Scheduled TX With Multi Signature Account";

/// Balance the demo's multisig account starts with
pub const DEMO_ACCOUNT_BALANCE: u64 = 1000;

/// Options for the scheduled-transfer walkthrough
#[derive(Clone, Debug)]
pub struct DemoOptions {
    /// Keys in the account's key list
    pub keys: usize,
    /// Signatures required
    pub threshold: usize,
    /// Amount moved by the scheduled transfer
    pub amount: u64,
    pub ttl_secs: i64,
    pub memo: String,
    /// Hex private key allowed to delete the schedule; generated if absent
    pub admin_key: Option<String>,
    /// Write the final registry snapshot here
    pub snapshot_out: Option<PathBuf>,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            keys: 3,
            threshold: 2,
            amount: 10,
            ttl_secs: crate::config::DEFAULT_SCHEDULE_TTL_SECS,
            memo: DEMO_MEMO.to_string(),
            admin_key: None,
            snapshot_out: None,
        }
    }
}

/// Generate key pairs and print them
pub fn cmd_keygen(count: usize) -> CliResult<Vec<KeyPair>> {
    if count == 0 {
        return Err("count must be at least 1".into());
    }

    let keys = KeyPair::generate_many(count);
    println!("🔑 Generated {} key pair(s)", count);
    for (i, key) in keys.iter().enumerate() {
        println!("\n   Key {}", i + 1);
        println!("   ├─ Private: {}", key.private_key_hex());
        println!("   └─ Public:  {}", key.public_key_hex());
    }

    Ok(keys)
}

fn print_schedule(snapshot: &ScheduleSnapshot) {
    println!("\n📋 Schedule {}", snapshot.id);
    println!("   ├─ Memo: {}", snapshot.memo);
    println!("   ├─ Creator: {}", snapshot.creator);
    println!("   ├─ Payer: {}", snapshot.payer);
    println!("   ├─ Key list: {}", snapshot.key_set.description());
    println!(
        "   ├─ Signatures: {}/{}",
        snapshot.signature_count(),
        snapshot.threshold()
    );
    println!("   ├─ State: {}", snapshot.state);
    println!("   ├─ Expires: {}", snapshot.expiration_time);
    match snapshot.executed_at {
        Some(at) => println!("   └─ Time of execution: {}", at),
        None => println!("   └─ The transaction has not been executed yet."),
    }
}

async fn print_balances(ledger: &LocalLedger, accounts: &[(&str, &AccountId)]) -> CliResult<()> {
    for (label, account) in accounts {
        let balance = ledger.get_balance(account).await?;
        println!("   {} ({}): {}", label, account, balance);
    }
    Ok(())
}

/// Walk through a scheduled transfer from a K-of-N account.
///
/// Creates the account on an in-process ledger, schedules a transfer out
/// of it and signs with the first `threshold` keys. Returns the final
/// view of the schedule.
pub async fn cmd_demo(options: DemoOptions) -> CliResult<ScheduleSnapshot> {
    let ledger = Arc::new(LocalLedger::new(LedgerConfig::default()));
    println!("🌐 Ledger: {}", ledger.network());

    // Key list for the multisig account
    let keys = KeyPair::generate_many(options.keys);
    let key_set = KeySet::from_keys(&keys, options.threshold)?;
    println!("🔐 Key list: {}", key_set.description());

    let account = ledger.create_account(&key_set, DEMO_ACCOUNT_BALANCE).await?;
    let receiver_key = KeyPair::generate();
    let receiver = ledger
        .create_account(&KeySet::from_keys(std::slice::from_ref(&receiver_key), 1)?, 0)
        .await?;
    println!("✅ Created multisig account {}", account);
    println!("✅ Created receiver account {}", receiver);

    println!("\n💰 Balances before");
    print_balances(&ledger, &[("Multisig", &account), ("Receiver", &receiver)]).await?;

    let ttl = chrono::Duration::try_seconds(options.ttl_secs).ok_or("ttl is out of range")?;
    let admin = match &options.admin_key {
        Some(hex_key) => KeyPair::from_private_key_hex(hex_key)?,
        None => KeyPair::generate(),
    };

    let amount = i64::try_from(options.amount)?;
    let payload = TransferPayload::new()
        .add_transfer(&account, -amount)
        .add_transfer(&receiver, amount)
        .to_payload()?;

    let registry = Arc::new(ScheduleRegistry::new(
        ledger.clone(),
        Arc::new(SystemClock),
        SchedulerConfig::default(),
    ));
    let sweeper = spawn_expiry_sweeper(registry.clone());

    let id = registry
        .create(
            NewSchedule::new(payload, key_set, ledger.operator().clone())
                .with_admin(admin.public_key_hex())
                .with_memo(options.memo.clone())
                .with_ttl(ttl),
        )
        .await?;
    println!("\n🗓️  Scheduled transfer of {} as {}", options.amount, id);
    print_schedule(&registry.query(&id).await?);

    let digest = registry.signing_digest(&id).await?;
    for (i, key) in keys.iter().take(options.threshold).enumerate() {
        let outcome = registry
            .sign(&id, &ScheduleSignature::create(key, &digest)?)
            .await?;
        println!(
            "\n✍️  Signature {} submitted ({}/{})",
            i + 1,
            outcome.count,
            outcome.threshold
        );
        if outcome.executed {
            println!("🚀 Threshold reached, transfer executed");
        }
    }

    let snapshot = registry.query(&id).await?;
    print_schedule(&snapshot);

    println!("\n💰 Balances after");
    print_balances(&ledger, &[("Multisig", &account), ("Receiver", &receiver)]).await?;

    if let Some(path) = &options.snapshot_out {
        save_snapshots(path, &registry.list().await)?;
        println!("\n📁 Snapshot written to {:?}", path);
    }

    sweeper.shutdown().await;
    Ok(snapshot)
}
