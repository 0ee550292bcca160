//! Schedule Ledger CLI Application
//!
//! A command-line interface for threshold-signature scheduled transfers.

use clap::{Parser, Subcommand};
use schedule_ledger::cli::{self, DemoOptions};
use schedule_ledger::config::DEFAULT_SCHEDULE_TTL_SECS;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "schedule-ledger")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "K-of-N scheduled transactions on a local ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate secp256k1 key pairs
    Keygen {
        /// Number of key pairs
        #[arg(short, long, default_value = "1")]
        count: usize,
    },

    /// Schedule a transfer from a K-of-N account and sign it
    Demo {
        /// Keys in the account's key list
        #[arg(short, long, default_value = "3")]
        keys: usize,

        /// Signatures required to execute
        #[arg(short, long, default_value = "2")]
        threshold: usize,

        /// Amount to transfer
        #[arg(short, long, default_value = "10")]
        amount: u64,

        /// Seconds until the schedule expires
        #[arg(long, default_value_t = DEFAULT_SCHEDULE_TTL_SECS)]
        ttl: i64,

        /// Schedule memo
        #[arg(short, long, default_value = cli::DEMO_MEMO)]
        memo: String,

        /// Admin private key (hex) allowed to delete the schedule
        #[arg(long, env = "SCHEDULE_ADMIN_KEY", hide_env_values = true)]
        admin_key: Option<String>,

        /// Write a JSON snapshot of the registry to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { count } => {
            cli::cmd_keygen(count)?;
        }

        Commands::Demo {
            keys,
            threshold,
            amount,
            ttl,
            memo,
            admin_key,
            output,
        } => {
            let options = DemoOptions {
                keys,
                threshold,
                amount,
                ttl_secs: ttl,
                memo,
                admin_key,
                snapshot_out: output,
            };

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::cmd_demo(options))?;
        }
    }

    Ok(())
}
