//! Snapshot export

pub mod snapshot;

pub use snapshot::{load_snapshots, save_snapshots, StorageError};
