//! Schedule snapshot files
//!
//! Writes registry snapshots as pretty JSON for inspection or hand-off.
//! This is an export format, not a recovery log.

use crate::schedule::ScheduleSnapshot;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Snapshot file not found: {0}")]
    NotFound(PathBuf),
}

/// Temporary sibling used for the atomic write
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshots".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Save snapshots to `path`, replacing any existing file atomically
pub fn save_snapshots(path: &Path, snapshots: &[ScheduleSnapshot]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    // Write to temporary file first
    let temp = temp_path(path);
    if let Err(e) = write_then_rename(&temp, path, snapshots) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    log::debug!("Wrote {} snapshot(s) to {:?}", snapshots.len(), path);
    Ok(())
}

fn write_then_rename(
    temp: &Path,
    path: &Path,
    snapshots: &[ScheduleSnapshot],
) -> Result<(), StorageError> {
    let file = fs::File::create(temp)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, snapshots)?;
    writer.flush()?;
    drop(writer);

    fs::rename(temp, path)?;
    Ok(())
}

/// Load snapshots previously written by `save_snapshots`
pub fn load_snapshots(path: &Path) -> Result<Vec<ScheduleSnapshot>, StorageError> {
    if !path.exists() {
        return Err(StorageError::NotFound(path.to_path_buf()));
    }

    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
