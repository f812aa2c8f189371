//! Shared helpers for cache database operations.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::{StorageError, StorageResult};

pub(crate) fn map_db_err(err: &rusqlite::Error) -> StorageError {
    StorageError::CacheDb(err.to_string())
}

pub(crate) fn map_io_err(err: &io::Error) -> StorageError {
    StorageError::CacheDb(err.to_string())
}

pub(crate) fn map_json_err(err: &serde_json::Error) -> StorageError {
    StorageError::Serialization(err.to_string())
}

/// Milliseconds since the unix epoch.
pub(crate) fn current_unix_millis() -> StorageResult<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| {
            StorageError::CacheDb(format!("system time before unix epoch: {err}"))
        })?;
    i64::try_from(duration.as_millis()).map_err(|_| {
        StorageError::CacheDb("unix millis out of range for i64".to_string())
    })
}

pub(crate) fn to_u32(value: i64, label: &str) -> StorageResult<u32> {
    u32::try_from(value).map_err(|_| {
        StorageError::CacheDb(format!("{label} out of range for u32: {value}"))
    })
}

pub(crate) fn to_u64(value: i64, label: &str) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| {
        StorageError::CacheDb(format!("{label} out of range for u64: {value}"))
    })
}
