//! In-memory [`KeyValueStore`] for tests and desktop tooling.
//!
//! Not secure: values live in process memory only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::error::{StorageError, StorageResult};
use super::traits::KeyValueStore;

/// Process-memory key-value store with switchable write failures.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set` fail, simulating an unavailable keystore.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `get` fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Whether `key` currently holds a value, bypassing failure injection.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values
            .lock()
            .is_ok_and(|values| values.contains_key(key))
    }

    fn lock(
        &self,
    ) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| StorageError::Keystore("mutex poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: String) -> StorageResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Keystore(format!("read refused for {key}")));
        }
        Ok(self.lock()?.get(&key).cloned())
    }

    fn set(&self, key: String, value: String) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Keystore(format!("write refused for {key}")));
        }
        self.lock()?.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: String) -> StorageResult<()> {
        self.lock()?.remove(&key);
        Ok(())
    }
}
