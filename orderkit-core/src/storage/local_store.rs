//! Handle to the embedded SQLite database shared by the local caches.
//!
//! One handle is constructed at bootstrap and passed (as `Arc<LocalStore>`) to
//! every cache. The connection is opened lazily on first use; the open happens
//! under the handle's mutex after re-checking the "already initialized" guard,
//! so concurrent first callers never open the database twice.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

use super::error::{StorageError, StorageResult};
use super::paths::StoragePaths;
use super::util::{map_db_err, map_io_err};

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// Lazily opened, process-wide handle to the local relational store.
#[derive(uniffi::Object)]
pub struct LocalStore {
    location: Location,
    conn: Mutex<Option<Connection>>,
    opens: AtomicUsize,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("location", &self.location)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[uniffi::export]
impl LocalStore {
    /// Creates a handle for the cache database under `paths`. Nothing is
    /// opened until the first cache operation.
    #[uniffi::constructor]
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(paths: Arc<StoragePaths>) -> Self {
        Self::with_location(Location::File(paths.cache_db_path()))
    }

    /// Creates a handle backed by a private in-memory database.
    #[uniffi::constructor]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    /// Whether the underlying connection has been opened.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.conn.lock().is_ok_and(|conn| conn.is_some())
    }

    /// Number of times the underlying database was opened. Always 0 or 1.
    #[must_use]
    pub fn open_count(&self) -> u32 {
        u32::try_from(self.opens.load(Ordering::SeqCst)).unwrap_or(u32::MAX)
    }
}

impl LocalStore {
    const fn with_location(location: Location) -> Self {
        Self {
            location,
            conn: Mutex::new(None),
            opens: AtomicUsize::new(0),
        }
    }

    /// Runs `f` with exclusive access to the connection, opening it first if needed.
    ///
    /// Holding the mutex for the whole closure serializes writes and keeps a
    /// write, its re-read and the resulting publish in one critical section.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or `f` fails.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StorageError::Lock("local store mutex poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(StorageError::CacheDb(
                "local store failed to initialize".to_string(),
            )),
        }
    }

    fn open(&self) -> StorageResult<Connection> {
        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|err| map_io_err(&err))?;
                }
                let conn = Connection::open(path).map_err(|err| map_db_err(&err))?;
                // journal_mode reports the resulting mode as a row.
                let _mode: String = conn
                    .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
                    .map_err(|err| map_db_err(&err))?;
                conn.pragma_update(None, "synchronous", "NORMAL")
                    .map_err(|err| map_db_err(&err))?;
                conn.busy_timeout(Duration::from_secs(5))
                    .map_err(|err| map_db_err(&err))?;
                conn
            }
            Location::Memory => {
                Connection::open_in_memory().map_err(|err| map_db_err(&err))?
            }
        };
        self.opens.fetch_add(1, Ordering::SeqCst);
        log::debug!("opened local store at {:?}", self.location);
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_open_is_lazy() {
        let store = LocalStore::in_memory();
        assert!(!store.is_initialized());
        assert_eq!(store.open_count(), 0);

        let one: i64 = store
            .with_conn(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get(0))
                    .map_err(|err| map_db_err(&err))
            })
            .unwrap();
        assert_eq!(one, 1);
        assert!(store.is_initialized());
        assert_eq!(store.open_count(), 1);
    }

    #[test]
    fn test_concurrent_first_callers_open_once() {
        let store = Arc::new(LocalStore::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.with_conn(|_| Ok(())))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(store.open_count(), 1);
    }

    #[test]
    fn test_file_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(StoragePaths::new(dir.path()));

        let first = LocalStore::new(Arc::clone(&paths));
        first
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE t (v INTEGER); INSERT INTO t (v) VALUES (7);",
                )
                .map_err(|err| map_db_err(&err))
            })
            .unwrap();
        drop(first);

        let second = LocalStore::new(paths);
        let v: i64 = second
            .with_conn(|conn| {
                conn.query_row("SELECT v FROM t", [], |row| row.get(0))
                    .map_err(|err| map_db_err(&err))
            })
            .unwrap();
        assert_eq!(v, 7);
    }
}
