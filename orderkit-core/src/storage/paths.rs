//! Storage path helpers.

use std::path::{Path, PathBuf};

const CACHE_FILENAME: &str = "orderkit.cache.sqlite";

/// Paths for local storage artifacts under `<root>/orderkit`.
#[derive(Debug, Clone, uniffi::Object)]
pub struct StoragePaths {
    root: PathBuf,
    orderkit_dir: PathBuf,
}

impl StoragePaths {
    /// Builds storage paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let orderkit_dir = root.join("orderkit");
        Self { root, orderkit_dir }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the `OrderKit` storage directory.
    #[must_use]
    pub fn orderkit_dir(&self) -> &Path {
        &self.orderkit_dir
    }

    /// Returns the path to the local cache database.
    #[must_use]
    pub fn cache_db_path(&self) -> PathBuf {
        self.orderkit_dir.join(CACHE_FILENAME)
    }
}

#[uniffi::export]
impl StoragePaths {
    /// Builds storage paths from a root directory string.
    #[uniffi::constructor]
    #[must_use]
    pub fn from_root(root: String) -> Self {
        Self::new(PathBuf::from(root))
    }

    /// Returns the cache database path as a string.
    #[must_use]
    pub fn cache_db_path_string(&self) -> String {
        self.cache_db_path().to_string_lossy().to_string()
    }
}
