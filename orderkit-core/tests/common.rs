//! Common test utilities shared across integration tests.
#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use orderkit_core::storage::{
    AppStore, CartCache, LocalStore, NotificationCache, ProductSnapshot, StoragePaths,
};
use uuid::Uuid;

pub fn temp_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("orderkit-test-{}", Uuid::new_v4()));
    path
}

/// Caches over one on-disk store, as wired at app bootstrap.
pub struct Caches {
    pub store: Arc<LocalStore>,
    pub app_store: Arc<AppStore>,
    pub cart: CartCache,
    pub notifications: NotificationCache,
}

pub fn open_caches(root: &Path) -> Caches {
    let paths = Arc::new(StoragePaths::new(root));
    let store = Arc::new(LocalStore::new(paths));
    let app_store = Arc::new(AppStore::new());
    let cart = CartCache::new(Arc::clone(&store), Arc::clone(&app_store)).expect("cart cache");
    let notifications = NotificationCache::new(Arc::clone(&store), Arc::clone(&app_store))
        .expect("notification cache");
    Caches {
        store,
        app_store,
        cart,
        notifications,
    }
}

pub fn product(name: &str, unit_price: f64) -> ProductSnapshot {
    ProductSnapshot {
        name: name.to_string(),
        unit_price,
        image_url: None,
    }
}

pub fn cleanup_storage(root: &Path) {
    let _ = fs::remove_dir_all(root);
}
