//! On-device storage: the bearer credential store, the shared SQLite handle
//! and the cart and notification caches that publish into the [`AppStore`].

pub mod app_store;
pub mod cart;
pub mod credential_store;
pub mod error;
pub mod local_store;
pub mod memory;
pub mod notifications;
pub mod paths;
pub mod traits;

pub(crate) mod util;

pub use app_store::{AppStore, CartSnapshot, NotificationSnapshot};
pub use cart::{CartCache, CartLine, ProductSnapshot};
pub use credential_store::{CredentialBackend, CredentialStore, StoredCredential};
pub use error::{StorageError, StorageResult};
pub use local_store::LocalStore;
pub use memory::MemoryKeyValueStore;
pub use notifications::{
    NotificationCache, NotificationPayload, NotificationRecord, NotificationType, PushEvent,
    SchemaOutcome,
};
pub use paths::StoragePaths;
pub use traits::KeyValueStore;
