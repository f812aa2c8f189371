//! Shared, UI-observed application store.
//!
//! Caches publish full snapshots here after every mutation. Snapshots are
//! always lists: a failed re-read publishes an empty snapshot so the UI renders
//! an empty state instead of handling a missing value. Publishing with no
//! subscriber (e.g. after the screen that issued the call was torn down) is a
//! no-op.

use tokio::sync::watch;

use super::cart::CartLine;
use super::error::StorageResult;
use super::notifications::NotificationRecord;

/// Cart contents as last published.
#[derive(Debug, Clone, Default, PartialEq, uniffi::Record)]
pub struct CartSnapshot {
    /// Lines, most recently touched first.
    pub lines: Vec<CartLine>,
    /// Sum of all line quantities.
    pub total_count: u64,
}

impl CartSnapshot {
    pub(crate) fn from_lines(lines: Vec<CartLine>) -> Self {
        let total_count = lines.iter().map(|line| u64::from(line.quantity)).sum();
        Self { lines, total_count }
    }
}

/// One user's notifications as last published.
#[derive(Debug, Clone, Default, PartialEq, uniffi::Record)]
pub struct NotificationSnapshot {
    /// Owner of the records; empty before the first publish.
    pub user_id: String,
    /// Records, newest first.
    pub records: Vec<NotificationRecord>,
    /// Number of records with `read == false`.
    pub unread_count: u64,
}

impl NotificationSnapshot {
    pub(crate) fn from_records(user_id: &str, records: Vec<NotificationRecord>) -> Self {
        let unread_count = records.iter().filter(|record| !record.read).count() as u64;
        Self {
            user_id: user_id.to_string(),
            records,
            unread_count,
        }
    }
}

/// Reactive store observed by the UI layer.
#[derive(Debug, uniffi::Object)]
pub struct AppStore {
    cart: watch::Sender<CartSnapshot>,
    notifications: watch::Sender<NotificationSnapshot>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

#[uniffi::export]
impl AppStore {
    /// Creates a store holding empty snapshots.
    #[uniffi::constructor]
    #[must_use]
    pub fn new() -> Self {
        let (cart, _) = watch::channel(CartSnapshot::default());
        let (notifications, _) = watch::channel(NotificationSnapshot::default());
        Self {
            cart,
            notifications,
        }
    }

    /// Latest published cart snapshot.
    #[must_use]
    pub fn cart_snapshot(&self) -> CartSnapshot {
        self.cart.borrow().clone()
    }

    /// Latest published notification snapshot.
    #[must_use]
    pub fn notification_snapshot(&self) -> NotificationSnapshot {
        self.notifications.borrow().clone()
    }
}

impl AppStore {
    /// Subscribes to cart snapshots.
    #[must_use]
    pub fn subscribe_cart(&self) -> watch::Receiver<CartSnapshot> {
        self.cart.subscribe()
    }

    /// Subscribes to notification snapshots.
    #[must_use]
    pub fn subscribe_notifications(&self) -> watch::Receiver<NotificationSnapshot> {
        self.notifications.subscribe()
    }

    /// Publishes the re-read cart, or an empty cart if the re-read failed.
    pub(crate) fn publish_cart(&self, lines: &StorageResult<Vec<CartLine>>) {
        let snapshot = match lines {
            Ok(lines) => CartSnapshot::from_lines(lines.clone()),
            Err(err) => {
                log::warn!("cart re-read failed, publishing empty cart: {err}");
                CartSnapshot::default()
            }
        };
        self.cart.send_replace(snapshot);
    }

    /// Publishes a user's re-read notifications, or an empty list on failure.
    pub(crate) fn publish_notifications(
        &self,
        user_id: &str,
        records: &StorageResult<Vec<NotificationRecord>>,
    ) {
        let snapshot = match records {
            Ok(records) => NotificationSnapshot::from_records(user_id, records.clone()),
            Err(err) => {
                log::warn!(
                    "notification re-read failed, publishing empty list: {err}"
                );
                NotificationSnapshot::from_records(user_id, Vec::new())
            }
        };
        self.notifications.send_replace(snapshot);
    }
}
