//! Local notification cache.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::Connection;

use super::app_store::AppStore;
use super::error::{StorageError, StorageResult};
use super::local_store::LocalStore;
use super::util::current_unix_millis;

mod payload;
mod records;
mod schema;

pub use payload::{NotificationPayload, NotificationType};
pub use schema::SchemaOutcome;

/// A notification received by a user.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct NotificationRecord {
    /// Local row id, used by [`NotificationCache::mark_read`].
    pub local_id: i64,
    /// Owner of the notification.
    pub user_id: String,
    /// Headline.
    pub title: String,
    /// Message text.
    pub body: String,
    /// Typed content.
    pub payload: NotificationPayload,
    /// Whether the user has opened it.
    pub read: bool,
    /// Receipt time, unix milliseconds.
    pub created_at: i64,
}

/// A push message as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct PushEvent {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// String data map; `type` selects the payload variant.
    pub data: HashMap<String, String>,
}

/// Notification storage backed by the local store, republishing the affected
/// user's list to the [`AppStore`] after every mutation.
#[derive(Debug, uniffi::Object)]
pub struct NotificationCache {
    store: Arc<LocalStore>,
    app_store: Arc<AppStore>,
    schema_outcome: SchemaOutcome,
}

#[uniffi::export]
impl NotificationCache {
    /// Creates the cache, creating or migrating the notifications table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the table cannot be
    /// brought to the current schema.
    #[uniffi::constructor]
    pub fn new(store: Arc<LocalStore>, app_store: Arc<AppStore>) -> StorageResult<Self> {
        let schema_outcome = store.with_conn(|conn| schema::ensure_schema(conn))?;
        Ok(Self {
            store,
            app_store,
            schema_outcome,
        })
    }

    /// What table initialization did when this cache was created.
    #[must_use]
    pub const fn schema_outcome(&self) -> SchemaOutcome {
        self.schema_outcome
    }

    /// Stores a new unread notification and returns the user's fresh list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty user id, or a database error.
    #[allow(clippy::needless_pass_by_value)]
    pub fn record(
        &self,
        user_id: String,
        title: String,
        body: String,
        payload: NotificationPayload,
    ) -> StorageResult<Vec<NotificationRecord>> {
        validate_user_id(&user_id)?;
        let created_at = current_unix_millis()?;
        self.mutate(|conn| {
            records::insert(conn, &user_id, &title, &body, &payload, created_at)?;
            Ok(user_id.clone())
        })
    }

    /// Stores a notification whose payload arrives as a type tag and JSON
    /// data, validating the data against the declared type first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the type is unknown or the data does not match
    /// it; nothing is written in that case.
    #[allow(clippy::needless_pass_by_value)]
    pub fn record_raw(
        &self,
        user_id: String,
        title: String,
        body: String,
        notification_type: String,
        data_json: String,
    ) -> StorageResult<Vec<NotificationRecord>> {
        let payload = NotificationPayload::from_parts(&notification_type, &data_json)?;
        self.record(user_id, title, body, payload)
    }

    /// Stores a notification built from a received push message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the push data is malformed for its type.
    pub fn record_push_event(
        &self,
        user_id: String,
        event: PushEvent,
    ) -> StorageResult<Vec<NotificationRecord>> {
        let payload = NotificationPayload::from_push_data(&event.data)?;
        self.record(user_id, event.title, event.body, payload)
    }

    /// The user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database error. Rows whose payload cannot be decoded are
    /// listed as [`NotificationPayload::General`].
    #[allow(clippy::needless_pass_by_value)]
    pub fn list(&self, user_id: String) -> StorageResult<Vec<NotificationRecord>> {
        self.store.with_conn(|conn| records::list(conn, &user_id))
    }

    /// Number of unread notifications for the user.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    #[allow(clippy::needless_pass_by_value)]
    pub fn unread_count(&self, user_id: String) -> StorageResult<u64> {
        self.store.with_conn(|conn| records::unread_count(conn, &user_id))
    }

    /// Marks one notification read and returns its owner's fresh list.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a database error.
    pub fn mark_read(&self, local_id: i64) -> StorageResult<Vec<NotificationRecord>> {
        self.mutate(|conn| records::mark_read(conn, local_id))
    }

    /// Deletes every notification of the user; other users are untouched.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    #[allow(clippy::needless_pass_by_value)]
    pub fn clear_all(&self, user_id: String) -> StorageResult<Vec<NotificationRecord>> {
        self.mutate(|conn| {
            records::clear_for_user(conn, &user_id)?;
            Ok(user_id.clone())
        })
    }

    /// Re-reads and publishes the user's list.
    ///
    /// # Errors
    ///
    /// Returns a database error; an empty list is published in that case.
    #[allow(clippy::needless_pass_by_value)]
    pub fn refresh(&self, user_id: String) -> StorageResult<Vec<NotificationRecord>> {
        let records = self.list(user_id.clone());
        self.app_store.publish_notifications(&user_id, &records);
        records
    }
}

impl NotificationCache {
    /// Runs `write`, which returns the affected user, then re-reads and
    /// publishes that user's list under the same connection lock.
    ///
    /// Only a failed write is an error. A failed re-read after a committed
    /// write is logged and returned as an empty list, matching the empty
    /// snapshot, so a retrying caller cannot record the same notification twice.
    fn mutate(
        &self,
        write: impl FnOnce(&Connection) -> StorageResult<String>,
    ) -> StorageResult<Vec<NotificationRecord>> {
        self.store.with_conn(|conn| {
            let user_id = write(conn)?;
            let records = records::list(conn, &user_id);
            self.app_store.publish_notifications(&user_id, &records);
            Ok(records.unwrap_or_else(|err| {
                log::warn!("notification write committed but re-read failed: {err}");
                Vec::new()
            }))
        })
    }
}

fn validate_user_id(user_id: &str) -> StorageResult<()> {
    if user_id.trim().is_empty() {
        return Err(StorageError::invalid_input("user_id", "must not be empty"));
    }
    Ok(())
}
