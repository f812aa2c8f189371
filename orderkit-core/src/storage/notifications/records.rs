//! Notification row queries.

use rusqlite::{params, Connection, OptionalExtension};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::util::{map_db_err, to_u64};

use super::{NotificationPayload, NotificationRecord};

pub(super) fn insert(
    conn: &Connection,
    user_id: &str,
    title: &str,
    body: &str,
    payload: &NotificationPayload,
    created_at: i64,
) -> StorageResult<i64> {
    let (kind, data) = payload.to_parts()?;
    conn.execute(
        "INSERT INTO notifications (user_id, title, body, type, data, read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![user_id, title, body, kind.as_ref(), data, created_at],
    )
    .map_err(|err| map_db_err(&err))?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn list(conn: &Connection, user_id: &str) -> StorageResult<Vec<NotificationRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id,
                    COALESCE(title, ''),
                    COALESCE(body, ''),
                    COALESCE(type, 'GENERAL'),
                    COALESCE(data, '{}'),
                    COALESCE(read, 0),
                    CAST(COALESCE(created_at, 0) AS INTEGER)
             FROM notifications
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )
        .map_err(|err| map_db_err(&err))?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })
        .map_err(|err| map_db_err(&err))?;

    let mut records = Vec::new();
    for row in rows {
        let (local_id, title, body, kind, data, read, created_at) =
            row.map_err(|err| map_db_err(&err))?;
        // Rows written by a newer build (or damaged) keep their text.
        let payload = NotificationPayload::from_parts(&kind, &data).unwrap_or_else(|err| {
            log::warn!("notification {local_id} read as GENERAL: {err}");
            NotificationPayload::General
        });
        records.push(NotificationRecord {
            local_id,
            user_id: user_id.to_string(),
            title,
            body,
            payload,
            read,
            created_at,
        });
    }
    Ok(records)
}

pub(super) fn unread_count(conn: &Connection, user_id: &str) -> StorageResult<u64> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|err| map_db_err(&err))?;
    to_u64(count, "unread_count")
}

/// Marks a record read, returning its owner.
pub(super) fn mark_read(conn: &Connection, local_id: i64) -> StorageResult<String> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT user_id FROM notifications WHERE id = ?1",
            params![local_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| map_db_err(&err))?;
    let owner = owner.ok_or_else(|| StorageError::NotFound(format!("notification {local_id}")))?;
    conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1",
        params![local_id],
    )
    .map_err(|err| map_db_err(&err))?;
    Ok(owner)
}

pub(super) fn clear_for_user(conn: &Connection, user_id: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM notifications WHERE user_id = ?1",
        params![user_id],
    )
    .map_err(|err| map_db_err(&err))?;
    Ok(())
}
