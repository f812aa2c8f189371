//! Notification table schema and its one-time evolution.
//!
//! Databases created before typed payloads lack the `type` column. It is
//! added in place, tagging old rows as `GENERAL`; if SQLite refuses the
//! `ALTER`, the table is dropped and recreated and its rows are lost.
//!
//! Those older tables stored `created_at` as `DATETIME` text
//! (`CURRENT_TIMESTAMP`, e.g. `2024-01-02 03:04:05`) and allowed a NULL
//! `data`. Kept rows are rewritten to unix milliseconds and `'{}'`.

use rusqlite::Connection;

use crate::storage::error::StorageResult;
use crate::storage::util::{map_db_err, to_u64};

/// What schema initialization did to the notifications table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SchemaOutcome {
    /// Table did not exist and was created.
    Created,
    /// Table already had the current shape.
    Current,
    /// The `type` column was added; existing rows were kept.
    ColumnAdded,
    /// The table was dropped and recreated.
    Recreated {
        /// Rows discarded with the old table.
        rows_lost: u64,
    },
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS notifications (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT    NOT NULL,
        title       TEXT    NOT NULL,
        body        TEXT    NOT NULL,
        type        TEXT    NOT NULL DEFAULT 'GENERAL',
        data        TEXT    NOT NULL DEFAULT '{}',
        read        INTEGER NOT NULL DEFAULT 0,
        created_at  INTEGER NOT NULL
    );";

/// Rewrites legacy text timestamps to unix milliseconds. Digit-only text is
/// already a number; anything SQLite cannot parse as a date becomes 0.
const NORMALIZE_LEGACY_ROWS: &str = "
    UPDATE notifications
    SET created_at = CAST(created_at AS INTEGER)
    WHERE typeof(created_at) = 'text'
      AND created_at <> ''
      AND created_at NOT GLOB '*[^0-9]*';

    UPDATE notifications
    SET created_at = COALESCE(CAST(strftime('%s', created_at) AS INTEGER) * 1000, 0)
    WHERE typeof(created_at) = 'null'
       OR (typeof(created_at) = 'text'
           AND (created_at = '' OR created_at GLOB '*[^0-9]*'));

    UPDATE notifications SET data = '{}' WHERE data IS NULL OR data = '';
    UPDATE notifications SET read = 0 WHERE read IS NULL;";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_notifications_user_created
    ON notifications (user_id, created_at);";

pub(super) fn ensure_schema(conn: &Connection) -> StorageResult<SchemaOutcome> {
    ensure_schema_with(conn, |conn| {
        conn.execute_batch(
            "ALTER TABLE notifications ADD COLUMN type TEXT NOT NULL DEFAULT 'GENERAL';",
        )
    })
}

/// Brings the table to the current shape, using `add_type_column` for the
/// in-place migration.
pub(super) fn ensure_schema_with(
    conn: &Connection,
    add_type_column: impl FnOnce(&Connection) -> rusqlite::Result<()>,
) -> StorageResult<SchemaOutcome> {
    let columns = table_columns(conn)?;
    let outcome = if columns.is_empty() {
        create(conn)?;
        SchemaOutcome::Created
    } else if columns.iter().any(|column| column == "type") {
        SchemaOutcome::Current
    } else {
        match add_type_column(conn) {
            Ok(()) => {
                conn.execute_batch(NORMALIZE_LEGACY_ROWS)
                    .map_err(|err| map_db_err(&err))?;
                SchemaOutcome::ColumnAdded
            }
            Err(err) => {
                log::warn!("adding notifications.type failed ({err}), recreating table");
                let rows: i64 = conn
                    .query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
                    .map_err(|err| map_db_err(&err))?;
                conn.execute_batch("DROP TABLE notifications;")
                    .map_err(|err| map_db_err(&err))?;
                create(conn)?;
                SchemaOutcome::Recreated {
                    rows_lost: to_u64(rows, "rows_lost")?,
                }
            }
        }
    };
    conn.execute_batch(CREATE_INDEX)
        .map_err(|err| map_db_err(&err))?;

    match outcome {
        SchemaOutcome::Recreated { rows_lost } => {
            log::warn!("notifications schema recreated, {rows_lost} rows lost");
        }
        other => log::info!("notifications schema: {other:?}"),
    }
    Ok(outcome)
}

fn create(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(CREATE_TABLE)
        .map_err(|err| map_db_err(&err))
}

fn table_columns(conn: &Connection) -> StorageResult<Vec<String>> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(notifications)")
        .map_err(|err| map_db_err(&err))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|err| map_db_err(&err))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| map_db_err(&err))
}
