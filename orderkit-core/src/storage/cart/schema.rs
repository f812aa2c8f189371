//! Cart table schema.

use rusqlite::Connection;

use crate::storage::error::StorageResult;
use crate::storage::util::map_db_err;

pub(super) fn ensure_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cart_items (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id      TEXT    NOT NULL UNIQUE,
            product_name    TEXT    NOT NULL,
            product_price   REAL    NOT NULL,
            product_image   TEXT,
            quantity        INTEGER NOT NULL CHECK (quantity > 0),
            timestamp       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cart_items_timestamp
        ON cart_items (timestamp);",
    )
    .map_err(|err| map_db_err(&err))
}
