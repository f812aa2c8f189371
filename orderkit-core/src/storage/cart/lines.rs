//! Cart line queries.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::util::{current_unix_millis, map_db_err, to_u32, to_u64};

use super::{CartLine, ProductSnapshot};

/// Next touch timestamp: wall clock, but strictly after every stored line so
/// "most recently touched" ordering survives several writes in one millisecond.
fn next_touch(conn: &Connection) -> StorageResult<i64> {
    let now = current_unix_millis()?;
    let latest: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(timestamp), 0) FROM cart_items",
            [],
            |row| row.get(0),
        )
        .map_err(|err| map_db_err(&err))?;
    Ok(now.max(latest.saturating_add(1)))
}

fn quantity_of(conn: &Connection, product_id: &str) -> StorageResult<Option<i64>> {
    conn.query_row(
        "SELECT quantity FROM cart_items WHERE product_id = ?1",
        params![product_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|err| map_db_err(&err))
}

pub(super) fn upsert(
    conn: &Connection,
    product_id: &str,
    snapshot: &ProductSnapshot,
    delta: u32,
) -> StorageResult<()> {
    let touched_at = next_touch(conn)?;
    match quantity_of(conn, product_id)? {
        Some(current) => {
            let merged = current.saturating_add(i64::from(delta));
            if merged > i64::from(u32::MAX) {
                return Err(StorageError::invalid_input(
                    "quantity",
                    format!("merged quantity {merged} exceeds the supported maximum"),
                ));
            }
            conn.execute(
                "UPDATE cart_items
                 SET quantity = ?1, timestamp = ?2
                 WHERE product_id = ?3",
                params![merged, touched_at, product_id],
            )
            .map_err(|err| map_db_err(&err))?;
        }
        None => {
            conn.execute(
                "INSERT INTO cart_items (
                    product_id,
                    product_name,
                    product_price,
                    product_image,
                    quantity,
                    timestamp
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    product_id,
                    snapshot.name,
                    snapshot.unit_price,
                    snapshot.image_url,
                    i64::from(delta),
                    touched_at
                ],
            )
            .map_err(|err| map_db_err(&err))?;
        }
    }
    Ok(())
}

pub(super) fn set_quantity(
    conn: &Connection,
    product_id: &str,
    quantity: u32,
) -> StorageResult<()> {
    let touched_at = next_touch(conn)?;
    let updated = conn
        .execute(
            "UPDATE cart_items
             SET quantity = ?1, timestamp = ?2
             WHERE product_id = ?3",
            params![i64::from(quantity), touched_at, product_id],
        )
        .map_err(|err| map_db_err(&err))?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("cart line {product_id}")));
    }
    Ok(())
}

pub(super) fn remove(conn: &Connection, product_id: &str) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM cart_items WHERE product_id = ?1",
        params![product_id],
    )
    .map_err(|err| map_db_err(&err))?;
    Ok(())
}

pub(super) fn clear(conn: &Connection) -> StorageResult<()> {
    conn.execute("DELETE FROM cart_items", [])
        .map_err(|err| map_db_err(&err))?;
    Ok(())
}

pub(super) fn list(conn: &Connection) -> StorageResult<Vec<CartLine>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, product_id, product_name, product_price, product_image, quantity, timestamp
             FROM cart_items
             ORDER BY timestamp DESC, id DESC",
        )
        .map_err(|err| map_db_err(&err))?;
    let rows = stmt
        .query_map([], read_row)
        .map_err(|err| map_db_err(&err))?;

    let mut lines = Vec::new();
    for row in rows {
        let (local_id, product_id, name, unit_price, image_url, quantity, touched_at) =
            row.map_err(|err| map_db_err(&err))?;
        lines.push(CartLine {
            local_id,
            product_id,
            name,
            unit_price,
            image_url,
            quantity: to_u32(quantity, "quantity")?,
            touched_at,
        });
    }
    Ok(lines)
}

pub(super) fn total_count(conn: &Connection) -> StorageResult<u64> {
    let total: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(quantity), 0) FROM cart_items",
            [],
            |row| row.get(0),
        )
        .map_err(|err| map_db_err(&err))?;
    to_u64(total, "total_count")
}

type RawLine = (i64, String, String, f64, Option<String>, i64, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawLine> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}
