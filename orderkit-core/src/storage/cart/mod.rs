//! Local cart cache.
//!
//! One row per product. Adding an already-present product merges quantities
//! (`upsert_line`), while the quantity stepper overwrites
//! (`set_line_quantity`); the two call paths keep their distinct semantics.

use std::sync::Arc;

use rusqlite::Connection;

use super::app_store::AppStore;
use super::error::{StorageError, StorageResult};
use super::local_store::LocalStore;

mod lines;
mod schema;

/// A product line in the cart.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct CartLine {
    /// Local row id.
    pub local_id: i64,
    /// Catalog product id; unique within the cart.
    pub product_id: String,
    /// Display name captured when the product was first added.
    pub name: String,
    /// Unit price captured when the product was first added.
    pub unit_price: f64,
    /// Product image, if any.
    pub image_url: Option<String>,
    /// Always at least 1.
    pub quantity: u32,
    /// Last mutation time, unix milliseconds.
    pub touched_at: i64,
}

/// Product details captured into a new cart line.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct ProductSnapshot {
    /// Display name.
    pub name: String,
    /// Unit price.
    pub unit_price: f64,
    /// Product image, if any.
    pub image_url: Option<String>,
}

/// Cart storage backed by the local store, republishing to the [`AppStore`].
#[derive(Debug, uniffi::Object)]
pub struct CartCache {
    store: Arc<LocalStore>,
    app_store: Arc<AppStore>,
}

#[uniffi::export]
impl CartCache {
    /// Creates the cache, ensuring the cart table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the schema created.
    #[uniffi::constructor]
    pub fn new(store: Arc<LocalStore>, app_store: Arc<AppStore>) -> StorageResult<Self> {
        store.with_conn(|conn| schema::ensure_schema(conn))?;
        Ok(Self { store, app_store })
    }

    /// Adds `delta_quantity` units of a product, merging into an existing line.
    ///
    /// Returns the fresh cart, which is also published to the app store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive delta (before any I/O), or a
    /// database error.
    #[allow(clippy::needless_pass_by_value)]
    pub fn upsert_line(
        &self,
        product_id: String,
        snapshot: ProductSnapshot,
        delta_quantity: i64,
    ) -> StorageResult<Vec<CartLine>> {
        validate_product_id(&product_id)?;
        let delta = positive_quantity("delta_quantity", delta_quantity)?;
        if !snapshot.unit_price.is_finite() || snapshot.unit_price < 0.0 {
            return Err(StorageError::invalid_input(
                "unit_price",
                "must be a finite, non-negative amount",
            ));
        }
        self.mutate(|conn| lines::upsert(conn, &product_id, &snapshot, delta))
    }

    /// Overwrites the quantity of an existing line.
    ///
    /// Zero or negative quantities are rejected; use [`Self::remove_line`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-positive quantity (before any I/O),
    /// `NotFound` if the product has no line, or a database error.
    #[allow(clippy::needless_pass_by_value)]
    pub fn set_line_quantity(
        &self,
        product_id: String,
        quantity: i64,
    ) -> StorageResult<Vec<CartLine>> {
        validate_product_id(&product_id)?;
        let quantity = positive_quantity("quantity", quantity)?;
        self.mutate(|conn| lines::set_quantity(conn, &product_id, quantity))
    }

    /// Removes a product's line. Removing an absent product is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    #[allow(clippy::needless_pass_by_value)]
    pub fn remove_line(&self, product_id: String) -> StorageResult<Vec<CartLine>> {
        self.mutate(|conn| lines::remove(conn, &product_id))
    }

    /// Deletes every line, e.g. after an order was placed.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn clear_all(&self) -> StorageResult<Vec<CartLine>> {
        self.mutate(lines::clear)
    }

    /// All lines, most recently touched first.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn list(&self) -> StorageResult<Vec<CartLine>> {
        self.store.with_conn(|conn| lines::list(conn))
    }

    /// Sum of all quantities; 0 for an empty cart.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn total_count(&self) -> StorageResult<u64> {
        self.store.with_conn(|conn| lines::total_count(conn))
    }

    /// Re-reads the cart and publishes it, e.g. when the app starts.
    ///
    /// On failure an empty cart is published and the error returned.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn refresh(&self) -> StorageResult<Vec<CartLine>> {
        let lines = self.list();
        self.app_store.publish_cart(&lines);
        lines
    }
}

impl CartCache {
    /// Applies `write`, then re-reads and publishes under the same connection
    /// lock, so the published cart always reflects the last completed write.
    ///
    /// Only a failed write is an error. Once the write committed, a failed
    /// re-read is logged and surfaces as an empty list (and empty snapshot), so
    /// callers never retry a write that already happened.
    fn mutate(
        &self,
        write: impl FnOnce(&Connection) -> StorageResult<()>,
    ) -> StorageResult<Vec<CartLine>> {
        self.store.with_conn(|conn| {
            write(conn)?;
            let lines = lines::list(conn);
            self.app_store.publish_cart(&lines);
            Ok(lines.unwrap_or_else(|err| {
                log::warn!("cart write committed but re-read failed: {err}");
                Vec::new()
            }))
        })
    }
}

fn validate_product_id(product_id: &str) -> StorageResult<()> {
    if product_id.trim().is_empty() {
        return Err(StorageError::invalid_input("product_id", "must not be empty"));
    }
    Ok(())
}

fn positive_quantity(attribute: &str, value: i64) -> StorageResult<u32> {
    if value <= 0 {
        return Err(StorageError::invalid_input(
            attribute,
            format!("must be positive, got {value}"),
        ));
    }
    u32::try_from(value).map_err(|_| {
        StorageError::invalid_input(attribute, format!("{value} exceeds the supported maximum"))
    })
}
