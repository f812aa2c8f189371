//! Typed notification payloads.
//!
//! A payload is stored as its type tag plus a JSON `data` object, e.g.
//! `ORDER_STATUS_UPDATE` / `{"orderId":"o-1","status":"shipped"}`.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::util::map_json_err;

/// Discriminant of a [`NotificationPayload`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, uniffi::Enum,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// An order moved to a new status.
    OrderStatusUpdate,
    /// A product went on discount.
    ProductDiscount,
    /// An order was placed.
    OrderPlaced,
    /// Free-form message without structured data.
    General,
}

/// Notification content, tagged by [`NotificationType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Enum)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum NotificationPayload {
    /// An order moved to `status`.
    OrderStatusUpdate {
        /// Backend order id.
        order_id: String,
        /// New order status, e.g. `shipped`.
        status: String,
    },
    /// A product is discounted by `discount_percent`.
    ProductDiscount {
        /// Catalog product id.
        product_id: String,
        /// Discount, in percent.
        discount_percent: f64,
    },
    /// An order totalling `total` was placed.
    OrderPlaced {
        /// Backend order id.
        order_id: String,
        /// Order total.
        total: f64,
    },
    /// No structured data.
    General,
}

impl NotificationPayload {
    /// The payload's type tag.
    #[must_use]
    pub const fn kind(&self) -> NotificationType {
        match self {
            Self::OrderStatusUpdate { .. } => NotificationType::OrderStatusUpdate,
            Self::ProductDiscount { .. } => NotificationType::ProductDiscount,
            Self::OrderPlaced { .. } => NotificationType::OrderPlaced,
            Self::General => NotificationType::General,
        }
    }

    /// Splits the payload into its stored `(type, data)` columns.
    pub(crate) fn to_parts(&self) -> StorageResult<(NotificationType, String)> {
        let data = match serde_json::to_value(self).map_err(|err| map_json_err(&err))? {
            Value::Object(mut map) => map.remove("data").unwrap_or_else(|| json!({})),
            _ => json!({}),
        };
        let data = serde_json::to_string(&data).map_err(|err| map_json_err(&err))?;
        Ok((self.kind(), data))
    }

    /// Rebuilds a payload from a type tag and a JSON `data` object, rejecting
    /// data that does not match the declared type.
    pub(crate) fn from_parts(kind: &str, data: &str) -> StorageResult<Self> {
        let kind = NotificationType::from_str(kind).map_err(|_| {
            StorageError::invalid_input("type", format!("unknown notification type `{kind}`"))
        })?;
        let data: Value = serde_json::from_str(data).map_err(|err| {
            StorageError::invalid_input("data", format!("not valid JSON: {err}"))
        })?;
        if !data.is_object() {
            return Err(StorageError::invalid_input("data", "must be a JSON object"));
        }
        if kind == NotificationType::General {
            return Ok(Self::General);
        }

        serde_json::from_value(json!({ "type": kind.as_ref(), "data": data })).map_err(|err| {
            StorageError::invalid_input("data", format!("does not match {kind}: {err}"))
        })
    }

    /// Builds a payload from a push message's string data map.
    ///
    /// A missing `type` key yields [`NotificationPayload::General`].
    pub(crate) fn from_push_data(data: &HashMap<String, String>) -> StorageResult<Self> {
        let Some(kind) = data.get("type") else {
            return Ok(Self::General);
        };
        let kind = NotificationType::from_str(kind).map_err(|_| {
            StorageError::invalid_input("type", format!("unknown notification type `{kind}`"))
        })?;
        let payload = match kind {
            NotificationType::OrderStatusUpdate => Self::OrderStatusUpdate {
                order_id: required(data, "orderId")?.to_string(),
                status: required(data, "status")?.to_string(),
            },
            NotificationType::ProductDiscount => Self::ProductDiscount {
                product_id: required(data, "productId")?.to_string(),
                discount_percent: number(data, "discountPercent")?,
            },
            NotificationType::OrderPlaced => Self::OrderPlaced {
                order_id: required(data, "orderId")?.to_string(),
                total: number(data, "total")?,
            },
            NotificationType::General => Self::General,
        };
        Ok(payload)
    }
}

fn required<'a>(data: &'a HashMap<String, String>, key: &str) -> StorageResult<&'a str> {
    data.get(key)
        .map(String::as_str)
        .ok_or_else(|| StorageError::invalid_input(key, "missing from push data"))
}

fn number(data: &HashMap<String, String>, key: &str) -> StorageResult<f64> {
    let raw = required(data, key)?;
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| StorageError::invalid_input(key, format!("`{raw}` is not a number")))
}
