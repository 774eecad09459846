//! Decoding of inbound order payloads.
//!
//! A bus payload is a JSON document with the [`Order`] shape. Decoding
//! parses, normalizes, and validates it in one step; anything that comes out
//! of [`decode_order`] is safe to persist and cache.

use crate::types::{Order, OrderError, OrderUid};

/// Why a payload could not be turned into an [`Order`].
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// Not valid JSON, or JSON missing/mistyping a required field.
    #[error("undecodable payload: {source}")]
    Json {
        /// The raw `order_uid` if one could still be read from the payload.
        order_uid: Option<String>,
        #[source]
        source: serde_json::Error,
    },

    /// Well-formed JSON that breaks an aggregate invariant.
    #[error("invalid order {order_uid}: {source}")]
    Invalid {
        order_uid: OrderUid,
        #[source]
        source: OrderError,
    },
}

impl DecodeError {
    /// The order identifier carried by the rejected payload, when recoverable.
    #[must_use]
    pub fn order_uid(&self) -> Option<&str> {
        match self {
            Self::Json { order_uid, .. } => order_uid.as_deref(),
            Self::Invalid { order_uid, .. } => Some(order_uid.as_str()),
        }
    }
}

/// Decode, normalize, and validate a raw order payload.
///
/// # Errors
///
/// Returns [`DecodeError::Json`] when the payload is not a structurally
/// complete order (including an empty `order_uid`), and
/// [`DecodeError::Invalid`] when it violates an aggregate invariant.
pub fn decode_order(payload: &[u8]) -> Result<Order, DecodeError> {
    let mut order: Order = serde_json::from_slice(payload).map_err(|source| DecodeError::Json {
        order_uid: salvage_order_uid(payload),
        source,
    })?;

    order.normalize();

    if let Err(source) = order.validate() {
        return Err(DecodeError::Invalid {
            order_uid: order.order_uid,
            source,
        });
    }

    Ok(order)
}

/// Best-effort read of `order_uid` from a payload that failed to decode.
fn salvage_order_uid(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value
        .get("order_uid")?
        .as_str()
        .filter(|uid| !uid.trim().is_empty())
        .map(str::to_owned)
}
