//! Order identifier newtype.
//!
//! `order_uid` is the single source of identity across an order and its
//! delivery, payment, and item rows. Wrapping it keeps the non-empty rule in
//! one place and prevents mixing it up with the other string fields an order
//! carries (`track_number`, `customer_id`, ...).

use core::fmt;
use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`OrderUid`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderUidError {
    /// The input string is empty or only whitespace.
    #[error("order_uid cannot be empty")]
    Empty,
}

/// Globally unique, immutable order identifier.
///
/// ## Examples
///
/// ```
/// use order_cache_core::OrderUid;
///
/// assert!(OrderUid::parse("b563feb7b2b84b6test").is_ok());
/// assert!(OrderUid::parse("").is_err());
/// assert!(OrderUid::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderUid(String);

impl OrderUid {
    /// Parse an `OrderUid` from a string.
    ///
    /// # Errors
    ///
    /// Returns [`OrderUidError::Empty`] if the input is empty or whitespace.
    pub fn parse(s: &str) -> Result<Self, OrderUidError> {
        if s.trim().is_empty() {
            return Err(OrderUidError::Empty);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `OrderUid` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderUid {
    type Err = OrderUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderUid {
    type Error = OrderUidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(OrderUidError::Empty);
        }
        Ok(Self(value))
    }
}

impl From<OrderUid> for String {
    fn from(id: OrderUid) -> Self {
        id.0
    }
}

impl AsRef<str> for OrderUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets `HashMap<OrderUid, _>` be queried with a plain `&str`.
impl Borrow<str> for OrderUid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Type<::sqlx::Postgres> for OrderUid {
    fn type_info() -> ::sqlx::postgres::PgTypeInfo {
        <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
        <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for OrderUid {
    fn decode(
        value: ::sqlx::postgres::PgValueRef<'r>,
    ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
        let raw = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
        Ok(Self::try_from(raw)?)
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Encode<'_, ::sqlx::Postgres> for OrderUid {
    fn encode_by_ref(
        &self,
        buf: &mut ::sqlx::postgres::PgArgumentBuffer,
    ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
        <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_parse_rejects_blank() {
        assert_eq!(OrderUid::parse(""), Err(OrderUidError::Empty));
        assert_eq!(OrderUid::parse(" \t"), Err(OrderUidError::Empty));
    }

    #[test]
    fn test_parse_keeps_value_verbatim() {
        let id = OrderUid::parse("abc123").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.to_string(), "abc123");
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let result: Result<OrderUid, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = OrderUid::parse("abc123").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
    }

    #[test]
    fn test_hash_map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(OrderUid::parse("abc123").unwrap(), 1);
        assert_eq!(map.get("abc123"), Some(&1));
        assert_eq!(map.get("missing"), None);
    }
}
