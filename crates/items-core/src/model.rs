use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Partition key attribute used by the items table.
pub const DEFAULT_PRIMARY_KEY: &str = "itemId";

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// DynamoDB rejects partition key values larger than 2048 bytes.
const MAX_ITEM_ID_BYTES: usize = 2048;

/// A validated item identifier: a non-empty string of at most 2048 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Create a new `ItemId` after validation.
    pub fn new(s: impl Into<String>) -> Result<Self, ItemIdError> {
        let s = s.into();

        if s.is_empty() {
            return Err(ItemIdError::Empty);
        }

        if s.len() > MAX_ITEM_ID_BYTES {
            return Err(ItemIdError::TooLong(s.len()));
        }

        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemId {
    type Error = ItemIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when validating an item id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemIdError {
    #[error("item id must not be empty")]
    Empty,

    #[error("item id length {0} bytes exceeds maximum of {MAX_ITEM_ID_BYTES}")]
    TooLong(usize),
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A stored item: its partition key plus schema-less attributes.
///
/// The attribute map never contains the key attribute itself; the key name is
/// only known at the storage boundary (`PRIMARY_KEY`), so conversion to and
/// from a flat JSON document goes through [`Item::from_document`] and
/// [`Item::to_document`].
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub attributes: Map<String, Value>,
}

impl Item {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter. Setting the key attribute is a no-op
    /// at serialization time since [`Item::to_document`] writes the id last.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Split a flat JSON document into key and attributes.
    pub fn from_document(
        primary_key: &str,
        mut document: Map<String, Value>,
    ) -> Result<Self, ItemError> {
        let raw = document
            .remove(primary_key)
            .ok_or_else(|| ItemError::MissingKey(primary_key.to_string()))?;

        let Value::String(raw) = raw else {
            return Err(ItemError::KeyNotString(primary_key.to_string()));
        };

        let id = ItemId::new(raw).map_err(|source| ItemError::InvalidKey {
            attribute: primary_key.to_string(),
            source,
        })?;

        Ok(Self {
            id,
            attributes: document,
        })
    }

    /// Parse a request body. The body must be a JSON object.
    pub fn from_json(primary_key: &str, value: Value) -> Result<Self, ItemError> {
        match value {
            Value::Object(document) => Self::from_document(primary_key, document),
            _ => Err(ItemError::NotAnObject),
        }
    }

    /// Flatten back into a single JSON document keyed by `primary_key`.
    pub fn to_document(&self, primary_key: &str) -> Map<String, Value> {
        let mut document = self.attributes.clone();
        document.insert(primary_key.to_string(), Value::String(self.id.to_string()));
        document
    }
}

/// Request-level validation failures for an item document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ItemError {
    #[error("item must be a JSON object")]
    NotAnObject,

    #[error("missing required attribute `{0}`")]
    MissingKey(String),

    #[error("attribute `{0}` must be a string")]
    KeyNotString(String),

    #[error("invalid `{attribute}`: {source}")]
    InvalidKey {
        attribute: String,
        #[source]
        source: ItemIdError,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // -- ItemId tests --

    #[test]
    fn valid_item_ids() {
        assert!(ItemId::new("abc").is_ok());
        assert!(ItemId::new("Widget 42").is_ok());
        assert!(ItemId::new("a".repeat(MAX_ITEM_ID_BYTES)).is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(ItemId::new(""), Err(ItemIdError::Empty));
    }

    #[test]
    fn rejects_too_long() {
        let long = "a".repeat(MAX_ITEM_ID_BYTES + 1);
        assert_eq!(ItemId::new(long), Err(ItemIdError::TooLong(2049)));
    }

    #[test]
    fn deserialize_validates() {
        let ok: ItemId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(ok.as_str(), "abc");
        assert!(serde_json::from_value::<ItemId>(json!("")).is_err());
    }

    // -- Item tests --

    #[test]
    fn splits_key_from_attributes() {
        let item = Item::from_json("itemId", json!({"itemId": "abc", "name": "widget"})).unwrap();
        assert_eq!(item.id.as_str(), "abc");
        assert_eq!(item.attributes.get("name"), Some(&json!("widget")));
        assert!(!item.attributes.contains_key("itemId"));
    }

    #[test]
    fn document_contains_key_again() {
        let item = Item::new(ItemId::new("abc").unwrap()).with_attribute("name", "widget");
        let document = Value::Object(item.to_document("itemId"));
        assert_eq!(document, json!({"itemId": "abc", "name": "widget"}));
    }

    #[test]
    fn honors_configured_key_name() {
        let item = Item::from_json("sku", json!({"sku": "x-1", "itemId": "kept"})).unwrap();
        assert_eq!(item.id.as_str(), "x-1");
        assert_eq!(item.attributes.get("itemId"), Some(&json!("kept")));
    }

    #[test]
    fn rejects_missing_key() {
        let err = Item::from_json("itemId", json!({"name": "widget"})).unwrap_err();
        assert_eq!(err, ItemError::MissingKey("itemId".into()));
    }

    #[test]
    fn rejects_non_string_key() {
        let err = Item::from_json("itemId", json!({"itemId": 7})).unwrap_err();
        assert_eq!(err, ItemError::KeyNotString("itemId".into()));
    }

    #[test]
    fn rejects_empty_key() {
        let err = Item::from_json("itemId", json!({"itemId": ""})).unwrap_err();
        assert!(matches!(err, ItemError::InvalidKey { source: ItemIdError::Empty, .. }));
    }

    #[test]
    fn rejects_non_object_body() {
        assert_eq!(
            Item::from_json("itemId", json!(["abc"])).unwrap_err(),
            ItemError::NotAnObject
        );
    }
}
