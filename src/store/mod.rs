/// Document Store
///
/// A small find/insert/replace document API over named collections.
/// Documents are JSON objects; every stored document carries an internal
/// `_id` assigned on insert and preserved across replaces.

pub mod auths;
#[cfg(test)]
pub mod memory;
pub mod sqlite;

pub use auths::{AuthRecord, AuthStore, Provider, ProviderAuth};
#[cfg(test)]
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use crate::error::VodSyncResult;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Cached combat reports, keyed by `code`
pub const REPORTS: &str = "reports";

/// Singleton metadata documents, keyed by `name`
pub const METADATA: &str = "metadata";

/// Per-user provider credentials, keyed by `user`
pub const AUTHS: &str = "auths";

/// Internal storage identifier field
pub const ID_FIELD: &str = "_id";

/// Equality filter on a top-level string field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter<'a> {
    pub field: &'a str,
    pub value: &'a str,
}

impl<'a> Filter<'a> {
    pub fn eq(field: &'a str, value: &'a str) -> Self {
        Self { field, value }
    }

    /// Match a document by its storage identity
    pub fn by_id(id: &'a str) -> Self {
        Self {
            field: ID_FIELD,
            value: id,
        }
    }

    /// Check a document body against this filter
    pub fn matches(&self, doc: &Value) -> bool {
        doc.get(self.field).and_then(Value::as_str) == Some(self.value)
    }
}

/// Document persistence backend
///
/// Implementations must return documents with their `_id` attached and
/// must never let a caller-supplied `_id` override the stored identity.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find the first document in `collection` matching `filter`
    async fn find_one(&self, collection: &str, filter: Filter<'_>) -> VodSyncResult<Option<Value>>;

    /// Insert a new document and return its assigned `_id`
    async fn insert_one(&self, collection: &str, doc: Value) -> VodSyncResult<String>;

    /// Replace the first document matching `filter`
    ///
    /// Returns `true` if a document was replaced or (with `upsert`) inserted.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Filter<'_>,
        doc: Value,
        upsert: bool,
    ) -> VodSyncResult<bool>;
}

/// Find a document and deserialize it
pub async fn find_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    filter: Filter<'_>,
) -> VodSyncResult<Option<T>> {
    match store.find_one(collection, filter).await? {
        Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        None => Ok(None),
    }
}

/// Serialize a value into a document body
pub fn to_document<T: Serialize>(value: &T) -> VodSyncResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Remove the storage identifier from a document body
pub(crate) fn strip_id(mut doc: Value) -> Value {
    if let Some(obj) = doc.as_object_mut() {
        obj.remove(ID_FIELD);
    }
    doc
}

/// Attach a storage identifier to a document body
pub(crate) fn with_id(mut doc: Value, id: &str) -> Value {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_string_fields_only() {
        let doc = json!({"code": "ABC123", "loaded_at": 12});

        assert!(Filter::eq("code", "ABC123").matches(&doc));
        assert!(!Filter::eq("code", "abc123").matches(&doc));
        assert!(!Filter::eq("loaded_at", "12").matches(&doc));
        assert!(!Filter::eq("missing", "x").matches(&doc));
    }

    #[test]
    fn test_strip_and_attach_id() {
        let doc = with_id(json!({"name": "encounter_dict"}), "abc");
        assert_eq!(doc["_id"], "abc");

        let doc = strip_id(doc);
        assert!(doc.get("_id").is_none());
        assert_eq!(doc["name"], "encounter_dict");
    }
}
