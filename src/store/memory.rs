/// In-memory document store
///
/// Same semantics as the SQLite store, kept in a process-local map
/// and counting writes so tests can assert on persistence.
use crate::{
    error::{VodSyncError, VodSyncResult},
    store::{strip_id, with_id, DocumentStore, Filter, ID_FIELD},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<(String, Value)>>>,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of insert/replace operations performed so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.lock().get(collection).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(String, Value)>>> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn matches(id: &str, doc: &Value, filter: &Filter<'_>) -> bool {
    if filter.field == ID_FIELD {
        id == filter.value
    } else {
        filter.matches(doc)
    }
}

fn check_object(doc: &Value) -> VodSyncResult<()> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(VodSyncError::Validation(
            "Documents must be JSON objects".to_string(),
        ))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_one(&self, collection: &str, filter: Filter<'_>) -> VodSyncResult<Option<Value>> {
        let collections = self.lock();
        let found = collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(id, doc)| matches(id, doc, &filter))
                .map(|(id, doc)| with_id(doc.clone(), id))
        });
        Ok(found)
    }

    async fn insert_one(&self, collection: &str, doc: Value) -> VodSyncResult<String> {
        check_object(&doc)?;
        let id = Uuid::new_v4().to_string();
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .push((id.clone(), strip_id(doc)));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Filter<'_>,
        doc: Value,
        upsert: bool,
    ) -> VodSyncResult<bool> {
        check_object(&doc)?;
        {
            let mut collections = self.lock();
            let docs = collections.entry(collection.to_string()).or_default();
            if let Some(slot) = docs.iter_mut().find(|(id, body)| matches(id, body, &filter)) {
                slot.1 = strip_id(doc);
                self.writes.fetch_add(1, Ordering::SeqCst);
                return Ok(true);
            }
        }

        if upsert {
            self.insert_one(collection, doc).await?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryDocumentStore::new();

        let id = store
            .insert_one("metadata", json!({"name": "encounter_dict"}))
            .await
            .unwrap();
        assert_eq!(store.len("metadata"), 1);

        store
            .replace_one(
                "metadata",
                Filter::eq("name", "encounter_dict"),
                json!({"name": "encounter_dict", "encounter_mappings": {"0": "Undefined Zone"}}),
                true,
            )
            .await
            .unwrap();

        // Replace must not add a second document
        assert_eq!(store.len("metadata"), 1);
        assert_eq!(store.writes(), 2);

        let doc = store
            .find_one("metadata", Filter::by_id(&id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["encounter_mappings"]["0"], "Undefined Zone");
    }
}
