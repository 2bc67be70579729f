/// Encounter Name Cache
///
/// Process-wide mapping from encounter id to display name, persisted as a
/// single document in the metadata collection. The in-memory map is guarded
/// by an async mutex that is held for the whole of a `resolve` call, so two
/// requests never fetch or persist the same id concurrently.
use crate::{
    error::VodSyncResult,
    fflogs::client::ReportClient,
    metrics,
    store::{self, DocumentStore, Filter, METADATA},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// `name` of the persisted singleton document
pub const ENCOUNTER_DICT_NAME: &str = "encounter_dict";

/// Display name for encounter id 0 (unclassified content)
pub const UNDEFINED_ZONE: &str = "Undefined Zone";

/// Persisted shape of the mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncounterDict {
    name: String,
    #[serde(default)]
    encounter_mappings: BTreeMap<String, String>,
}

impl EncounterDict {
    fn seeded() -> Self {
        let mut encounter_mappings = BTreeMap::new();
        encounter_mappings.insert("0".to_string(), UNDEFINED_ZONE.to_string());
        Self {
            name: ENCOUNTER_DICT_NAME.to_string(),
            encounter_mappings,
        }
    }
}

/// Shared encounter-name cache
pub struct EncounterNameCache {
    store: Arc<dyn DocumentStore>,
    client: ReportClient,
    mappings: Mutex<BTreeMap<String, String>>,
}

impl EncounterNameCache {
    /// Load the persisted mapping, creating and persisting a seeded one if absent
    pub async fn get_or_init(store: Arc<dyn DocumentStore>, client: ReportClient) -> VodSyncResult<Self> {
        let mappings = match load(store.as_ref()).await? {
            Some(mappings) => {
                info!(entries = mappings.len(), "Loaded encounter name cache");
                mappings
            }
            None => {
                let dict = EncounterDict::seeded();
                store.insert_one(METADATA, store::to_document(&dict)?).await?;
                info!("Initialized encounter name cache");
                dict.encounter_mappings
            }
        };

        Ok(Self {
            store,
            client,
            mappings: Mutex::new(mappings),
        })
    }

    #[cfg(test)]
    pub(crate) async fn mappings(&self) -> BTreeMap<String, String> {
        self.mappings.lock().await.clone()
    }

    /// Resolve names for `required` ids
    ///
    /// Unknown ids are fetched one at a time, and the full mapping is persisted
    /// after each one. The first failed fetch aborts with `VodSyncError::Remote`;
    /// names resolved before it stay cached. On success only the requested
    /// subset is returned.
    pub async fn resolve(
        &self,
        required: impl IntoIterator<Item = i64>,
        token: &str,
    ) -> VodSyncResult<BTreeMap<String, String>> {
        let required: BTreeSet<i64> = required.into_iter().collect();

        let mut mappings = self.mappings.lock().await;
        let mut reloaded = false;

        for &id in &required {
            let key = id.to_string();
            if mappings.contains_key(&key) {
                metrics::record_cache_access("encounter_names", true);
                continue;
            }

            // Another instance may have resolved it already
            if !reloaded {
                reloaded = true;
                if let Some(persisted) = load(self.store.as_ref()).await? {
                    mappings.extend(persisted);
                    if mappings.contains_key(&key) {
                        metrics::record_cache_access("encounter_names", true);
                        continue;
                    }
                }
            }

            metrics::record_cache_access("encounter_names", false);

            let name = if id == 0 {
                UNDEFINED_ZONE.to_string()
            } else {
                self.client
                    .query_for_encounter_name(token, id)
                    .await
                    .map_err(|e| {
                        warn!(encounter_id = id, error = %e, "Failed to resolve encounter name");
                        e
                    })?
            };

            debug!(encounter_id = id, name = %name, "Resolved encounter name");
            // Memory only takes the name once the store has it
            let mut updated = mappings.clone();
            updated.insert(key, name);
            persist(self.store.as_ref(), &updated).await?;
            *mappings = updated;
        }

        Ok(required
            .into_iter()
            .filter_map(|id| {
                let key = id.to_string();
                mappings.get(&key).map(|name| (key, name.clone()))
            })
            .collect())
    }
}

async fn load(store: &dyn DocumentStore) -> VodSyncResult<Option<BTreeMap<String, String>>> {
    let dict: Option<EncounterDict> =
        store::find_typed(store, METADATA, Filter::eq("name", ENCOUNTER_DICT_NAME)).await?;
    Ok(dict.map(|d| d.encounter_mappings))
}

async fn persist(store: &dyn DocumentStore, mappings: &BTreeMap<String, String>) -> VodSyncResult<()> {
    let dict = EncounterDict {
        name: ENCOUNTER_DICT_NAME.to_string(),
        encounter_mappings: mappings.clone(),
    };
    store
        .replace_one(
            METADATA,
            Filter::eq("name", ENCOUNTER_DICT_NAME),
            store::to_document(&dict)?,
            true,
        )
        .await?;
    Ok(())
}
