/// Per-user provider credentials
use crate::{
    error::VodSyncResult,
    store::{find_typed, to_document, DocumentStore, Filter, AUTHS},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Linked account providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Fflogs,
    Twitch,
    Youtube,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Fflogs => "fflogs",
            Provider::Twitch => "twitch",
            Provider::Youtube => "youtube",
        }
    }
}

/// Credentials for one linked provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAuth {
    pub token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
}

/// Auth document: `{user, <provider>: {token, refresh_token, username|uid}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    #[serde(rename = "_id", default, skip_serializing)]
    pub storage_id: Option<String>,
    pub user: String,
    #[serde(flatten)]
    pub providers: BTreeMap<Provider, ProviderAuth>,
}

impl AuthRecord {
    pub fn new(user: &str) -> Self {
        Self {
            storage_id: None,
            user: user.to_string(),
            providers: BTreeMap::new(),
        }
    }

    pub fn get(&self, provider: Provider) -> Option<&ProviderAuth> {
        self.providers.get(&provider)
    }

    pub fn set(&mut self, provider: Provider, auth: ProviderAuth) {
        self.providers.insert(provider, auth);
    }

    pub fn remove(&mut self, provider: Provider) -> Option<ProviderAuth> {
        self.providers.remove(&provider)
    }
}

/// Reads and writes auth records in the `auths` collection
#[derive(Clone)]
pub struct AuthStore {
    store: Arc<dyn DocumentStore>,
}

impl AuthStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Load a user's auth record, or an empty one if none is stored
    pub async fn get_auth_keys(&self, user: &str) -> VodSyncResult<AuthRecord> {
        let record: Option<AuthRecord> =
            find_typed(self.store.as_ref(), AUTHS, Filter::eq("user", user)).await?;
        Ok(record.unwrap_or_else(|| AuthRecord::new(user)))
    }

    /// Replace the user's auth record wholesale
    pub async fn store_auth_keys(&self, record: &AuthRecord) -> VodSyncResult<()> {
        let doc = to_document(record)?;
        self.store
            .replace_one(AUTHS, Filter::eq("user", &record.user), doc, true)
            .await?;
        tracing::debug!(user = %record.user, providers = record.providers.len(), "stored auth keys");
        Ok(())
    }
}
