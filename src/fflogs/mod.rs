/// FFLogs Integration
///
/// Fetches combat reports from the FFLogs v2 GraphQL API, keeps cached
/// reports incrementally up to date, and resolves encounter names.

pub mod api;
pub mod client;
pub mod encounters;
pub mod merge;
pub mod models;
pub mod time;

pub use api::FflogsApi;
pub use client::ReportClient;
pub use encounters::EncounterNameCache;
pub use models::{Death, Fight, PlayerInfo, Report};

use crate::error::FetchResult;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// Report metadata as returned by the API (times in ms)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReport {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub title: String,
    /// Epoch milliseconds
    #[serde(deserialize_with = "de_ms")]
    pub start_time: i64,
    /// Epoch milliseconds
    #[serde(deserialize_with = "de_ms")]
    pub end_time: i64,
    #[serde(default)]
    pub fights: Vec<RawFight>,
}

/// Fight as returned by the API (offsets in ms from the report start)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFight {
    pub id: i64,
    #[serde(deserialize_with = "de_ms")]
    pub start_time: i64,
    #[serde(deserialize_with = "de_ms")]
    pub end_time: i64,
    #[serde(rename = "encounterID", default)]
    pub encounter_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kill: Option<bool>,
}

/// Death event as returned by the API (timestamp in ms from the report start)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDeathEvent {
    #[serde(deserialize_with = "de_ms")]
    pub timestamp: i64,
    #[serde(rename = "targetID")]
    pub target_id: i64,
    #[serde(default)]
    pub fight: i64,
}

/// One page of death events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeathPage {
    pub events: Vec<RawDeathEvent>,
    /// Where the next page starts, if the window is not exhausted
    pub next_page_timestamp: Option<i64>,
}

/// A player from the report roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: i64,
    pub name: String,
    pub class: String,
}

/// The FFLogs account behind an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub name: String,
}

/// Entry in a user's report listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub code: String,
    pub title: String,
    /// Epoch seconds
    #[serde(rename = "startTime")]
    pub start_time: f64,
}

/// Remote source of report data
///
/// Implementations perform exactly one remote call per method and report
/// non-success outcomes as a `FetchError`.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Report metadata and fight list; `None` if the API returned no report
    async fn fetch_report(&self, token: &str, code: &str) -> FetchResult<Option<RawReport>>;

    /// Death events in `[start_ms, end_ms]` (offsets from the report start)
    async fn fetch_deaths_page(
        &self,
        token: &str,
        code: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> FetchResult<DeathPage>;

    /// Players present in `[start_ms, end_ms]`
    async fn fetch_player_roster(
        &self,
        token: &str,
        code: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> FetchResult<Vec<RosterEntry>>;

    /// Encounter display name; `None` if the encounter has no name
    async fn fetch_encounter_name(&self, token: &str, encounter_id: i64) -> FetchResult<Option<String>>;

    /// Identity of the token's owner
    async fn fetch_current_user(&self, token: &str) -> FetchResult<Option<UserIdentity>>;

    /// Most recent reports uploaded by a user (start times in ms)
    async fn fetch_user_reports(&self, token: &str, uid: i64) -> FetchResult<Vec<RawReportSummary>>;
}

/// Report listing entry as returned by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReportSummary {
    pub code: String,
    #[serde(default)]
    pub title: String,
    #[serde(deserialize_with = "de_ms")]
    pub start_time: i64,
}

/// GraphQL `Float` timestamps may arrive as `123` or `123.0`
pub(crate) fn de_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    Ok(value.round() as i64)
}
