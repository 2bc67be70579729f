/// Persisted report model
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::time;

/// Display name of players the API could not resolve
pub const UNKNOWN_PLAYER: &str = "Unknown";

/// One pull within a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fight {
    pub id: i64,
    /// Absolute epoch seconds
    #[serde(rename = "startTime")]
    pub start_time: f64,
    /// Absolute epoch seconds
    #[serde(rename = "endTime")]
    pub end_time: f64,
    /// 0 for unclassified ("trash") content
    #[serde(rename = "encounterID")]
    pub encounter_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill: Option<bool>,
    #[serde(rename = "timestampStart", default)]
    pub timestamp_start: String,
    #[serde(rename = "timestampEnd", default)]
    pub timestamp_end: String,
}

/// A player death event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Death {
    /// Absolute epoch seconds
    pub timestamp: f64,
    #[serde(rename = "targetID")]
    pub target_id: i64,
    pub fight: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub class: String,
}

impl PlayerInfo {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_PLAYER.to_string(),
            class: UNKNOWN_PLAYER.to_string(),
        }
    }
}

/// A combat report as persisted in the `reports` collection
///
/// `fights` is kept sorted by `end_time` descending (latest pull first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Storage identity; never returned to API callers
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<String>,
    pub code: String,
    #[serde(default)]
    pub title: String,
    /// Absolute epoch seconds
    #[serde(rename = "startTime")]
    pub start_time: f64,
    /// Absolute epoch seconds
    #[serde(rename = "endTime")]
    pub end_time: f64,
    #[serde(default)]
    pub fights: Vec<Fight>,
    #[serde(default)]
    pub deaths: Vec<Death>,
    /// Player id (as string) to name/class
    #[serde(default)]
    pub player_data: BTreeMap<String, PlayerInfo>,
    /// Death pagination cursor, in ms relative to the report start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_queried_death_timestamp: Option<i64>,
    /// Epoch seconds of the last successful load
    #[serde(default)]
    pub loaded_at: i64,
    /// Encounter id to display name, attached at read time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounternames: Option<BTreeMap<String, String>>,
}

impl Report {
    /// Re-establish the latest-pull-first ordering
    pub fn sort_fights(&mut self) {
        self.fights.sort_by(|a, b| b.end_time.total_cmp(&a.end_time));
    }

    /// End of the latest pull, in epoch seconds
    pub fn latest_fight_end(&self) -> Option<f64> {
        self.fights.iter().map(|f| f.end_time).reduce(f64::max)
    }

    /// Start of the earliest pull, in epoch seconds
    pub fn earliest_fight_start(&self) -> Option<f64> {
        self.fights.iter().map(|f| f.start_time).reduce(f64::min)
    }

    /// Offset of an absolute time from the report start, in ms
    pub fn relative_ms(&self, absolute: f64) -> i64 {
        time::relative_ms(self.start_time, absolute)
    }

    /// Distinct encounter ids referenced by the fights
    pub fn encounter_ids(&self) -> BTreeSet<i64> {
        self.fights.iter().map(|f| f.encounter_id).collect()
    }

    /// Distinct ids of players that died, as `player_data` keys
    pub fn dead_player_ids(&self) -> BTreeSet<String> {
        self.deaths.iter().map(|d| d.target_id.to_string()).collect()
    }

    /// Human-readable report start
    pub fn start_string(&self) -> String {
        time::timestamp_to_string(self.start_time)
    }
}

#[cfg(test)]
pub(crate) fn fight(id: i64, start: f64, end: f64, encounter_id: i64) -> Fight {
    Fight {
        id,
        start_time: start,
        end_time: end,
        encounter_id,
        name: None,
        kill: None,
        timestamp_start: time::clock_string(start),
        timestamp_end: time::clock_string(end),
    }
}

#[cfg(test)]
pub(crate) fn report(code: &str, start: f64, fights: Vec<Fight>) -> Report {
    let mut report = Report {
        storage_id: None,
        code: code.to_string(),
        title: "Test Report".to_string(),
        start_time: start,
        end_time: fights.iter().map(|f| f.end_time).fold(start, f64::max),
        fights,
        deaths: Vec::new(),
        player_data: BTreeMap::new(),
        last_queried_death_timestamp: None,
        loaded_at: 0,
        encounternames: None,
    };
    report.sort_fights();
    report
}
