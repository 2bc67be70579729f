/// Report merge rules
///
/// Pure functions that fold freshly fetched data into an existing report.
/// None of them touch the network, so incremental refresh correctness can
/// be checked in isolation.
use crate::fflogs::{
    models::{Death, PlayerInfo, Report},
    time, RawDeathEvent, RosterEntry,
};
use std::collections::HashSet;

/// Death events fetched for one cursor window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeathDelta {
    pub events: Vec<RawDeathEvent>,
    /// Window start, ms from report start (inclusive)
    pub window_start: i64,
    /// Window end, ms from report start (inclusive)
    pub window_end: i64,
    /// Pagination reached the end with no next-page cursor
    pub exhausted: bool,
}

/// Append new deaths and advance the cursor
///
/// Only events inside the window are taken, and an event already present
/// (same fight, target and timestamp) is never added twice. The cursor moves
/// to `window_end` only when the window was exhausted.
pub fn merge_deaths(report: &mut Report, delta: DeathDelta) -> usize {
    let mut known: HashSet<(i64, i64, u64)> = report
        .deaths
        .iter()
        .map(|d| (d.fight, d.target_id, d.timestamp.to_bits()))
        .collect();

    let mut added = 0;
    for event in delta.events {
        if event.timestamp < delta.window_start || event.timestamp > delta.window_end {
            continue;
        }

        let death = Death {
            timestamp: time::absolute_secs(report.start_time, event.timestamp),
            target_id: event.target_id,
            fight: event.fight,
        };

        if known.insert((death.fight, death.target_id, death.timestamp.to_bits())) {
            report.deaths.push(death);
            added += 1;
        }
    }

    if delta.exhausted {
        report.last_queried_death_timestamp = Some(delta.window_end);
    }

    added
}

/// Fill in names for players that died
///
/// Existing entries are never overwritten. Any dead player the roster does
/// not cover gets the `Unknown` placeholder.
pub fn merge_players(report: &mut Report, roster: &[RosterEntry]) -> usize {
    let mut filled = 0;

    for id in report.dead_player_ids() {
        if report.player_data.contains_key(&id) {
            continue;
        }

        let info = roster
            .iter()
            .find(|entry| entry.id.to_string() == id)
            .map(|entry| PlayerInfo {
                name: entry.name.clone(),
                class: entry.class.clone(),
            })
            .unwrap_or_else(PlayerInfo::unknown);

        report.player_data.insert(id, info);
        filled += 1;
    }

    filled
}

/// Ids of dead players with no `player_data` entry yet
pub fn missing_player_ids(report: &Report) -> Vec<String> {
    report
        .dead_player_ids()
        .into_iter()
        .filter(|id| !report.player_data.contains_key(id))
        .collect()
}

/// Carry incremental state from `previous` into a freshly fetched base report
///
/// The fight list, title and times come from `fresh` wholesale; deaths,
/// player data, the death cursor and storage identity are carried forward.
pub fn merge_incremental_update(previous: &Report, fresh: Report) -> Report {
    Report {
        storage_id: previous.storage_id.clone(),
        deaths: previous.deaths.clone(),
        player_data: previous.player_data.clone(),
        last_queried_death_timestamp: previous.last_queried_death_timestamp,
        loaded_at: previous.loaded_at,
        encounternames: None,
        ..fresh
    }
}
