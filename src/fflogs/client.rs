/// Remote Report Client - composes FFLogs calls into complete reports
use crate::{
    error::{FetchError, FetchResult},
    fflogs::{
        merge::{self, DeathDelta},
        models::{Fight, Report},
        time, RawReport, ReportSource, ReportSummary, UserIdentity,
    },
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name used when the API knows an encounter id but has no name for it
pub const UNKNOWN_ZONE: &str = "Unknown Zone";

/// Builds and incrementally extends reports from a `ReportSource`
#[derive(Clone)]
pub struct ReportClient {
    source: Arc<dyn ReportSource>,
}

impl ReportClient {
    pub fn new(source: Arc<dyn ReportSource>) -> Self {
        Self { source }
    }

    /// Fetch report metadata and the fight list
    ///
    /// Times are normalized to epoch seconds and fights are sorted latest
    /// first. Unclassified fights (encounter 0) are dropped unless
    /// `include_unclassified` is set.
    pub async fn load_base_report(
        &self,
        token: &str,
        code: &str,
        include_unclassified: bool,
    ) -> FetchResult<Report> {
        let raw = self
            .source
            .fetch_report(token, code)
            .await?
            .ok_or(FetchError::EmptyResult)?;

        Ok(normalize_report(code, raw, include_unclassified))
    }

    /// Page through death events from the cursor to the end of the latest pull
    ///
    /// A report without fights gets no deaths and a zero cursor, with no
    /// remote call. Re-running on an unchanged report is a no-op because the
    /// cursor already sits at the end of the latest pull.
    ///
    /// If the API hands back a page cursor that does not move forward, the
    /// deaths fetched so far are kept but the cursor only advances to the
    /// start of the last page, so the next refresh resumes from there.
    pub async fn append_death_info(&self, token: &str, report: &mut Report) -> FetchResult<()> {
        let (Some(earliest_start), Some(latest_end)) =
            (report.earliest_fight_start(), report.latest_fight_end())
        else {
            report.deaths.clear();
            report.last_queried_death_timestamp = Some(0);
            return Ok(());
        };

        let window_end = report.relative_ms(latest_end);
        let window_start = report
            .last_queried_death_timestamp
            .unwrap_or_else(|| report.relative_ms(earliest_start));

        if window_start >= window_end {
            debug!(code = %report.code, cursor = window_start, "death cursor already at latest pull");
            return Ok(());
        }

        let mut delta = DeathDelta {
            events: Vec::new(),
            window_start,
            window_end,
            exhausted: false,
        };

        let mut page_start = window_start;
        let mut pages = 0;
        loop {
            let page = self
                .source
                .fetch_deaths_page(token, &report.code, page_start, window_end)
                .await
                .map_err(|e| {
                    warn!(code = %report.code, page_start, error = %e, "death page request failed");
                    e
                })?;
            pages += 1;
            delta.events.extend(page.events);

            match page.next_page_timestamp {
                None => {
                    delta.exhausted = true;
                    break;
                }
                Some(next) if next > window_end => {
                    delta.exhausted = true;
                    break;
                }
                Some(next) if next > page_start => page_start = next,
                // Re-requesting the same start would loop forever
                Some(next) => {
                    warn!(code = %report.code, next, page_start, "death page cursor did not advance");
                    break;
                }
            }
        }

        let exhausted = delta.exhausted;
        let added = merge::merge_deaths(report, delta);

        // Everything before the last page start has been seen
        if !exhausted && page_start > window_start {
            report.last_queried_death_timestamp = Some(page_start);
        }
        debug!(code = %report.code, pages, added, exhausted, "appended death events");

        Ok(())
    }

    /// Resolve names and classes for every player that died
    ///
    /// Skips the remote call when all dead players are already known.
    /// Players the roster does not cover are filled with a placeholder.
    pub async fn append_player_info(&self, token: &str, report: &mut Report) -> FetchResult<()> {
        if merge::missing_player_ids(report).is_empty() {
            return Ok(());
        }

        let span_end = report.relative_ms(report.end_time).max(
            report
                .latest_fight_end()
                .map(|end| report.relative_ms(end))
                .unwrap_or(0),
        );

        let roster = self
            .source
            .fetch_player_roster(token, &report.code, 0, span_end)
            .await?;

        let filled = merge::merge_players(report, &roster);
        debug!(code = %report.code, filled, "appended player info");

        Ok(())
    }

    /// Load a complete report: base, then deaths, then players
    pub async fn get_report_data(
        &self,
        token: &str,
        code: &str,
        include_unclassified: bool,
    ) -> FetchResult<Report> {
        let mut report = self.load_base_report(token, code, include_unclassified).await?;

        self.append_death_info(token, &mut report)
            .await
            .map_err(step_failure)?;
        self.append_player_info(token, &mut report)
            .await
            .map_err(step_failure)?;

        report.loaded_at = Utc::now().timestamp();
        info!(code, fights = report.fights.len(), deaths = report.deaths.len(), "loaded report");

        Ok(report)
    }

    /// Refresh a previously loaded report
    ///
    /// Re-fetches only the base report; deaths are queried from the stored
    /// cursor onward and only unknown players are looked up.
    pub async fn try_update_report(
        &self,
        token: &str,
        previous: &Report,
        include_unclassified: bool,
    ) -> FetchResult<Report> {
        let fresh = self
            .load_base_report(token, &previous.code, include_unclassified)
            .await?;
        let mut report = merge::merge_incremental_update(previous, fresh);

        self.append_death_info(token, &mut report)
            .await
            .map_err(step_failure)?;
        self.append_player_info(token, &mut report)
            .await
            .map_err(step_failure)?;

        report.loaded_at = Utc::now().timestamp();
        info!(
            code = %report.code,
            fights = report.fights.len(),
            new_deaths = report.deaths.len() - previous.deaths.len().min(report.deaths.len()),
            "refreshed report"
        );

        Ok(report)
    }

    /// Display name for an encounter
    pub async fn query_for_encounter_name(&self, token: &str, encounter_id: i64) -> FetchResult<String> {
        let name = self.source.fetch_encounter_name(token, encounter_id).await?;
        Ok(name.unwrap_or_else(|| UNKNOWN_ZONE.to_string()))
    }

    /// Identity of the token's owner, if the API will tell us
    pub async fn get_username(&self, token: &str) -> Option<UserIdentity> {
        match self.source.fetch_current_user(token).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "failed to fetch FFLogs user");
                None
            }
        }
    }

    /// A user's most recent reports
    pub async fn get_reports_by_user(&self, token: &str, uid: i64) -> FetchResult<Vec<ReportSummary>> {
        let reports = self.source.fetch_user_reports(token, uid).await?;
        Ok(reports
            .into_iter()
            .map(|r| ReportSummary {
                code: r.code,
                title: r.title,
                start_time: time::ms_to_secs(r.start_time),
            })
            .collect())
    }
}

/// Failures after the base report degrade to `EmptyResult`, except an
/// expired token, which the caller can still recover from by re-authorizing
fn step_failure(error: FetchError) -> FetchError {
    match error {
        FetchError::AuthExpired => FetchError::AuthExpired,
        other => {
            warn!(error = %other, "report enrichment step failed");
            FetchError::EmptyResult
        }
    }
}

/// Convert an API report into the persisted shape
pub(crate) fn normalize_report(code: &str, raw: RawReport, include_unclassified: bool) -> Report {
    let start_time = time::ms_to_secs(raw.start_time);

    let fights = raw
        .fights
        .into_iter()
        .filter(|f| include_unclassified || f.encounter_id != 0)
        .map(|f| {
            let start = time::absolute_secs(start_time, f.start_time);
            let end = time::absolute_secs(start_time, f.end_time);
            Fight {
                id: f.id,
                start_time: start,
                end_time: end,
                encounter_id: f.encounter_id,
                name: f.name,
                kill: f.kill,
                timestamp_start: time::clock_string(start),
                timestamp_end: time::clock_string(end),
            }
        })
        .collect();

    let mut report = Report {
        storage_id: None,
        code: code.to_string(),
        title: raw.title,
        start_time,
        end_time: time::ms_to_secs(raw.end_time),
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

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted `ReportSource` for exercising the client without a network
    use super::*;
    use crate::fflogs::{DeathPage, RawDeathEvent, RawFight, RawReportSummary, RosterEntry};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeState {
        pub report: Option<RawReport>,
        pub report_error: Option<FetchError>,
        /// All death events the remote knows about
        pub deaths: Vec<RawDeathEvent>,
        pub deaths_error: Option<FetchError>,
        /// Fail every death page from this (1-based) page on
        pub deaths_error_from_page: Option<(usize, FetchError)>,
        /// Events per page; 0 means a single page
        pub page_size: usize,
        pub roster: Vec<RosterEntry>,
        pub encounter_names: HashMap<i64, Option<String>>,
        pub encounter_error: Option<FetchError>,
        pub calls: Vec<String>,
    }

    #[derive(Default)]
    pub struct FakeSource {
        pub state: Mutex<FakeState>,
    }

    impl FakeSource {
        pub fn with_report(report: RawReport) -> Self {
            let source = Self::default();
            source.state.lock().unwrap().report = Some(report);
            source
        }

        pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
            f(&mut self.state.lock().unwrap());
        }

        pub fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }

        pub fn clear_calls(&self) {
            self.state.lock().unwrap().calls.clear();
        }
    }

    pub fn raw_fight(id: i64, start: i64, end: i64, encounter_id: i64) -> RawFight {
        RawFight {
            id,
            start_time: start,
            end_time: end,
            encounter_id,
            name: None,
            kill: None,
        }
    }

    pub fn raw_report(fights: Vec<RawFight>) -> RawReport {
        RawReport {
            code: Some("ABC123".to_string()),
            title: "Test Report".to_string(),
            start_time: 1_700_000_000_000,
            end_time: 1_700_003_600_000,
            fights,
        }
    }

    pub fn death(timestamp: i64, target_id: i64, fight: i64) -> RawDeathEvent {
        RawDeathEvent {
            timestamp,
            target_id,
            fight,
        }
    }

    #[async_trait]
    impl ReportSource for FakeSource {
        async fn fetch_report(&self, _token: &str, code: &str) -> FetchResult<Option<RawReport>> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("report:{}", code));
            if let Some(error) = state.report_error {
                return Err(error);
            }
            Ok(state.report.clone())
        }

        async fn fetch_deaths_page(
            &self,
            _token: &str,
            _code: &str,
            start_ms: i64,
            end_ms: i64,
        ) -> FetchResult<DeathPage> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("deaths:{}:{}", start_ms, end_ms));
            if let Some(error) = state.deaths_error {
                return Err(error);
            }
            let page = state.calls.iter().filter(|c| c.starts_with("deaths:")).count();
            if let Some((from, error)) = state.deaths_error_from_page {
                if page >= from {
                    return Err(error);
                }
            }

            let mut window: Vec<RawDeathEvent> = state
                .deaths
                .iter()
                .filter(|d| d.timestamp >= start_ms && d.timestamp <= end_ms)
                .cloned()
                .collect();
            window.sort_by_key(|d| d.timestamp);

            if state.page_size == 0 || window.len() <= state.page_size {
                return Ok(DeathPage {
                    events: window,
                    next_page_timestamp: None,
                });
            }

            let rest = window.split_off(state.page_size);
            Ok(DeathPage {
                events: window,
                next_page_timestamp: rest.first().map(|d| d.timestamp),
            })
        }

        async fn fetch_player_roster(
            &self,
            _token: &str,
            _code: &str,
            start_ms: i64,
            end_ms: i64,
        ) -> FetchResult<Vec<RosterEntry>> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("players:{}:{}", start_ms, end_ms));
            Ok(state.roster.clone())
        }

        async fn fetch_encounter_name(&self, _token: &str, encounter_id: i64) -> FetchResult<Option<String>> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("encounter:{}", encounter_id));
            if let Some(error) = state.encounter_error {
                return Err(error);
            }
            Ok(state
                .encounter_names
                .get(&encounter_id)
                .cloned()
                .unwrap_or_else(|| Some(format!("Encounter {}", encounter_id))))
        }

        async fn fetch_current_user(&self, _token: &str) -> FetchResult<Option<UserIdentity>> {
            self.state.lock().unwrap().calls.push("current_user".to_string());
            Ok(Some(UserIdentity {
                id: 42,
                name: "Tank Main".to_string(),
            }))
        }

        async fn fetch_user_reports(&self, _token: &str, uid: i64) -> FetchResult<Vec<RawReportSummary>> {
            self.state.lock().unwrap().calls.push(format!("user_reports:{}", uid));
            Ok(vec![RawReportSummary {
                code: "ABC123".to_string(),
                title: "Test Report".to_string(),
                start_time: 1_700_000_000_000,
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::fflogs::RosterEntry;

    fn client(source: &Arc<FakeSource>) -> ReportClient {
        ReportClient::new(source.clone())
    }

    #[tokio::test]
    async fn test_load_base_report_normalizes() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![
            raw_fight(1, 0, 60_000, 7),
            raw_fight(2, 70_000, 80_000, 0),
            raw_fight(3, 90_000, 150_000, 7),
        ])));

        let report = client(&source).load_base_report("t", "ABC123", false).await.unwrap();

        assert_eq!(report.code, "ABC123");
        assert_eq!(report.start_time, 1_700_000_000.0);
        assert_eq!(report.end_time, 1_700_003_600.0);
        // Trash filtered, latest pull first
        let ids: Vec<i64> = report.fights.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(report.fights[0].start_time, 1_700_000_090.0);
        assert_eq!(report.fights[0].end_time, 1_700_000_150.0);
        assert_eq!(report.fights[0].timestamp_end, "22:15:50");

        let with_trash = client(&source).load_base_report("t", "ABC123", true).await.unwrap();
        assert_eq!(with_trash.fights.len(), 3);
    }

    #[tokio::test]
    async fn test_load_base_report_empty_result() {
        let source = Arc::new(FakeSource::default());
        let result = client(&source).load_base_report("t", "NOPE", false).await;
        assert_eq!(result.unwrap_err(), FetchError::EmptyResult);
    }

    #[tokio::test]
    async fn test_append_deaths_without_fights_makes_no_call() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![])));
        let c = client(&source);

        let mut report = c.load_base_report("t", "ABC123", false).await.unwrap();
        source.clear_calls();

        c.append_death_info("t", &mut report).await.unwrap();

        assert!(report.deaths.is_empty());
        assert_eq!(report.last_queried_death_timestamp, Some(0));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_append_deaths_follows_pages() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![
            raw_fight(1, 1_000, 60_000, 7),
            raw_fight(2, 70_000, 120_000, 7),
        ])));
        source.update(|s| {
            s.deaths = vec![death(5_000, 1, 1), death(6_000, 2, 1), death(80_000, 1, 2)];
            s.page_size = 2;
        });
        let c = client(&source);

        let mut report = c.load_base_report("t", "ABC123", false).await.unwrap();
        c.append_death_info("t", &mut report).await.unwrap();

        assert_eq!(source.count("deaths:"), 2);
        assert_eq!(source.calls()[1], "deaths:1000:120000");
        assert_eq!(source.calls()[2], "deaths:80000:120000");
        assert_eq!(report.deaths.len(), 3);
        assert_eq!(report.deaths[2].timestamp, 1_700_000_080.0);
        assert_eq!(report.last_queried_death_timestamp, Some(120_000));

        // Cursor at the end: no further calls
        source.clear_calls();
        c.append_death_info("t", &mut report).await.unwrap();
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_append_deaths_failure_leaves_report_untouched() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![raw_fight(1, 0, 60_000, 7)])));
        source.update(|s| {
            s.deaths = vec![death(5_000, 1, 1)];
            s.deaths_error = Some(FetchError::Transport(500));
        });
        let c = client(&source);

        let mut report = c.load_base_report("t", "ABC123", false).await.unwrap();
        let result = c.append_death_info("t", &mut report).await;

        assert_eq!(result.unwrap_err(), FetchError::Transport(500));
        assert!(report.deaths.is_empty());
        assert_eq!(report.last_queried_death_timestamp, None);
    }

    #[tokio::test]
    async fn test_append_deaths_second_page_failure_leaves_report_untouched() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![raw_fight(1, 0, 60_000, 7)])));
        source.update(|s| {
            s.deaths = vec![death(5_000, 1, 1), death(9_000, 2, 1), death(20_000, 3, 1)];
            s.page_size = 1;
            s.deaths_error_from_page = Some((2, FetchError::Transport(502)));
        });
        let c = client(&source);

        let mut report = c.load_base_report("t", "ABC123", false).await.unwrap();
        let result = c.append_death_info("t", &mut report).await;

        assert_eq!(result.unwrap_err(), FetchError::Transport(502));
        assert_eq!(source.count("deaths:"), 2);
        assert_eq!(source.calls()[2], "deaths:9000:60000");
        assert!(report.deaths.is_empty());
        assert_eq!(report.last_queried_death_timestamp, None);
    }

    #[tokio::test]
    async fn test_append_deaths_stalled_cursor_is_retried() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![raw_fight(1, 1_000, 60_000, 7)])));
        source.update(|s| {
            s.deaths = vec![death(1_000, 1, 1), death(1_000, 2, 1), death(5_000, 3, 1)];
            s.page_size = 1;
        });
        let c = client(&source);

        let mut report = c.load_base_report("t", "ABC123", false).await.unwrap();
        c.append_death_info("t", &mut report).await.unwrap();

        // The second page would start at the same timestamp again
        assert_eq!(source.count("deaths:"), 1);
        assert_eq!(report.deaths.len(), 1);
        assert_eq!(report.last_queried_death_timestamp, None);

        // The window stays open, so the next pass asks again without duplicating
        source.clear_calls();
        source.update(|s| s.page_size = 0);
        c.append_death_info("t", &mut report).await.unwrap();
        assert_eq!(source.calls(), vec!["deaths:1000:60000".to_string()]);
        assert_eq!(report.deaths.len(), 3);
        assert_eq!(report.last_queried_death_timestamp, Some(60_000));
    }

    #[tokio::test]
    async fn test_append_deaths_stall_after_progress_keeps_partial_cursor() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![raw_fight(1, 1_000, 60_000, 7)])));
        source.update(|s| {
            s.deaths = vec![death(2_000, 1, 1), death(5_000, 2, 1), death(5_000, 3, 1)];
            s.page_size = 1;
        });
        let c = client(&source);

        let mut report = c.load_base_report("t", "ABC123", false).await.unwrap();
        c.append_death_info("t", &mut report).await.unwrap();

        assert_eq!(source.count("deaths:"), 2);
        assert_eq!(report.deaths.len(), 2);
        assert_eq!(report.last_queried_death_timestamp, Some(5_000));
    }

    #[tokio::test]
    async fn test_append_players_skips_known() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![raw_fight(1, 0, 60_000, 7)])));
        source.update(|s| {
            s.deaths = vec![death(5_000, 1, 1), death(6_000, 2, 1)];
            s.roster = vec![RosterEntry {
                id: 1,
                name: "Tank".to_string(),
                class: "Paladin".to_string(),
            }];
        });
        let c = client(&source);

        let report = c.get_report_data("t", "ABC123", false).await.unwrap();
        assert_eq!(report.player_data["1"].name, "Tank");
        assert_eq!(report.player_data["2"].name, "Unknown");
        assert_eq!(source.count("players:"), 1);
        assert!(report.loaded_at > 0);

        // Everyone who died is known now
        source.clear_calls();
        let mut again = report.clone();
        c.append_player_info("t", &mut again).await.unwrap();
        assert_eq!(source.count("players:"), 0);
    }

    #[tokio::test]
    async fn test_get_report_data_step_failures() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![raw_fight(1, 0, 60_000, 7)])));
        source.update(|s| s.deaths_error = Some(FetchError::Transport(502)));
        let c = client(&source);

        let result = c.get_report_data("t", "ABC123", false).await;
        assert_eq!(result.unwrap_err(), FetchError::EmptyResult);

        source.update(|s| s.deaths_error = Some(FetchError::AuthExpired));
        let result = c.get_report_data("t", "ABC123", false).await;
        assert_eq!(result.unwrap_err(), FetchError::AuthExpired);

        source.update(|s| s.report_error = Some(FetchError::AuthExpired));
        let result = c.get_report_data("t", "ABC123", false).await;
        assert_eq!(result.unwrap_err(), FetchError::AuthExpired);
    }

    #[tokio::test]
    async fn test_try_update_report_is_incremental_and_idempotent() {
        let source = Arc::new(FakeSource::with_report(raw_report(vec![raw_fight(1, 0, 60_000, 7)])));
        source.update(|s| s.deaths = vec![death(5_000, 1, 1)]);
        let c = client(&source);

        let first = c.get_report_data("t", "ABC123", false).await.unwrap();
        assert_eq!(first.deaths.len(), 1);

        // A new pull appears with a new death
        source.update(|s| {
            s.report = Some(raw_report(vec![
                raw_fight(1, 0, 60_000, 7),
                raw_fight(2, 70_000, 100_000, 7),
            ]));
            s.deaths.push(death(75_000, 3, 2));
        });
        source.clear_calls();

        let second = c.try_update_report("t", &first, false).await.unwrap();
        assert_eq!(source.calls()[1], "deaths:60000:100000");
        assert_eq!(second.fights.len(), 2);
        assert_eq!(second.deaths.len(), 2);
        assert!(second.player_data.contains_key("3"));
        assert_eq!(second.last_queried_death_timestamp, Some(100_000));

        // Nothing new remotely: only the base report is fetched
        source.clear_calls();
        let third = c.try_update_report("t", &second, false).await.unwrap();
        assert_eq!(source.calls(), vec!["report:ABC123".to_string()]);
        assert_eq!(third.deaths, second.deaths);
        assert_eq!(third.player_data, second.player_data);
        assert_eq!(third.last_queried_death_timestamp, second.last_queried_death_timestamp);
    }

    #[tokio::test]
    async fn test_encounter_name_falls_back() {
        let source = Arc::new(FakeSource::default());
        source.update(|s| {
            s.encounter_names.insert(1, None);
        });
        let c = client(&source);

        assert_eq!(c.query_for_encounter_name("t", 1).await.unwrap(), UNKNOWN_ZONE);
        assert_eq!(c.query_for_encounter_name("t", 7).await.unwrap(), "Encounter 7");
    }

    #[tokio::test]
    async fn test_user_lookups() {
        let source = Arc::new(FakeSource::default());
        let c = client(&source);

        let user = c.get_username("t").await.unwrap();
        assert_eq!(user.id, 42);

        let reports = c.get_reports_by_user("t", 42).await.unwrap();
        assert_eq!(reports[0].start_time, 1_700_000_000.0);
    }
}
