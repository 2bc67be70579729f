/// FFLogs v2 GraphQL client
use crate::{
    error::{FetchError, FetchResult},
    fflogs::{
        DeathPage, RawDeathEvent, RawReport, RawReportSummary, ReportSource, RosterEntry,
        UserIdentity,
    },
    metrics,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const REPORT_QUERY: &str = r#"
query ($code: String!) {
    reportData {
        report(code: $code) {
            code
            title
            startTime
            endTime
            fights {
                id
                startTime
                endTime
                encounterID
                name
                kill
            }
        }
    }
}
"#;

const DEATHS_QUERY: &str = r#"
query ($code: String!, $startTime: Float!, $endTime: Float!) {
    reportData {
        report(code: $code) {
            events(dataType: Deaths, startTime: $startTime, endTime: $endTime) {
                data
                nextPageTimestamp
            }
        }
    }
}
"#;

const PLAYERS_QUERY: &str = r#"
query ($code: String!, $startTime: Float!, $endTime: Float!) {
    reportData {
        report(code: $code) {
            playerDetails(startTime: $startTime, endTime: $endTime)
        }
    }
}
"#;

const ENCOUNTER_QUERY: &str = r#"
query ($id: Int!) {
    worldData {
        encounter(id: $id) {
            name
        }
    }
}
"#;

const CURRENT_USER_QUERY: &str = r#"
query {
    userData {
        currentUser {
            id
            name
        }
    }
}
"#;

const USER_REPORTS_QUERY: &str = r#"
query ($userID: Int!) {
    reportData {
        reports(userID: $userID, page: 1) {
            data {
                code
                title
                startTime
            }
        }
    }
}
"#;

/// Roster entry inside `playerDetails`
#[derive(Debug, Deserialize)]
struct PlayerDetail {
    id: i64,
    name: String,
    #[serde(rename = "type", default)]
    class: String,
}

/// FFLogs API client over reqwest
#[derive(Clone)]
pub struct FflogsApi {
    http_client: reqwest::Client,
    client_url: String,
    user_url: String,
}

impl FflogsApi {
    /// Create a new API client
    ///
    /// `http_client` should carry the configured request timeout.
    pub fn new(http_client: reqwest::Client, client_url: &str, user_url: &str) -> Self {
        Self {
            http_client,
            client_url: client_url.to_string(),
            user_url: user_url.to_string(),
        }
    }

    /// POST a GraphQL query and return the decoded body
    async fn query(
        &self,
        operation: &'static str,
        url: &str,
        query: &str,
        variables: Value,
        token: &str,
    ) -> FetchResult<Value> {
        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| {
                let error = transport_error(&e);
                tracing::warn!(operation, error = %e, "FFLogs request failed");
                metrics::record_remote_call("fflogs", operation, error.status_code());
                error
            })?;

        let status = response.status().as_u16();
        metrics::record_remote_call("fflogs", operation, status);

        if !response.status().is_success() {
            tracing::debug!(operation, status, "FFLogs returned non-success status");
            return Err(FetchError::from_status(status));
        }

        response.json::<Value>().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "FFLogs returned an unreadable body");
            FetchError::EmptyResult
        })
    }
}

/// Map a reqwest error with no HTTP status onto the transport taxonomy
fn transport_error(error: &reqwest::Error) -> FetchError {
    match error.status() {
        Some(status) => FetchError::from_status(status.as_u16()),
        None if error.is_timeout() => FetchError::Transport(504),
        None => FetchError::Transport(502),
    }
}

/// Deserialize the value at `pointer`, treating a missing or null value as `None`
fn extract<T: for<'de> Deserialize<'de>>(body: &Value, pointer: &str) -> FetchResult<Option<T>> {
    match body.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
            tracing::warn!(pointer, error = %e, "unexpected FFLogs payload shape");
            FetchError::EmptyResult
        }),
    }
}

pub(crate) fn parse_report(body: &Value) -> FetchResult<Option<RawReport>> {
    extract(body, "/data/reportData/report")
}

pub(crate) fn parse_deaths_page(body: &Value) -> FetchResult<DeathPage> {
    let events_node = body
        .pointer("/data/reportData/report/events")
        .ok_or(FetchError::EmptyResult)?;

    // Events are an untyped JSON array; anything without a target is skipped
    let events = events_node
        .get("data")
        .and_then(Value::as_array)
        .map(|data| {
            data.iter()
                .filter_map(|event| serde_json::from_value::<RawDeathEvent>(event.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let next_page_timestamp = events_node
        .get("nextPageTimestamp")
        .and_then(Value::as_f64)
        .map(|ts| ts.round() as i64);

    Ok(DeathPage {
        events,
        next_page_timestamp,
    })
}

pub(crate) fn parse_player_roster(body: &Value) -> FetchResult<Vec<RosterEntry>> {
    // playerDetails is a JSON scalar: {"data": {"playerDetails": {tanks, healers, dps}}}
    let details = body
        .pointer("/data/reportData/report/playerDetails/data/playerDetails")
        .ok_or(FetchError::EmptyResult)?;

    let mut roster = Vec::new();
    for role in ["tanks", "healers", "dps"] {
        let players: Vec<PlayerDetail> = match details.get(role) {
            Some(list) => serde_json::from_value(list.clone()).map_err(|e| {
                tracing::warn!(role, error = %e, "unexpected playerDetails shape");
                FetchError::EmptyResult
            })?,
            None => Vec::new(),
        };
        roster.extend(players.into_iter().map(|p| RosterEntry {
            id: p.id,
            name: p.name,
            class: p.class,
        }));
    }
    Ok(roster)
}

#[async_trait]
impl ReportSource for FflogsApi {
    async fn fetch_report(&self, token: &str, code: &str) -> FetchResult<Option<RawReport>> {
        let body = self
            .query("report", &self.client_url, REPORT_QUERY, json!({ "code": code }), token)
            .await?;
        parse_report(&body)
    }

    async fn fetch_deaths_page(
        &self,
        token: &str,
        code: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> FetchResult<DeathPage> {
        let body = self
            .query(
                "deaths",
                &self.client_url,
                DEATHS_QUERY,
                json!({ "code": code, "startTime": start_ms, "endTime": end_ms }),
                token,
            )
            .await?;
        parse_deaths_page(&body)
    }

    async fn fetch_player_roster(
        &self,
        token: &str,
        code: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> FetchResult<Vec<RosterEntry>> {
        let body = self
            .query(
                "players",
                &self.client_url,
                PLAYERS_QUERY,
                json!({ "code": code, "startTime": start_ms, "endTime": end_ms }),
                token,
            )
            .await?;
        parse_player_roster(&body)
    }

    async fn fetch_encounter_name(&self, token: &str, encounter_id: i64) -> FetchResult<Option<String>> {
        let body = self
            .query(
                "encounter",
                &self.client_url,
                ENCOUNTER_QUERY,
                json!({ "id": encounter_id }),
                token,
            )
            .await?;
        extract(&body, "/data/worldData/encounter/name")
    }

    async fn fetch_current_user(&self, token: &str) -> FetchResult<Option<UserIdentity>> {
        let body = self
            .query("current_user", &self.user_url, CURRENT_USER_QUERY, json!({}), token)
            .await?;
        extract(&body, "/data/userData/currentUser")
    }

    async fn fetch_user_reports(&self, token: &str, uid: i64) -> FetchResult<Vec<RawReportSummary>> {
        let body = self
            .query(
                "user_reports",
                &self.client_url,
                USER_REPORTS_QUERY,
                json!({ "userID": uid }),
                token,
            )
            .await?;
        Ok(extract(&body, "/data/reportData/reports/data")?.unwrap_or_default())
    }
}
