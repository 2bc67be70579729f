/// Report Store Façade
///
/// Find-or-fetch and find-or-refresh over the persisted reports collection.
/// Every lookup ends by resolving encounter names for the report's fights.
///
/// Requests for the same report code are serialized with a per-code lock, so
/// at most one load or refresh of a code is in flight at a time.
use crate::{
    error::{FetchError, VodSyncError, VodSyncResult, STATUS_SUCCESS},
    fflogs::{EncounterNameCache, Report, ReportClient},
    metrics,
    store::{self, DocumentStore, Filter, REPORTS},
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Longest report code accepted
const MAX_CODE_LEN: usize = 64;

/// Outcome of a report lookup
#[derive(Debug, Clone, PartialEq)]
pub enum ReportLookup {
    /// Report is complete and up to date with the requested policy
    Fresh(Report),

    /// A report is available, but a refresh or the encounter-name lookup
    /// failed. On a failed refresh the report is the previously stored copy;
    /// on a failed name lookup `encounternames` is absent.
    Degraded { report: Report, error: FetchError },

    /// No report could be produced
    Failed(FetchError),
}

impl ReportLookup {
    /// Numeric status: 200 when fresh, otherwise the failing call's status
    pub fn status_code(&self) -> u16 {
        match self {
            ReportLookup::Fresh(_) => STATUS_SUCCESS,
            ReportLookup::Degraded { error, .. } | ReportLookup::Failed(error) => error.status_code(),
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            ReportLookup::Fresh(report) | ReportLookup::Degraded { report, .. } => Some(report),
            ReportLookup::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<FetchError> {
        match self {
            ReportLookup::Fresh(_) => None,
            ReportLookup::Degraded { error, .. } | ReportLookup::Failed(error) => Some(*error),
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            ReportLookup::Fresh(_) => "fresh",
            ReportLookup::Degraded { .. } => "degraded",
            ReportLookup::Failed(_) => "failed",
        }
    }
}

/// Whether a report loaded at `loaded_at` is due for a refresh at `now`
///
/// A cadence of 0 makes every requested refresh go through.
pub fn needs_refresh(loaded_at: i64, now: i64, cadence: i64) -> bool {
    now - loaded_at >= cadence
}

/// Check a report code before it reaches storage or the remote API
pub fn validate_code(code: &str) -> VodSyncResult<()> {
    if code.is_empty() {
        return Err(VodSyncError::Validation("Report code is required".to_string()));
    }
    if code.len() > MAX_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(VodSyncError::Validation(format!("Invalid report code: {}", code)));
    }
    Ok(())
}

/// Report store façade
pub struct ReportService {
    store: Arc<dyn DocumentStore>,
    client: ReportClient,
    encounters: Arc<EncounterNameCache>,
    /// Minimum age in seconds before a stored report may be refreshed
    update_cadence: i64,
    /// One lock per report code with a lookup in flight
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        client: ReportClient,
        encounters: Arc<EncounterNameCache>,
        update_cadence: i64,
    ) -> Self {
        Self {
            store,
            client,
            encounters,
            update_cadence,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Find a report, loading or refreshing it from FFLogs as needed
    ///
    /// Storage failures are returned as `Err`; remote failures are reported
    /// through `ReportLookup`. Nothing is persisted when the initial load
    /// fails, and a failed refresh serves the stored copy as `Degraded`.
    pub async fn find_or_load_report(
        &self,
        code: &str,
        token: &str,
        update: bool,
        include_unclassified: bool,
    ) -> VodSyncResult<ReportLookup> {
        validate_code(code)?;

        let lock = self.code_lock(code);
        let guard = lock.lock().await;
        let result = self.lookup_locked(code, token, update, include_unclassified).await;
        drop(guard);
        self.release_code_lock(code, lock);

        result
    }

    async fn lookup_locked(
        &self,
        code: &str,
        token: &str,
        update: bool,
        include_unclassified: bool,
    ) -> VodSyncResult<ReportLookup> {
        let cached: Option<Report> =
            store::find_typed(self.store.as_ref(), REPORTS, Filter::eq("code", code)).await?;

        let (path, mut report, mut failure) = match cached {
            None => match self.client.get_report_data(token, code, include_unclassified).await {
                Ok(report) => {
                    let doc = store::to_document(&report)?;
                    let id = self.store.insert_one(REPORTS, doc).await?;
                    info!(code, id = %id, start = %report.start_string(), "Stored new report");
                    ("loaded", report, None)
                }
                Err(e) => {
                    warn!(code, error = %e, "Failed to load report");
                    let lookup = ReportLookup::Failed(e);
                    metrics::record_report_lookup("loaded", lookup.outcome());
                    return Ok(lookup);
                }
            },
            Some(cached) => {
                let now = Utc::now().timestamp();
                if !update || !needs_refresh(cached.loaded_at, now, self.update_cadence) {
                    debug!(code, loaded_at = cached.loaded_at, update, "Serving stored report");
                    ("cached", cached, None)
                } else {
                    match self.client.try_update_report(token, &cached, include_unclassified).await {
                        Ok(refreshed) => {
                            self.replace_report(&refreshed).await?;
                            info!(code, "Refreshed stored report");
                            ("refreshed", refreshed, None)
                        }
                        Err(e) => {
                            warn!(code, error = %e, "Refresh failed, serving stored report");
                            ("refreshed", cached, Some(e))
                        }
                    }
                }
            }
        };

        match self.encounters.resolve(report.encounter_ids(), token).await {
            Ok(names) => report.encounternames = Some(names),
            Err(VodSyncError::Remote(e)) => {
                warn!(code, error = %e, "Encounter names unavailable");
                report.encounternames = None;
                failure = failure.or(Some(e));
            }
            Err(e) => return Err(e),
        }

        report.storage_id = None;

        let lookup = match failure {
            None => ReportLookup::Fresh(report),
            Some(error) => ReportLookup::Degraded { report, error },
        };
        metrics::record_report_lookup(path, lookup.outcome());

        Ok(lookup)
    }

    /// Replace a stored report by its storage identity
    async fn replace_report(&self, report: &Report) -> VodSyncResult<()> {
        let doc = store::strip_id(store::to_document(report)?);
        let filter = match report.storage_id.as_deref() {
            Some(id) => Filter::by_id(id),
            None => Filter::eq("code", &report.code),
        };

        if !self.store.replace_one(REPORTS, filter, doc, false).await? {
            return Err(VodSyncError::NotFound(format!("Stored report {}", report.code)));
        }
        Ok(())
    }

    fn code_lock(&self, code: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(code.to_string()).or_default().clone()
    }

    /// Drop the lock entry once no other request holds a handle to it
    fn release_code_lock(&self, code: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one here
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(code);
        }
    }
}
