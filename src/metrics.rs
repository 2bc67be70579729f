/// Metrics and telemetry for VodSync
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Document store query times
/// - Encounter name cache hit/miss rates
/// - Remote API calls (FFLogs, Twitch, YouTube) by status
/// - Report lookups by path and outcome

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder,
    Gauge, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .unwrap();

    // ========== Database Metrics ==========

    /// Document store queries by operation and collection
    pub static ref DB_QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_queries_total",
        "Total number of database queries",
        &["operation", "collection"]
    )
    .unwrap();

    /// Document store query duration in seconds
    pub static ref DB_QUERY_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_query_duration_seconds",
        "Database query latencies in seconds",
        &["operation", "collection"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // ========== Cache Metrics ==========

    /// Cache hits by cache type
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_hits_total",
        "Total number of cache hits",
        &["cache_type"]
    )
    .unwrap();

    /// Cache misses by cache type
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_misses_total",
        "Total number of cache misses",
        &["cache_type"]
    )
    .unwrap();

    // ========== Remote API Metrics ==========

    /// Remote API calls by provider, operation, and status
    pub static ref REMOTE_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "remote_calls_total",
        "Total number of remote API calls",
        &["provider", "operation", "status"]
    )
    .unwrap();

    /// Token refreshes triggered by expired authorization
    pub static ref TOKEN_REFRESHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "token_refreshes_total",
        "Total number of token refresh attempts",
        &["provider", "status"]
    )
    .unwrap();

    // ========== Report Metrics ==========

    /// Report lookups by path (cached, loaded, refreshed) and outcome
    pub static ref REPORT_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "report_lookups_total",
        "Total number of report lookups",
        &["path", "outcome"]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a document store query
pub fn record_db_query(operation: &str, collection: &str, duration: f64) {
    DB_QUERIES_TOTAL
        .with_label_values(&[operation, collection])
        .inc();
    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);
}

/// Record a cache access
pub fn record_cache_access(cache_type: &str, hit: bool) {
    if hit {
        CACHE_HITS_TOTAL.with_label_values(&[cache_type]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[cache_type]).inc();
    }
}

/// Record a remote API call; `status` is the HTTP status or a synthetic transport code
pub fn record_remote_call(provider: &str, operation: &str, status: u16) {
    REMOTE_CALLS_TOTAL
        .with_label_values(&[provider, operation, &status.to_string()])
        .inc();
}

/// Record a token refresh attempt
pub fn record_token_refresh(provider: &str, success: bool) {
    TOKEN_REFRESHES_TOTAL
        .with_label_values(&[provider, if success { "success" } else { "failure" }])
        .inc();
}

/// Record a report lookup
pub fn record_report_lookup(path: &str, outcome: &str) {
    REPORT_LOOKUPS_TOTAL
        .with_label_values(&[path, outcome])
        .inc();
}
