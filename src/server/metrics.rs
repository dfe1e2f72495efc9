use crate::catalog::CatalogSnapshot;
use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all radio metrics
const PREFIX: &str = "radio";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    // Scheduler Metrics
    pub static ref ADVANCES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_advances_total"), "Station advances by outcome"),
        &["station", "outcome"]
    ).expect("Failed to create advances_total metric");

    pub static ref ADVANCE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_advance_duration_seconds"),
            "Time spent advancing a station"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        &["station"]
    ).expect("Failed to create advance_duration_seconds metric");

    pub static ref STORAGE_CONFLICTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_storage_conflicts_total"), "Busy or locked database errors"),
        &["station"]
    ).expect("Failed to create storage_conflicts_total metric");

    pub static ref ELECTIONS_RESOLVED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_elections_resolved_total"), "Elections resolved"),
        &["station"]
    ).expect("Failed to create elections_resolved_total metric");

    pub static ref STATION_PAUSED: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_station_paused"), "1 while the station plays the pause placeholder"),
        &["station"]
    ).expect("Failed to create station_paused metric");

    // Catalog Metrics
    pub static ref CATALOG_SONGS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_songs"), "Songs available per station"),
        &["station", "type"]
    ).expect("Failed to create catalog_songs metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ADVANCES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ADVANCE_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(STORAGE_CONFLICTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ELECTIONS_RESOLVED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STATION_PAUSED.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_SONGS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn set_catalog_metrics(snapshot: &CatalogSnapshot, sids: &[u32]) {
    for sid in sids {
        let station = sid.to_string();
        CATALOG_SONGS
            .with_label_values(&[&station, "all"])
            .set(snapshot.num_songs(*sid) as f64);
        CATALOG_SONGS
            .with_label_values(&[&station, "origin"])
            .set(snapshot.num_origin_songs(*sid) as f64);
    }
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
}

pub fn record_advance(sid: u32, outcome: &str, duration: Duration) {
    let station = sid.to_string();
    ADVANCES_TOTAL
        .with_label_values(&[&station, outcome])
        .inc();
    ADVANCE_DURATION_SECONDS
        .with_label_values(&[&station])
        .observe(duration.as_secs_f64());
}

pub fn record_storage_conflict(sid: u32) {
    STORAGE_CONFLICTS_TOTAL
        .with_label_values(&[&sid.to_string()])
        .inc();
}

pub fn record_election_resolved(sid: u32) {
    ELECTIONS_RESOLVED_TOTAL
        .with_label_values(&[&sid.to_string()])
        .inc();
}

pub fn set_station_paused(sid: u32, paused: bool) {
    STATION_PAUSED
        .with_label_values(&[&sid.to_string()])
        .set(if paused { 1.0 } else { 0.0 });
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
