//! Prometheus metrics.
//!
//! Metrics are registered once at startup into the default registry and
//! exposed through `/metrics`. Accessors return `None` until registration so
//! call sites stay no-ops in harnesses that skip metrics.

use anyhow::Result;
use prometheus::{
    HistogramVec, IntCounter, IntCounterVec, register_histogram_vec, register_int_counter,
    register_int_counter_vec,
};
use std::sync::OnceLock;

static HTTP_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_DURATION: OnceLock<HistogramVec> = OnceLock::new();
static RECORDS_CREATED: OnceLock<IntCounter> = OnceLock::new();
static MEDIA_FINALIZED: OnceLock<IntCounter> = OnceLock::new();
static EVENTS_PUBLISHED: OnceLock<IntCounterVec> = OnceLock::new();

/// Register all service metrics. Safe to call more than once.
pub fn init() -> Result<()> {
    if HTTP_REQUESTS.get().is_none() {
        let _ = HTTP_REQUESTS.set(register_int_counter_vec!(
            "cdv_http_requests_total",
            "HTTP requests by method, route and status",
            &["method", "path", "status"]
        )?);
    }
    if HTTP_DURATION.get().is_none() {
        let _ = HTTP_DURATION.set(register_histogram_vec!(
            "cdv_http_request_duration_seconds",
            "HTTP request duration by method and route",
            &["method", "path"]
        )?);
    }
    if RECORDS_CREATED.get().is_none() {
        let _ = RECORDS_CREATED.set(register_int_counter!(
            "cdv_records_created_total",
            "Records persisted by the write path"
        )?);
    }
    if MEDIA_FINALIZED.get().is_none() {
        let _ = MEDIA_FINALIZED.set(register_int_counter!(
            "cdv_media_finalized_total",
            "Media assets finalized by the write path"
        )?);
    }
    if EVENTS_PUBLISHED.get().is_none() {
        let _ = EVENTS_PUBLISHED.set(register_int_counter_vec!(
            "cdv_events_published_total",
            "Events handed to the publisher by kind",
            &["kind"]
        )?);
    }
    Ok(())
}

pub fn http_requests() -> Option<&'static IntCounterVec> {
    HTTP_REQUESTS.get()
}

pub fn http_duration() -> Option<&'static HistogramVec> {
    HTTP_DURATION.get()
}

pub fn record_created() {
    if let Some(counter) = RECORDS_CREATED.get() {
        counter.inc();
    }
}

pub fn media_finalized() {
    if let Some(counter) = MEDIA_FINALIZED.get() {
        counter.inc();
    }
}

pub fn event_published(kind: &str) {
    if let Some(counter) = EVENTS_PUBLISHED.get() {
        counter.with_label_values(&[kind]).inc();
    }
}
