//! Prometheus metrics infrastructure.
//!
//! This module provides Prometheus-compatible metrics using the `metrics` crate
//! with `metrics-exporter-prometheus` for exposition.
//!
//! # Metrics Exposed
//!
//! - `ova_checklist_grpc_responses_total` - gRPC responses by handler and outcome
//! - `ova_checklist_storage_query_duration_seconds` - Storage query duration histogram
//! - `ova_checklist_storage_query_timeout_total` - Storage query timeouts
//! - `ova_checklist_saver_*` - Batch pipeline flushes, retained and dropped items
//! - `ova_checklist_events_published_total` - Events handed to the event bus

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Shared state containing the Prometheus handle for metrics rendering.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder and describes the service metrics.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_default_metrics();

    Ok(MetricsState::new(handle))
}

fn register_default_metrics() {
    metrics::describe_counter!(
        "ova_checklist_grpc_responses_total",
        "gRPC responses by handler and outcome (success, error)"
    );

    metrics::describe_histogram!(
        "ova_checklist_storage_query_duration_seconds",
        "Storage query duration in seconds by operation, backend, and status"
    );
    metrics::describe_counter!(
        "ova_checklist_storage_query_timeout_total",
        "Total number of storage query timeouts by operation and backend"
    );

    metrics::describe_counter!(
        "ova_checklist_saver_flushes_total",
        "Saver flushes by trigger (capacity, timer, shutdown)"
    );
    metrics::describe_counter!(
        "ova_checklist_saver_unflushed_items_total",
        "Checklists returned by failed chunks and kept for the next flush"
    );
    metrics::describe_counter!(
        "ova_checklist_saver_dropped_items_total",
        "Checklists still unflushed when the saver closed"
    );
    metrics::describe_gauge!(
        "ova_checklist_saver_buffered_items",
        "Checklists currently held in the saver buffer"
    );

    metrics::describe_counter!(
        "ova_checklist_events_published_total",
        "Checklist events handed to the event bus by kind and outcome"
    );
}

/// Prometheus exposition format content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}

/// gRPC handlers that report an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    CreateChecklist,
    MultiCreateChecklist,
    DescribeChecklist,
    ListChecklists,
    RemoveChecklist,
    UpdateChecklist,
}

impl Handler {
    pub const ALL: [Handler; 6] = [
        Handler::CreateChecklist,
        Handler::MultiCreateChecklist,
        Handler::DescribeChecklist,
        Handler::ListChecklists,
        Handler::RemoveChecklist,
        Handler::UpdateChecklist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Handler::CreateChecklist => "CreateChecklist",
            Handler::MultiCreateChecklist => "MultiCreateChecklist",
            Handler::DescribeChecklist => "DescribeChecklist",
            Handler::ListChecklists => "ListChecklists",
            Handler::RemoveChecklist => "RemoveChecklist",
            Handler::UpdateChecklist => "UpdateChecklist",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Default)]
struct OutcomeCounters {
    success: AtomicU64,
    error: AtomicU64,
}

/// Per-handler success/error counts.
///
/// Every recorded outcome is also forwarded to
/// `ova_checklist_grpc_responses_total`.
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    counters: [OutcomeCounters; 6],
}

impl HandlerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, handler: Handler) {
        self.counters[handler.index()]
            .success
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "ova_checklist_grpc_responses_total",
            "handler" => handler.as_str(),
            "outcome" => "success"
        )
        .increment(1);
    }

    pub fn record_error(&self, handler: Handler) {
        self.counters[handler.index()]
            .error
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "ova_checklist_grpc_responses_total",
            "handler" => handler.as_str(),
            "outcome" => "error"
        )
        .increment(1);
    }

    /// Records the outcome of a handler result.
    pub fn record<T, E>(&self, handler: Handler, result: &Result<T, E>) {
        match result {
            Ok(_) => self.record_success(handler),
            Err(_) => self.record_error(handler),
        }
    }

    pub fn successes(&self, handler: Handler) -> u64 {
        self.counters[handler.index()].success.load(Ordering::Relaxed)
    }

    pub fn errors(&self, handler: Handler) -> u64 {
        self.counters[handler.index()].error.load(Ordering::Relaxed)
    }
}
