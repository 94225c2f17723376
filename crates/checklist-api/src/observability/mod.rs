//! Observability infrastructure for ova-checklist-api.
//!
//! This module provides:
//! - Structured logging configuration
//! - OpenTelemetry tracing setup
//! - Prometheus metrics and per-handler counters

mod logging;
mod metrics;
mod tracing;

use opentelemetry_sdk::trace::TracerProvider;
use tracing_subscriber::prelude::*;

pub use self::logging::{create_json_layer, parse_log_level, LoggingConfig};
pub use self::metrics::{
    init_metrics, metrics_handler, Handler, HandlerMetrics, MetricsError, MetricsState,
};
pub use self::tracing::{create_jaeger_tracer, TracingConfig, TracingError};

/// Keeps the span exporter alive; flushes pending spans on shutdown.
#[must_use = "dropping the guard stops span export"]
#[derive(Default)]
pub struct ObservabilityGuard {
    provider: Option<TracerProvider>,
}

impl ObservabilityGuard {
    pub fn tracing_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Flushes pending spans and releases the provider. The tracer held by
    /// the subscriber only keeps a weak reference, so dropping the provider
    /// here shuts its span processors down.
    pub fn shutdown(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if let Some(provider) = self.provider.take() {
            for result in provider.force_flush() {
                if let Err(err) = result {
                    ::tracing::warn!(error = %err, "Failed to flush spans");
                }
            }
            drop(provider);
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

impl std::fmt::Debug for ObservabilityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityGuard")
            .field("tracing_enabled", &self.tracing_enabled())
            .finish()
    }
}

/// Installs the global subscriber: env filter, fmt layer and, when `tracing`
/// is given, the OpenTelemetry layer exporting to Jaeger.
///
/// Must be called once, from within a Tokio runtime when tracing is enabled.
pub fn init_observability(
    logging: LoggingConfig,
    tracing: Option<TracingConfig>,
) -> Result<ObservabilityGuard, TracingError> {
    let (provider, otel_layer) = match tracing {
        Some(config) => {
            let (provider, tracer) = create_jaeger_tracer(&config)?;
            (
                Some(provider),
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(logging.env_filter())
        .with(logging.fmt_layer())
        .with(otel_layer)
        .try_init()
        .map_err(|e| TracingError::SubscriberInit(e.to_string()))?;

    Ok(ObservabilityGuard { provider })
}
