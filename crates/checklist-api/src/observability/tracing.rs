//! OpenTelemetry tracing configuration for Jaeger export.
//!
//! Spans created with the `tracing` crate are bridged to OpenTelemetry and
//! exported to a Jaeger agent:
//!
//! ```text
//! tracing::span!()  -->  tracing-opentelemetry  -->  OpenTelemetry SDK  -->  Jaeger
//! ```
//!
//! The provider is owned by the [`ObservabilityGuard`](super::ObservabilityGuard)
//! returned from `init_observability`; nothing is registered globally.

use checklist_server::config::TracingSettings;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};

/// Configuration for OpenTelemetry tracing with Jaeger export.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name reported with every span
    pub service_name: String,
    /// Jaeger agent endpoint (host:port for UDP agent)
    pub jaeger_endpoint: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "ova-checklist-api".to_string(),
            jaeger_endpoint: "localhost:6831".to_string(),
        }
    }
}

impl TracingConfig {
    /// Returns `None` when span export is disabled.
    pub fn from_settings(settings: &TracingSettings) -> Option<Self> {
        settings.enabled.then(|| Self {
            service_name: settings.service_name.clone(),
            jaeger_endpoint: settings.jaeger_endpoint.clone(),
        })
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }
}

/// Error type for tracing initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("failed to initialize Jaeger exporter: {0}")]
    JaegerInit(String),

    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Builds a batch-exporting Jaeger provider and a tracer from it.
///
/// Must be called from within a Tokio runtime.
pub fn create_jaeger_tracer(config: &TracingConfig) -> Result<(TracerProvider, Tracer), TracingError> {
    let provider = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(&config.service_name)
        .with_endpoint(&config.jaeger_endpoint)
        .build_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(|e| TracingError::JaegerInit(e.to_string()))?;

    let tracer = provider.tracer(config.service_name.clone());
    Ok((provider, tracer))
}
