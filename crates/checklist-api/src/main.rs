//! ova-checklist-api server binary.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! ova-checklist-api --config config.yaml
//!
//! # With environment variables only
//! OVA_DATABASE__BACKEND=memory ova-checklist-api
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use checklist_api::grpc::{
    run_grpc_server_with_drain, ChecklistGrpcService, GrpcServerConfig, DEFAULT_DRAIN_TIMEOUT,
};
use checklist_api::observability::{
    init_metrics, init_observability, HandlerMetrics, LoggingConfig, TracingConfig,
};
use checklist_api::sre::run_sre_server;
use checklist_server::{build_event_bus, AppConfig, ChunkedFlusher, EventBusWriteObserver, Saver};
use checklist_storage::{ChecklistRepository, MemoryChecklistRepository, PostgresChecklistRepository};

/// ova-checklist-api - gRPC checklist storage with batched writes
#[derive(Parser, Debug)]
#[command(name = "ova-checklist-api")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env()?,
    };

    let observability = init_observability(
        LoggingConfig::from_settings(&config.logging, config.tracing.log_spans),
        TracingConfig::from_settings(&config.tracing),
    )?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ova-checklist-api");

    let metrics_state = init_metrics()?;

    let sre_addr: SocketAddr =
        format!("{}:{}", config.server.host, config.server.sre_port).parse()?;
    let grpc_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let sre_listener = TcpListener::bind(sre_addr).await?;
    let sre_stop = CancellationToken::new();
    let sre_task = tokio::spawn(run_sre_server(
        sre_listener,
        metrics_state,
        sre_stop.clone().cancelled_owned(),
    ));

    let result = match config.database.backend.as_str() {
        "memory" => {
            info!("Using in-memory repository");
            let bus = build_event_bus(&config.kafka).await?;
            let repository = Arc::new(MemoryChecklistRepository::with_observer(
                EventBusWriteObserver::new(Arc::clone(&bus)),
            ));
            let result = serve(repository, &config, grpc_addr).await;
            close_event_bus(bus.as_ref()).await;
            result
        }
        "postgres" => {
            info!(
                host = %config.database.host,
                db_name = %config.database.db_name,
                "Connecting to PostgreSQL"
            );
            let repository =
                PostgresChecklistRepository::connect_with_retry(&config.database.postgres_config())
                    .await?;
            info!("Running database migrations");
            repository.run_migrations().await?;

            let bus = build_event_bus(&config.kafka).await?;
            let repository =
                Arc::new(repository.with_observer(EventBusWriteObserver::new(Arc::clone(&bus))));
            let result = serve(repository, &config, grpc_addr).await;
            close_event_bus(bus.as_ref()).await;
            result
        }
        other => Err(anyhow::anyhow!("Unknown database backend: {other}")),
    };

    sre_stop.cancel();
    match sre_task.await {
        Ok(Err(e)) => error!(error = %e, "SRE server error"),
        Err(e) => error!(error = %e, "SRE server task failed"),
        Ok(Ok(())) => {}
    }

    observability.shutdown();
    result
}

/// Runs the batch pipeline and the gRPC server until a shutdown signal or a
/// server failure. In-flight requests finish before the pipeline is drained.
async fn serve<R: ChecklistRepository>(
    repository: Arc<R>,
    config: &AppConfig,
    grpc_addr: SocketAddr,
) -> anyhow::Result<()> {
    let flusher = ChunkedFlusher::new(
        Arc::clone(&repository),
        config.settings.repo_flush_batch_size,
    );
    let saver = Arc::new(Saver::new(
        flusher,
        config.settings.internal_buffer_size,
        config.settings.flush_period(),
    ));

    let service = ChecklistGrpcService::with_parts(
        repository,
        Arc::clone(&saver),
        Arc::new(HandlerMetrics::new()),
        CancellationToken::new(),
    );

    let result = run_grpc_server_with_drain(
        service,
        grpc_addr,
        GrpcServerConfig::default(),
        shutdown_signal(),
        DEFAULT_DRAIN_TIMEOUT,
    )
    .await;
    if let Err(ref e) = result {
        error!(error = %e, "gRPC server error");
    }

    saver.close().await;
    info!("All servers shutdown complete");
    result.map_err(|e| anyhow::anyhow!("gRPC server error: {e}"))
}

async fn close_event_bus(bus: &dyn checklist_server::EventBus) {
    if let Err(e) = bus.close().await {
        warn!(error = %e, "Failed to close event bus");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
    info!("Shutdown signal received, stopping servers");
}
