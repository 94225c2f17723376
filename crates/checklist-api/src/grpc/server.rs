//! gRPC transport setup: checklist service, reflection and health.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use checklist_storage::ChecklistRepository;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::proto::ova::checklist::v1::checklist_storage_server::ChecklistStorageServer;
use crate::proto::FILE_DESCRIPTOR_SET;

use super::service::ChecklistGrpcService;

/// Optional services registered next to the checklist service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrpcServerConfig {
    /// Serve `grpc.reflection.v1.ServerReflection`
    pub reflection_enabled: bool,
    /// Serve `grpc.health.v1.Health`
    pub health_check_enabled: bool,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            reflection_enabled: true,
            health_check_enabled: true,
        }
    }
}

/// Error type for the gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum GrpcServerError {
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
}

/// How long in-flight requests may run after a shutdown signal before their
/// repository calls are cancelled.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Serves `service` until `shutdown` completes, then stops accepting
/// requests and lets in-flight ones finish for up to `drain_timeout`.
///
/// The service's shutdown token is cancelled only after the drain, so
/// writes that are already running complete and report their outcome.
/// Requests still running at the deadline are cancelled.
pub async fn run_grpc_server_with_drain<R, F>(
    service: ChecklistGrpcService<R>,
    addr: SocketAddr,
    config: GrpcServerConfig,
    shutdown: F,
    drain_timeout: Duration,
) -> Result<(), GrpcServerError>
where
    R: ChecklistRepository,
    F: Future<Output = ()> + Send,
{
    let requests = service.shutdown_token().clone();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = run_grpc_server_with_shutdown(service, addr, config, async move {
        let _ = stop_rx.await;
    });
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            requests.cancel();
            return result;
        }
        _ = shutdown => {}
    }

    info!(?drain_timeout, "Stopping gRPC server, draining in-flight requests");
    let _ = stop_tx.send(());

    let result = match tokio::time::timeout(drain_timeout, &mut server).await {
        Ok(result) => result,
        Err(_) => {
            warn!(?drain_timeout, "Drain deadline passed, cancelling in-flight requests");
            requests.cancel();
            (&mut server).await
        }
    };
    requests.cancel();
    result
}

/// Serves `service` on `addr` until `shutdown` completes, then drains
/// in-flight requests and returns.
pub async fn run_grpc_server_with_shutdown<R, F>(
    service: ChecklistGrpcService<R>,
    addr: SocketAddr,
    config: GrpcServerConfig,
    shutdown: F,
) -> Result<(), GrpcServerError>
where
    R: ChecklistRepository,
    F: Future<Output = ()> + Send,
{
    let health = if config.health_check_enabled {
        let (mut reporter, health_service) = tonic_health::server::health_reporter();
        reporter
            .set_serving::<ChecklistStorageServer<ChecklistGrpcService<R>>>()
            .await;
        Some(health_service)
    } else {
        None
    };

    let reflection = if config.reflection_enabled {
        Some(
            tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                .build_v1()?,
        )
    } else {
        None
    };

    info!(
        %addr,
        reflection = config.reflection_enabled,
        health = config.health_check_enabled,
        "gRPC server listening"
    );

    Server::builder()
        .add_service(ChecklistStorageServer::new(service))
        .add_optional_service(health)
        .add_optional_service(reflection)
        .serve_with_shutdown(addr, shutdown)
        .await?;

    info!("gRPC server shutdown complete");
    Ok(())
}
