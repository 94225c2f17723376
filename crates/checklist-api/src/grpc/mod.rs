//! gRPC service implementations.
//!
//! Implements `ova.checklist.v1.ChecklistStorage` using Tonic.
//!
//! ```text
//! gRPC Request → ChecklistGrpcService → Repository (single writes, reads)
//!                                     → Saver      (MultiCreateChecklist)
//! ```

pub mod conversion;
mod server;
mod service;

pub use server::{
    run_grpc_server_with_drain, run_grpc_server_with_shutdown, GrpcServerConfig, GrpcServerError,
    DEFAULT_DRAIN_TIMEOUT,
};
pub use service::ChecklistGrpcService;

// Re-export the generated server trait for service registration
pub use crate::proto::ova::checklist::v1::checklist_storage_server::{
    ChecklistStorage, ChecklistStorageServer,
};
