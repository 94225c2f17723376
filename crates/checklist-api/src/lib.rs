//! checklist-api: gRPC API layer of ova-checklist-api
//!
//! This crate provides:
//! - The `ova.checklist.v1.ChecklistStorage` gRPC service via Tonic
//! - Logging, tracing and Prometheus metrics setup
//! - The SRE HTTP listener (`/metrics`, `/health`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               checklist-api                 │
//! ├─────────────────────────────────────────────┤
//! │  grpc/          - Service, transport setup  │
//! │  observability/ - Logging, tracing, metrics │
//! │  sre.rs         - Operational HTTP endpoint │
//! └─────────────────────────────────────────────┘
//! ```

pub mod grpc;
pub mod observability;
pub mod sre;

/// Generated protobuf types and service stubs.
pub mod proto {
    pub mod ova {
        pub mod checklist {
            pub mod v1 {
                tonic::include_proto!("ova.checklist.v1");
            }
        }
    }

    /// Encoded descriptor set served by the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("checklist_descriptor");
}
