//! Protocol bindings and shared types for the catalog service.
//!
//! ## Structure
//!
//! - [`proto`] - generated gRPC bindings.
//! - [`error`] - the [`Error`] enum and its `tonic::Status` mapping.
//! - [`types`] - constants and domain helpers shared by client and server.
//! - [`context`] - per-call cancellation and deadline tracking.

pub mod context;
pub mod error;
pub mod types;

pub use error::*;

pub mod proto {
    tonic::include_proto!("catalog");

    /// Encoded descriptor set for `tonic-reflection`.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("catalog_descriptor");
}
