//! gRPC service implementations.
//!
//! ## Structure
//!
//! - [`handler`] - `LaptopService` entry point ([`CatalogService`]).
//! - [`auth`] - `AuthService` entry point ([`LoginService`]).

pub mod auth;
pub mod handler;

pub use auth::LoginService;
pub use handler::CatalogService;

use catalog_tonic_core::Error;
use tonic::Status;

/// Converts a handler error into the status sent to the caller.
///
/// Caller mistakes are logged here at `warn`. Internal failures are logged
/// by the `Status` conversion itself.
pub(crate) fn reject(err: Error) -> Status {
    match err {
        Error::ChannelError { .. } | Error::Persist { .. } | Error::Internal { .. } => {}
        Error::RequestCancelled | Error::DeadlineExceeded => tracing::debug!("call stopped: {err}"),
        _ => tracing::warn!("call failed: {err}"),
    }
    err.into()
}
