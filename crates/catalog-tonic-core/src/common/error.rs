//! Error types for the catalog service.
//!
//! This module defines the central `Error` enum, which captures every
//! recoverable and reportable failure in the catalog service. It implements
//! `From<Error>` for `tonic::Status` so handlers can propagate errors with `?`
//! and clients observe the matching gRPC status code.
//!
//! ## Error Cases
//! - `ChannelError`: An internal communication failure between tasks.
//! - `RequestCancelled` / `DeadlineExceeded`: The call was cancelled by the
//!   client, by shutdown, or ran past its `grpc-timeout`.
//! - `InvalidRequest`: The request was malformed or exceeded bounds.
//! - `ProtocolViolation`: A stream delivered messages in an illegal order.
//! - `AlreadyExists` / `NotFound`: Store conflicts and missing records.
//! - `BadCredentials`: Login with an unknown user or a wrong password.
//! - `InvalidToken`, `Unauthenticated`, `PermissionDenied`: Auth failures.
//! - `Persist` / `Internal`: Unexpected failures. These are logged in full
//!   and surfaced to callers as a generic internal error.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the catalog service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The client aborted the request or the service cancelled it.
    #[error("Request cancelled")]
    RequestCancelled,

    /// The call ran past its deadline.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A stream did not follow the expected message sequence.
    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// A record with the same key is already stored.
    #[error("{kind} with id {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    /// The referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Unknown username or wrong password. Both cases look the same to the
    /// caller.
    #[error("incorrect username/password")]
    BadCredentials,

    /// A token failed signature, algorithm or expiry checks.
    #[error("Invalid access token: {reason}")]
    InvalidToken { reason: String },

    /// The call carried no usable credential.
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// The caller's role may not invoke the method.
    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// Writing a blob to its backing location failed.
    #[error("Persist error: {context}")]
    Persist { context: String },

    /// Anything else that should never happen.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Shorthand for [`Error::InvalidRequest`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::Internal`].
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    /// Shorthand for [`Error::ProtocolViolation`].
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelError { context } => {
                tracing::error!(%context, "channel failure");
                Status::internal("internal error")
            }
            Error::Persist { context } => {
                tracing::error!(%context, "persist failure");
                Status::internal("internal error")
            }
            Error::Internal { context } => {
                tracing::error!(%context, "internal failure");
                Status::internal("internal error")
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::DeadlineExceeded => Status::deadline_exceeded("Deadline exceeded"),
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::ProtocolViolation { reason } => Status::unknown(reason),
            err @ Error::AlreadyExists { .. } => Status::already_exists(err.to_string()),
            err @ (Error::NotFound { .. } | Error::BadCredentials) => {
                Status::not_found(err.to_string())
            }
            err @ (Error::InvalidToken { .. } | Error::Unauthenticated { .. }) => {
                Status::unauthenticated(err.to_string())
            }
            Error::PermissionDenied { reason } => Status::permission_denied(reason),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
