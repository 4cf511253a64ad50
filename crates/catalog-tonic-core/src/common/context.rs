//! Per-call cancellation and deadline tracking.
//!
//! Every handler builds a [`CallContext`] when a call arrives and checks it at
//! each point where it may block: before receiving the next inbound message,
//! before accumulating an upload chunk and before testing each search
//! candidate. A context trips when its [`CancellationToken`] is cancelled (the
//! client went away or the service is shutting down) or when the deadline
//! carried in the `grpc-timeout` header has passed.

use crate::{Error, Result};
use core::time::Duration;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;

/// Header the transport uses to propagate the caller's deadline.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Cancellation signal and optional deadline for a single call.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Creates a context with no deadline driven by `token`.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Builds a context for an inbound call.
    ///
    /// The returned token is a child of `parent`, so cancelling the parent
    /// (service shutdown) trips every in-flight call. The deadline is taken
    /// from the `grpc-timeout` header when present and well formed.
    pub fn from_metadata(metadata: &MetadataMap, parent: &CancellationToken) -> Self {
        let deadline = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map(|timeout| Instant::now() + timeout);

        Self {
            token: parent.child_token(),
            deadline,
        }
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Marks the call as cancelled.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fails with [`Error::RequestCancelled`] or [`Error::DeadlineExceeded`]
    /// once the call should stop.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::RequestCancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Parses a `grpc-timeout` header value such as `"250m"` or `"5S"`.
///
/// The wire format is at most eight ASCII digits followed by a single unit:
/// `H` hours, `M` minutes, `S` seconds, `m` milliseconds, `u` microseconds,
/// `n` nanoseconds.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataValue;

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("10u"), Some(Duration::from_micros(10)));
        assert_eq!(parse_grpc_timeout("99n"), Some(Duration::from_nanos(99)));
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
        assert_eq!(parse_grpc_timeout("-1S"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
    }

    #[test]
    fn check_reports_cancellation_before_deadline() {
        let ctx = CallContext::new(CancellationToken::new());
        assert_eq!(ctx.check(), Ok(()));

        ctx.cancel();
        assert_eq!(ctx.check(), Err(Error::RequestCancelled));

        let expired = CallContext::new(CancellationToken::new()).with_deadline(Instant::now());
        assert_eq!(expired.check(), Err(Error::DeadlineExceeded));
    }

    #[test]
    fn from_metadata_reads_deadline_and_follows_parent() {
        let mut metadata = MetadataMap::new();
        metadata.insert(GRPC_TIMEOUT_HEADER, MetadataValue::from_static("30S"));
        let parent = CancellationToken::new();

        let ctx = CallContext::from_metadata(&metadata, &parent);
        assert!(ctx.deadline().is_some());
        assert_eq!(ctx.check(), Ok(()));

        parent.cancel();
        assert_eq!(ctx.check(), Err(Error::RequestCancelled));
    }
}
