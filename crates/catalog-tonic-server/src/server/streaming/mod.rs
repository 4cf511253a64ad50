//! Multi-message protocol state machines behind the streaming calls.
//!
//! Each module owns one store-mutating exchange and is written against plain
//! `Stream`s and channels, so it can run under tonic or be driven directly in
//! tests.
//!
//! ## Structure
//!
//! - [`search`] - feeds filtered laptops into a server-streaming response.
//! - [`upload`] - assembles a client-streamed image (info, then chunks).
//! - [`rating`] - answers each rating request on a bidirectional stream.

pub mod rating;
pub mod search;
pub mod upload;

use catalog_tonic_core::{Error, Result, context::CallContext};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tonic::{Code, Status};

/// Waits for the next inbound message, giving up early when `ctx` is
/// cancelled or its deadline passes.
///
/// Returns `Ok(None)` once the peer has finished sending.
pub(crate) async fn next_message<S, T>(ctx: &CallContext, inbound: &mut S) -> Result<Option<T>>
where
    S: Stream<Item = core::result::Result<T, Status>> + Unpin,
{
    ctx.check()?;

    tokio::select! {
        biased;
        () = ctx.token().cancelled() => Err(Error::RequestCancelled),
        () = deadline_elapsed(ctx) => Err(Error::DeadlineExceeded),
        msg = inbound.next() => msg.transpose().map_err(from_transport),
    }
}

/// Hands `item` to the response stream, waiting for room while the client
/// catches up, but no longer than `ctx` allows.
///
/// # Errors
///
/// - [`Error::ChannelError`] if the response stream was dropped.
/// - The context's cancellation or deadline error if it trips first.
pub(crate) async fn send_message<T>(
    ctx: &CallContext,
    tx: &mpsc::Sender<T>,
    item: T,
) -> Result<()> {
    ctx.check()?;

    tokio::select! {
        biased;
        () = ctx.token().cancelled() => Err(Error::RequestCancelled),
        () = deadline_elapsed(ctx) => Err(Error::DeadlineExceeded),
        sent = tx.send(item) => sent.map_err(|_| Error::ChannelError {
            context: "response stream closed".into(),
        }),
    }
}

/// Pushes a terminal error without waiting. Dropped if the client is gone or
/// not keeping up.
pub(crate) fn push_error<T>(tx: &mpsc::Sender<core::result::Result<T, Status>>, err: &Error) {
    if let Err(e) = tx.try_send(Err(err.clone().into())) {
        tracing::debug!("cannot forward stream error: {e}");
    }
}

async fn deadline_elapsed(ctx: &CallContext) {
    match ctx.deadline() {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => core::future::pending().await,
    }
}

/// Maps a receive failure reported by the transport.
pub(crate) fn from_transport(status: Status) -> Error {
    match status.code() {
        Code::Cancelled => Error::RequestCancelled,
        Code::DeadlineExceeded => Error::DeadlineExceeded,
        _ => Error::protocol(format!("cannot receive stream message: {}", status.message())),
    }
}
