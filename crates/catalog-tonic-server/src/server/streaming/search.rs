use super::{push_error, send_message};
use crate::server::store::LaptopStore;
use catalog_tonic_core::{
    Error, Result,
    context::CallContext,
    proto::{Filter, SearchLaptopResponse},
};
use tokio::sync::mpsc;
use tonic::Status;

/// Scans `store` with `filter` and forwards every match into the response
/// channel of a `SearchLaptop` call.
///
/// Matches are copied out of the store first, so a slow client never holds
/// the store lock. Each one is then sent as the client makes room, for as
/// long as `ctx` is neither cancelled nor past its deadline.
///
/// Returns the number of laptops sent.
///
/// # Errors
///
/// - [`Error::ChannelError`] if the response stream was dropped (client went
///   away). Nothing is forwarded in that case.
/// - The context's cancellation or deadline error. This one is also pushed as
///   the final stream item, best effort, so the client sees the real cause.
pub async fn feed_matches(
    ctx: &CallContext,
    store: &dyn LaptopStore,
    filter: &Filter,
    resp_tx: &mpsc::Sender<core::result::Result<SearchLaptopResponse, Status>>,
) -> Result<usize> {
    match forward(ctx, store, filter, resp_tx).await {
        Err(e) if !matches!(e, Error::ChannelError { .. }) => {
            push_error(resp_tx, &e);
            Err(e)
        }
        other => other,
    }
}

async fn forward(
    ctx: &CallContext,
    store: &dyn LaptopStore,
    filter: &Filter,
    resp_tx: &mpsc::Sender<core::result::Result<SearchLaptopResponse, Status>>,
) -> Result<usize> {
    let mut found = Vec::new();
    store.search(ctx, filter, &mut |laptop| {
        found.push(laptop);
        Ok(())
    })?;

    let mut sent = 0;
    for laptop in found {
        tracing::debug!(id = %laptop.id, "found laptop");
        let resp = SearchLaptopResponse {
            laptop: Some(laptop),
        };
        send_message(ctx, resp_tx, Ok(resp)).await?;
        sent += 1;
    }
    Ok(sent)
}
