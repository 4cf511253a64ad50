use super::{next_message, push_error, send_message};
use crate::server::store::{LaptopStore, RatingStore};
use catalog_tonic_core::{
    Error, Result,
    context::CallContext,
    proto::{RateLaptopRequest, RateLaptopResponse},
};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tonic::Status;

/// Answers every request of a `RateLaptop` exchange, one response per
/// request and in the same order, until the client closes its side.
///
/// Returns the number of ratings recorded.
///
/// # Errors
///
/// - [`Error::NotFound`] if a request names an unknown laptop.
/// - [`Error::ChannelError`] if the response stream was dropped.
/// - The context's cancellation or deadline error, or a receive failure.
///
/// Every error except [`Error::ChannelError`] is also pushed to the client
/// as the final stream item, best effort. Ratings recorded before the failure
/// stay recorded.
pub async fn answer_ratings<S>(
    ctx: &CallContext,
    laptops: &dyn LaptopStore,
    ratings: &dyn RatingStore,
    mut inbound: S,
    resp_tx: &mpsc::Sender<core::result::Result<RateLaptopResponse, Status>>,
) -> Result<usize>
where
    S: Stream<Item = core::result::Result<RateLaptopRequest, Status>> + Unpin,
{
    let outcome = rate_each(ctx, laptops, ratings, &mut inbound, resp_tx).await;

    match outcome {
        Err(e) if !matches!(e, Error::ChannelError { .. }) => {
            push_error(resp_tx, &e);
            Err(e)
        }
        other => other,
    }
}

async fn rate_each<S>(
    ctx: &CallContext,
    laptops: &dyn LaptopStore,
    ratings: &dyn RatingStore,
    inbound: &mut S,
    resp_tx: &mpsc::Sender<core::result::Result<RateLaptopResponse, Status>>,
) -> Result<usize>
where
    S: Stream<Item = core::result::Result<RateLaptopRequest, Status>> + Unpin,
{
    let mut rated = 0;

    while let Some(req) = next_message(ctx, inbound).await? {
        if laptops.find(&req.laptop_id).is_none() {
            return Err(Error::NotFound {
                kind: "laptop",
                id: req.laptop_id,
            });
        }

        let rating = ratings.add(&req.laptop_id, req.score);
        tracing::debug!(
            laptop_id = %req.laptop_id,
            score = req.score,
            count = rating.count,
            "rated laptop"
        );
        crate::server::telemetry::increment_ratings();

        let resp = RateLaptopResponse {
            laptop_id: req.laptop_id,
            rated_count: rating.count,
            average_score: rating.average(),
        };
        send_message(ctx, resp_tx, Ok(resp)).await?;
        rated += 1;
    }

    Ok(rated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::{InMemoryLaptopStore, InMemoryRatingStore};
    use catalog_tonic_core::proto::Laptop;

    fn laptops() -> InMemoryLaptopStore {
        let store = InMemoryLaptopStore::new();
        for id in ["a", "b"] {
            store
                .save(&Laptop {
                    id: id.into(),
                    ..Default::default()
                })
                .unwrap();
        }
        store
    }

    fn rate(laptop_id: &str, score: f64) -> core::result::Result<RateLaptopRequest, Status> {
        Ok(RateLaptopRequest {
            laptop_id: laptop_id.into(),
            score,
        })
    }

    async fn collect(
        mut rx: mpsc::Receiver<core::result::Result<RateLaptopResponse, Status>>,
    ) -> Vec<core::result::Result<RateLaptopResponse, Status>> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn one_response_per_request_in_order() {
        let laptops = laptops();
        let ratings = InMemoryRatingStore::new();
        let (tx, rx) = mpsc::channel(16);
        let inbound = tokio_stream::iter(vec![
            rate("a", 8.0),
            rate("b", 3.0),
            rate("a", 7.5),
            rate("a", 10.0),
        ]);

        let rated = answer_ratings(&CallContext::default(), &laptops, &ratings, inbound, &tx)
            .await
            .unwrap();
        drop(tx);
        assert_eq!(rated, 4);

        let out: Vec<_> = collect(rx).await.into_iter().map(|r| r.unwrap()).collect();
        let a: Vec<_> = out
            .iter()
            .filter(|r| r.laptop_id == "a")
            .map(|r| (r.rated_count, r.average_score))
            .collect();
        assert_eq!(a, vec![(1, 8.0), (2, 7.75), (3, 8.5)]);
        assert_eq!(out[1].laptop_id, "b");
        assert_eq!(out[1].rated_count, 1);
    }

    #[tokio::test]
    async fn unknown_laptop_ends_the_exchange_with_not_found() {
        let laptops = laptops();
        let ratings = InMemoryRatingStore::new();
        let (tx, rx) = mpsc::channel(16);
        let inbound =
            tokio_stream::iter(vec![rate("a", 5.0), rate("zzz", 5.0), rate("a", 5.0)]);

        let err = answer_ratings(&CallContext::default(), &laptops, &ratings, inbound, &tx)
            .await
            .unwrap_err();
        drop(tx);
        assert!(matches!(err, Error::NotFound { kind: "laptop", .. }));

        let out = collect(rx).await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert_eq!(out[1].as_ref().unwrap_err().code(), tonic::Code::NotFound);
        assert_eq!(ratings.get("a").unwrap().count, 1);
        assert!(ratings.get("zzz").is_none());
    }

    #[tokio::test]
    async fn empty_exchange_closes_cleanly() {
        let (tx, rx) = mpsc::channel(1);
        let rated = answer_ratings(
            &CallContext::default(),
            &laptops(),
            &InMemoryRatingStore::new(),
            tokio_stream::iter(Vec::<core::result::Result<RateLaptopRequest, Status>>::new()),
            &tx,
        )
        .await
        .unwrap();
        drop(tx);

        assert_eq!(rated, 0);
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn dropped_response_stream_stops_rating() {
        let laptops = laptops();
        let ratings = InMemoryRatingStore::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = answer_ratings(
            &CallContext::default(),
            &laptops,
            &ratings,
            tokio_stream::iter(vec![rate("a", 1.0), rate("a", 2.0)]),
            &tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::ChannelError { .. }));
        assert_eq!(ratings.get("a").unwrap().count, 1);
    }

    #[tokio::test]
    async fn unread_responses_give_up_at_the_deadline() {
        use core::time::Duration;
        use std::time::Instant;
        use tokio_util::sync::CancellationToken;

        let laptops = laptops();
        let ratings = InMemoryRatingStore::new();
        let ctx = CallContext::new(CancellationToken::new())
            .with_deadline(Instant::now() + Duration::from_millis(50));
        let (tx, _rx) = mpsc::channel(1);
        let inbound = tokio_stream::iter(vec![rate("a", 1.0), rate("a", 2.0), rate("a", 3.0)]);

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            answer_ratings(&ctx, &laptops, &ratings, inbound, &tx),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert_eq!(err, Error::DeadlineExceeded);
        assert_eq!(ratings.get("a").unwrap().count, 2);
    }
}
