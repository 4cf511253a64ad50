//! `LaptopService` implementation.
//!
//! [`CatalogService`] owns the laptop, image and rating stores and exposes
//! them through the four call shapes:
//!
//! - `CreateLaptop` (unary) validates or assigns the id and stores the laptop.
//! - `SearchLaptop` (server streaming) copies the matches out of the store
//!   and streams them back as the client reads.
//! - `UploadImage` (client streaming) assembles image chunks and stores the
//!   result once the client is done.
//! - `RateLaptop` (bidirectional) answers each rating as it arrives.
//!
//! Every call gets a [`CallContext`] whose token is a child of the service's
//! shutdown token, so [`CatalogService::shutdown`] reaches work that is still
//! running. Dropping a streaming response cancels its context too.

use super::reject;
use crate::server::{
    auth::Claims,
    store::{ImageStore, LaptopStore, RatingStore},
    streaming::{rating::answer_ratings, search::feed_matches, upload::receive_image},
    telemetry::{
        decrement_streams_inflight, increment_laptops_created, increment_requests,
        increment_streams_inflight,
    },
};
use catalog_tonic_core::{
    Error, Result,
    context::CallContext,
    proto::{
        CreateLaptopRequest, CreateLaptopResponse, RateLaptopRequest, RateLaptopResponse,
        SearchLaptopRequest, SearchLaptopResponse, UploadImageRequest, UploadImageResponse,
        laptop_service_server::LaptopService,
    },
};
use core::{pin::Pin, time::Duration};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::{sync::Arc, time::SystemTime};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming, metadata::MetadataMap};
use tracing::Instrument;
use uuid::Uuid;

type ResponseStream<T> = Pin<Box<dyn Stream<Item = core::result::Result<T, Status>> + Send>>;

/// The catalog's `LaptopService`.
///
/// Cheap to clone; clones share stores and shutdown state.
#[derive(Clone)]
pub struct CatalogService {
    laptops: Arc<dyn LaptopStore>,
    images: Arc<dyn ImageStore>,
    ratings: Arc<dyn RatingStore>,
    stream_buffer_size: usize,
    shutdown: Arc<ShutdownState>,
}

#[derive(Default)]
struct ShutdownState {
    closing: AtomicBool,
    inflight: AtomicUsize,
    token: CancellationToken,
}

/// Counts one running call for as long as it lives.
struct InflightGuard(Arc<ShutdownState>);

impl InflightGuard {
    fn enter(state: &Arc<ShutdownState>) -> Self {
        state.inflight.fetch_add(1, Ordering::AcqRel);
        increment_streams_inflight();
        Self(Arc::clone(state))
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
    }
}

impl CatalogService {
    pub fn new(
        laptops: Arc<dyn LaptopStore>,
        images: Arc<dyn ImageStore>,
        ratings: Arc<dyn RatingStore>,
        stream_buffer_size: usize,
    ) -> Self {
        Self {
            laptops,
            images,
            ratings,
            stream_buffer_size: stream_buffer_size.max(1),
            shutdown: Arc::new(ShutdownState::default()),
        }
    }

    pub fn laptops(&self) -> &Arc<dyn LaptopStore> {
        &self.laptops
    }

    pub fn images(&self) -> &Arc<dyn ImageStore> {
        &self.images
    }

    pub fn ratings(&self) -> &Arc<dyn RatingStore> {
        &self.ratings
    }

    /// Number of calls currently running.
    pub fn inflight(&self) -> usize {
        self.shutdown.inflight.load(Ordering::Acquire)
    }

    /// Stops the service.
    ///
    /// New calls are refused with `Unavailable` right away. Running calls
    /// get up to `timeout` to finish on their own, after which whatever is
    /// left is cancelled.
    pub async fn shutdown(&self, timeout: Duration) {
        // === Phase 0: Stop accepting new requests ===
        tracing::info!("Refusing new requests");
        self.shutdown.closing.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight calls to drain ===
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());
        let drained = tokio::time::timeout(timeout, async {
            while self.inflight() > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All in-flight calls drained"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} calls still active)",
                self.inflight()
            ),
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown.token.cancel();
    }

    fn begin_call(&self, metadata: &MetadataMap) -> Result<(CallContext, InflightGuard)> {
        if self.shutdown.closing.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }
        increment_requests();
        Ok((
            CallContext::from_metadata(metadata, &self.shutdown.token),
            InflightGuard::enter(&self.shutdown),
        ))
    }

    fn create(&self, ctx: &CallContext, req: CreateLaptopRequest) -> Result<String> {
        let mut laptop = req
            .laptop
            .ok_or_else(|| Error::invalid("laptop is required"))?;

        if laptop.id.is_empty() {
            laptop.id = Uuid::new_v4().to_string();
        } else {
            Uuid::parse_str(&laptop.id)
                .map_err(|e| Error::invalid(format!("laptop id is not a valid UUID: {e}")))?;
        }

        ctx.check()?;

        laptop.updated_at = Some(SystemTime::now().into());
        self.laptops.save(&laptop)?;
        increment_laptops_created();

        tracing::info!(id = %laptop.id, "laptop saved");
        Ok(laptop.id)
    }
}

/// Username carried by the verified token, if the call was authenticated.
fn caller<T>(req: &Request<T>) -> &str {
    req.extensions()
        .get::<Claims>()
        .map_or("anonymous", |claims| claims.sub.as_str())
}

/// Wraps a response channel so that dropping the stream (client gone)
/// cancels `ctx`.
fn cancel_on_drop<T: Send + 'static>(
    ctx: &CallContext,
    rx: mpsc::Receiver<core::result::Result<T, Status>>,
) -> ResponseStream<T> {
    let guard = ctx.token().clone().drop_guard();
    Box::pin(ReceiverStream::new(rx).map(move |item| {
        let _guard = &guard;
        item
    }))
}

fn log_stream_outcome(call: &str, outcome: &Result<usize>) {
    match outcome {
        Ok(sent) => tracing::debug!(sent, "{call} finished"),
        Err(Error::ChannelError { .. }) => tracing::debug!("{call} abandoned by client"),
        Err(e @ (Error::RequestCancelled | Error::DeadlineExceeded)) => {
            tracing::debug!("{call} stopped: {e}");
        }
        Err(e) => tracing::warn!("{call} failed: {e}"),
    }
}

#[tonic::async_trait]
impl LaptopService for CatalogService {
    type SearchLaptopStream = ResponseStream<SearchLaptopResponse>;
    type RateLaptopStream = ResponseStream<RateLaptopResponse>;

    #[tracing::instrument(skip_all, fields(caller = %caller(&req)))]
    async fn create_laptop(
        &self,
        req: Request<CreateLaptopRequest>,
    ) -> core::result::Result<Response<CreateLaptopResponse>, Status> {
        let (ctx, _inflight) = self.begin_call(req.metadata()).map_err(reject)?;
        let id = self.create(&ctx, req.into_inner()).map_err(reject)?;
        Ok(Response::new(CreateLaptopResponse { id }))
    }

    #[tracing::instrument(skip_all, fields(caller = %caller(&req)))]
    async fn search_laptop(
        &self,
        req: Request<SearchLaptopRequest>,
    ) -> core::result::Result<Response<Self::SearchLaptopStream>, Status> {
        let (ctx, inflight) = self.begin_call(req.metadata()).map_err(reject)?;
        let filter = req.into_inner().filter.unwrap_or_default();
        tracing::debug!(?filter, "searching laptops");

        let (tx, rx) = mpsc::channel(self.stream_buffer_size);
        let laptops = Arc::clone(&self.laptops);
        let scan_ctx = ctx.clone();

        let fut = async move {
            let _inflight = inflight;
            let outcome = feed_matches(&scan_ctx, laptops.as_ref(), &filter, &tx).await;
            log_stream_outcome("search", &outcome);
        };
        tokio::spawn(fut.instrument(tracing::Span::current()));

        Ok(Response::new(cancel_on_drop(&ctx, rx)))
    }

    #[tracing::instrument(skip_all, fields(caller = %caller(&req)))]
    async fn upload_image(
        &self,
        req: Request<Streaming<UploadImageRequest>>,
    ) -> core::result::Result<Response<UploadImageResponse>, Status> {
        let (ctx, _inflight) = self.begin_call(req.metadata()).map_err(reject)?;
        let resp = receive_image(
            &ctx,
            self.laptops.as_ref(),
            self.images.as_ref(),
            req.into_inner(),
        )
        .await
        .map_err(reject)?;

        tracing::info!(id = %resp.id, size = resp.size, "image uploaded");
        Ok(Response::new(resp))
    }

    #[tracing::instrument(skip_all, fields(caller = %caller(&req)))]
    async fn rate_laptop(
        &self,
        req: Request<Streaming<RateLaptopRequest>>,
    ) -> core::result::Result<Response<Self::RateLaptopStream>, Status> {
        let (ctx, inflight) = self.begin_call(req.metadata()).map_err(reject)?;
        let inbound = req.into_inner();

        let (tx, rx) = mpsc::channel(self.stream_buffer_size);
        let laptops = Arc::clone(&self.laptops);
        let ratings = Arc::clone(&self.ratings);
        let task_ctx = ctx.clone();

        let fut = async move {
            let _inflight = inflight;
            let outcome =
                answer_ratings(&task_ctx, laptops.as_ref(), ratings.as_ref(), inbound, &tx).await;
            log_stream_outcome("rating", &outcome);
        };
        tokio::spawn(fut.instrument(tracing::Span::current()));

        Ok(Response::new(cancel_on_drop(&ctx, rx)))
    }
}
