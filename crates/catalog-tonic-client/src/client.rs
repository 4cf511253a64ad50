use crate::{
    auth::{AuthAgent, AuthAgentService},
    error::{ClientError, Result},
};
use bytes::Bytes;
use catalog_tonic_core::proto::{
    CreateLaptopRequest, Filter, ImageInfo, Laptop, RateLaptopRequest, RateLaptopResponse,
    SearchLaptopRequest, UploadImageRequest, UploadImageResponse,
    laptop_service_client::LaptopServiceClient, upload_image_request::Data,
};
use std::path::Path;
use tokio_stream::StreamExt;
use tonic::{codec::CompressionEncoding, transport::Channel};
use tower::Layer;

/// Upload chunk size.
pub const CHUNK_SIZE: usize = 1024;

/// Typed access to `LaptopService` with tokens attached by an [`AuthAgent`].
#[derive(Clone)]
pub struct LaptopClient {
    inner: LaptopServiceClient<AuthAgentService<Channel>>,
}

impl LaptopClient {
    pub fn new(channel: Channel, agent: &AuthAgent) -> Self {
        let inner = LaptopServiceClient::new(agent.layer().layer(channel))
            .send_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip);
        Self { inner }
    }

    /// Stores `laptop` and returns its id, generated by the server when
    /// `laptop.id` is empty.
    pub async fn create_laptop(&mut self, laptop: Laptop) -> Result<String> {
        let resp = self
            .inner
            .create_laptop(CreateLaptopRequest {
                laptop: Some(laptop),
            })
            .await?;
        let id = resp.into_inner().id;
        tracing::info!(%id, "created laptop");
        Ok(id)
    }

    /// Collects every laptop matching `filter`.
    pub async fn search_laptop(&mut self, filter: Filter) -> Result<Vec<Laptop>> {
        let mut stream = self
            .inner
            .search_laptop(SearchLaptopRequest {
                filter: Some(filter),
            })
            .await?
            .into_inner();

        let mut found = Vec::new();
        while let Some(resp) = stream.next().await {
            if let Some(laptop) = resp?.laptop {
                tracing::debug!(id = %laptop.id, "found laptop");
                found.push(laptop);
            }
        }
        Ok(found)
    }

    /// Uploads the file at `path` as an image of `laptop_id`. The image type
    /// is the file extension.
    pub async fn upload_image(
        &mut self,
        laptop_id: &str,
        path: &Path,
    ) -> Result<UploadImageResponse> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::ReadImage {
                path: path.to_path_buf(),
                source,
            })?;
        let image_type = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        self.upload_bytes(laptop_id, &image_type, Bytes::from(data))
            .await
    }

    /// Uploads `data` in [`CHUNK_SIZE`] pieces after the image info message.
    pub async fn upload_bytes(
        &mut self,
        laptop_id: &str,
        image_type: &str,
        data: Bytes,
    ) -> Result<UploadImageResponse> {
        let info = UploadImageRequest {
            data: Some(Data::Info(ImageInfo {
                laptop_id: laptop_id.to_string(),
                image_type: image_type.to_string(),
            })),
        };
        let chunks = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(move |start| {
                let end = (start + CHUNK_SIZE).min(data.len());
                UploadImageRequest {
                    data: Some(Data::ChunkData(data.slice(start..end))),
                }
            });
        let outbound = tokio_stream::iter(core::iter::once(info).chain(chunks));

        let resp = self.inner.upload_image(outbound).await?.into_inner();
        tracing::info!(id = %resp.id, size = resp.size, "uploaded image");
        Ok(resp)
    }

    /// Sends every `(laptop_id, score)` pair on one `RateLaptop` stream and
    /// returns the responses in order.
    pub async fn rate_laptop<I>(&mut self, ratings: I) -> Result<Vec<RateLaptopResponse>>
    where
        I: IntoIterator<Item = (String, f64)>,
        I::IntoIter: Send + 'static,
    {
        let outbound = tokio_stream::iter(
            ratings
                .into_iter()
                .map(|(laptop_id, score)| RateLaptopRequest { laptop_id, score }),
        );

        let mut stream = self.inner.rate_laptop(outbound).await?.into_inner();
        let mut responses = Vec::new();
        while let Some(resp) = stream.next().await {
            let resp = resp?;
            tracing::debug!(
                laptop_id = %resp.laptop_id,
                count = resp.rated_count,
                average = resp.average_score,
                "rated laptop"
            );
            responses.push(resp);
        }
        Ok(responses)
    }
}
