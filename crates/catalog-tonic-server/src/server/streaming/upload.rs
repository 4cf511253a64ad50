use super::next_message;
use crate::server::store::{ImageStore, LaptopStore, validate_image_type};
use bytes::BytesMut;
use catalog_tonic_core::{
    Error, Result,
    context::CallContext,
    proto::{ImageInfo, UploadImageRequest, UploadImageResponse, upload_image_request::Data},
    types::MAX_IMAGE_SIZE,
};
use tokio_stream::Stream;
use tonic::Status;

/// Drives one `UploadImage` exchange to completion.
///
/// The stream must open with an `info` message naming an existing laptop,
/// followed by any number of `chunk_data` messages. Chunks are appended in
/// arrival order; the assembled image is handed to `images` once the client
/// closes its side.
///
/// # Errors
///
/// - [`Error::ProtocolViolation`] if the first message is not `info`, or if
///   `info` shows up again mid-stream.
/// - [`Error::InvalidRequest`] if the image type is unsupported, the laptop
///   is unknown, or the image grows past [`MAX_IMAGE_SIZE`]. The first two
///   are checked before any chunk is read.
/// - The context's cancellation or deadline error.
/// - Whatever [`ImageStore::save`] fails with.
///
/// Nothing is stored unless the whole exchange succeeds.
pub async fn receive_image<S>(
    ctx: &CallContext,
    laptops: &dyn LaptopStore,
    images: &dyn ImageStore,
    mut inbound: S,
) -> Result<UploadImageResponse>
where
    S: Stream<Item = core::result::Result<UploadImageRequest, Status>> + Unpin,
{
    let info = await_info(ctx, &mut inbound).await?;
    validate_image_type(&info.image_type)?;

    if laptops.find(&info.laptop_id).is_none() {
        return Err(Error::invalid(format!(
            "laptop {} does not exist",
            info.laptop_id
        )));
    }
    tracing::debug!(
        laptop_id = %info.laptop_id,
        image_type = %info.image_type,
        "receiving image"
    );

    let mut data = BytesMut::new();
    while let Some(msg) = next_message(ctx, &mut inbound).await? {
        let chunk = match msg.data {
            Some(Data::ChunkData(chunk)) => chunk,
            Some(Data::Info(_)) => {
                return Err(Error::protocol("image info sent twice"));
            }
            None => return Err(Error::protocol("empty upload message")),
        };

        ctx.check()?;
        let size = data.len() + chunk.len();
        if size > MAX_IMAGE_SIZE {
            return Err(Error::invalid(format!(
                "image is too large: {size} > {MAX_IMAGE_SIZE}"
            )));
        }
        data.extend_from_slice(&chunk);
    }

    let size = data.len();
    let id = images
        .save(&info.laptop_id, &info.image_type, data.freeze())
        .await?;
    tracing::debug!(%id, size, "image saved");

    crate::server::telemetry::record_upload_bytes(size as u64);

    Ok(UploadImageResponse {
        id,
        // Bounded by MAX_IMAGE_SIZE.
        size: size as u32,
    })
}

async fn await_info<S>(ctx: &CallContext, inbound: &mut S) -> Result<ImageInfo>
where
    S: Stream<Item = core::result::Result<UploadImageRequest, Status>> + Unpin,
{
    match next_message(ctx, inbound).await? {
        Some(UploadImageRequest {
            data: Some(Data::Info(info)),
        }) => Ok(info),
        Some(_) => Err(Error::protocol("first upload message must be image info")),
        None => Err(Error::protocol("upload closed before image info")),
    }
}
