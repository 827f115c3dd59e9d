//! One-shot round trip: post a still image to the relay and save the reply.

use std::path::Path;

use frame_dream_common::config::PreviewConfig;
use frame_dream_common::frame::{decode_image, CodecError, TransportPayload};
use tracing::info;

use crate::client::{HttpTransform, TransformError};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to read {0}: {1}")]
    ReadInput(String, std::io::Error),
    #[error("unrecognised image format in {0}: {1}")]
    Format(String, image::ImageError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("relay returned an undecodable image: {0}")]
    Decode(CodecError),
    #[error("failed to write {0}: {1}")]
    WriteOutput(String, std::io::Error),
}

/// Send `input` to the configured endpoint unchanged and write the returned
/// image bytes to `output`. Returns the dimensions of the returned image.
pub async fn run(
    input: &Path,
    output: &Path,
    config: &PreviewConfig,
) -> Result<(u32, u32), ProbeError> {
    let bytes = tokio::fs::read(input)
        .await
        .map_err(|e| ProbeError::ReadInput(input.display().to_string(), e))?;
    let format = image::guess_format(&bytes)
        .map_err(|e| ProbeError::Format(input.display().to_string(), e))?;
    let payload = TransportPayload { bytes, format };
    let upload_bytes = payload.bytes.len();

    let transform = HttpTransform::new(config)?;
    info!(
        endpoint = transform.endpoint(),
        input = %input.display(),
        format = payload.format_tag(),
        upload_bytes,
        "sending probe image"
    );
    let reply = transform.fetch_image_bytes(payload).await?;
    let dimensions = decode_image(&reply).map_err(ProbeError::Decode)?.dimensions();

    tokio::fs::write(output, &reply)
        .await
        .map_err(|e| ProbeError::WriteOutput(output.display().to_string(), e))?;
    info!(
        output = %output.display(),
        width = dimensions.0,
        height = dimensions.1,
        "probe reply saved"
    );
    Ok(dimensions)
}
