use frame_dream_common::config::PreviewConfig;
use frame_dream_common::frame::{decode_base64, decode_image, CodecError, Frame, TransportPayload};
use frame_dream_common::wire::{TransformResponse, IMAGE_FIELD};
use reqwest::multipart::{Form, Part};
use std::future::Future;
use tracing::debug;

/// Longest slice of a non-JSON error body carried into the error message.
const BODY_SNIPPET_LEN: usize = 256;

/// Round trip of one frame through the image-generation relay.
pub trait RemoteTransform: Send + Sync + 'static {
    fn submit(&self, frame: &Frame) -> impl Future<Output = Result<Frame, TransformError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to encode frame: {0}")]
    Encode(#[source] CodecError),
    #[error("request to relay failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("relay returned HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("malformed relay response: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error("relay reported success without an image")]
    MissingImage,
    #[error("failed to base64-decode image: {0}")]
    Base64(#[source] base64::DecodeError),
    #[error("failed to decode returned image: {0}")]
    Decode(#[source] CodecError),
    #[error("dispatch task failed: {0}")]
    Task(String),
}

impl TransformError {
    /// Coarse failure class used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::Network(_) | Self::Task(_) => "network",
            Self::Server { .. } => "server",
            Self::MalformedResponse(_)
            | Self::MissingImage
            | Self::Base64(_)
            | Self::Decode(_) => "decode",
        }
    }
}

/// Multipart-over-HTTP client for the relay.
///
/// Uploads the JPEG as form field `image` (`frame.jpg`, `image/jpeg`) and
/// expects `{"status": "success", "image": "<base64>"}` back.
pub struct HttpTransform {
    client: reqwest::Client,
    endpoint: String,
    jpeg_quality: u8,
}

impl HttpTransform {
    pub fn new(config: &PreviewConfig) -> Result<Self, TransformError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(TransformError::Network)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            jpeg_quality: config.jpeg_quality,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Upload an already-encoded payload and return the raw bytes of the returned image.
    pub async fn fetch_image_bytes(
        &self,
        payload: TransportPayload,
    ) -> Result<Vec<u8>, TransformError> {
        let file_name = format!(
            "frame.{}",
            payload.format.extensions_str().first().copied().unwrap_or("bin")
        );
        let mime = payload.mime_type();
        let upload_bytes = payload.bytes.len();
        let part = Part::bytes(payload.bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(TransformError::Network)?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(TransformError::Network)?;
        let status = response.status();
        let body = response.text().await.map_err(TransformError::Network)?;
        debug!(status = %status, upload_bytes, response_bytes = body.len(), "relay responded");

        let parsed = serde_json::from_str::<TransformResponse>(&body);
        if !status.is_success() {
            let message = match parsed {
                Ok(TransformResponse::Error {
                    message: Some(message),
                }) => message,
                _ => snippet(&body),
            };
            return Err(TransformError::Server {
                status: status.as_u16(),
                message,
            });
        }

        match parsed.map_err(TransformError::MalformedResponse)? {
            TransformResponse::Success { image: Some(image) } if !image.trim().is_empty() => {
                decode_base64(&image).map_err(TransformError::Base64)
            }
            TransformResponse::Success { .. } => Err(TransformError::MissingImage),
            TransformResponse::Error { message } => Err(TransformError::Server {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| "Unknown error.".into()),
            }),
        }
    }
}

impl RemoteTransform for HttpTransform {
    async fn submit(&self, frame: &Frame) -> Result<Frame, TransformError> {
        let payload =
            TransportPayload::encode_jpeg(frame, self.jpeg_quality).map_err(TransformError::Encode)?;
        let bytes = self.fetch_image_bytes(payload).await?;
        decode_image(&bytes).map_err(TransformError::Decode)
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
