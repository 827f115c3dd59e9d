use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

/// An RGB raster as produced by the camera and shown on screen.
pub type Frame = RgbImage;

/// Compressed image bytes plus the format they are encoded in.
#[derive(Debug, Clone)]
pub struct TransportPayload {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl TransportPayload {
    /// Encode a frame as JPEG at the given quality (1-100).
    pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Self, CodecError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CodecError::EmptyFrame);
        }
        let mut bytes = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
        frame.write_with_encoder(encoder)?;
        Ok(Self {
            bytes,
            format: ImageFormat::Jpeg,
        })
    }

    /// Short tag for the encoding, e.g. `"jpeg"`.
    pub fn format_tag(&self) -> &'static str {
        match self.format {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            other => other.extensions_str().first().copied().unwrap_or("bin"),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn decode(&self) -> Result<Frame, CodecError> {
        decode_image(&self.bytes)
    }
}

/// Decode compressed image bytes of any supported format into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<Frame, CodecError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(CodecError::Read)?
        .decode()?;
    Ok(img.to_rgb8())
}

/// Strip a `data:image/...;base64,` prefix if present.
pub fn strip_data_url(encoded: &str) -> &str {
    let trimmed = encoded.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, rest)) = trimmed.split_once(',') {
            return rest;
        }
    }
    trimmed
}

/// Decode a base64 image string (optionally data-URL prefixed) into raw bytes.
///
/// Embedded whitespace such as line wrapping is ignored.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let body = strip_data_url(encoded);
    if body.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(body)
    }
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("cannot encode an empty frame")]
    EmptyFrame,
    #[error("failed to read image bytes: {0}")]
    Read(std::io::Error),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}
