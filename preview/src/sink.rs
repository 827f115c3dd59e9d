use frame_dream_common::frame::{CodecError, Frame, TransportPayload};
use std::future::Future;
use std::path::PathBuf;
use tracing::debug;

/// Where composited frames are shown.
pub trait DisplaySink {
    fn show(&mut self, frame: &Frame) -> impl Future<Output = Result<(), DisplayError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("failed to encode preview frame: {0}")]
    Encode(#[from] CodecError),
    #[error("failed to write preview file {0}: {1}")]
    Write(String, std::io::Error),
}

/// Rewrites a single JPEG file with every frame.
///
/// Frames are written to a sibling temp file and renamed into place, so a
/// viewer polling the path never reads a half-written image.
pub struct JpegFileSink {
    path: PathBuf,
    tmp_path: PathBuf,
    quality: u8,
    frames_written: u64,
}

impl JpegFileSink {
    pub fn new(path: impl Into<PathBuf>, quality: u8) -> Self {
        let path = path.into();
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        Self {
            path,
            tmp_path,
            quality,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl DisplaySink for JpegFileSink {
    async fn show(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let payload = TransportPayload::encode_jpeg(frame, self.quality)?;
        tokio::fs::write(&self.tmp_path, &payload.bytes)
            .await
            .map_err(|e| DisplayError::Write(self.tmp_path.display().to_string(), e))?;
        tokio::fs::rename(&self.tmp_path, &self.path)
            .await
            .map_err(|e| DisplayError::Write(self.path.display().to_string(), e))?;
        self.frames_written += 1;
        if self.frames_written % 100 == 0 {
            debug!(
                frames = self.frames_written,
                bytes = payload.bytes.len(),
                path = self.path.display().to_string(),
                "preview frames written"
            );
        }
        Ok(())
    }
}
