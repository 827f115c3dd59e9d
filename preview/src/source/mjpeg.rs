use bytes::{Bytes, BytesMut};
use frame_dream_common::config::CameraConfig;
use frame_dream_common::frame::{decode_image, Frame};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{CaptureError, FrameSource};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for a `multipart/x-mixed-replace` MJPEG body.
///
/// Chunks may cut through boundaries, headers or JPEG data at any byte.
pub struct MjpegParser {
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl Default for MjpegParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MjpegParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    /// Feed one chunk; returns every JPEG completed by it, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut complete = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY)
                    else {
                        // Don't rescan bytes that cannot start a boundary.
                        self.jpeg_start = self.buffer.len().saturating_sub(BOUNDARY.len());
                        break;
                    };
                    let jpeg_end = self.jpeg_start + pos;
                    // Strip trailing \r\n before boundary
                    let end = if jpeg_end >= 2 && &self.buffer[jpeg_end - 2..jpeg_end] == b"\r\n" {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };

                    let jpeg = self.buffer.split_to(end).freeze();
                    let _ = self.buffer.split_to(jpeg_end - end + BOUNDARY.len());
                    if !jpeg.is_empty() {
                        complete.push(jpeg);
                    }
                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }

        complete
    }
}

/// Network camera serving an MJPEG stream over HTTP.
///
/// A reader task drains the stream continuously and publishes only the
/// newest JPEG, so a slow display loop always sees the current picture
/// instead of a backlog.
pub struct MjpegSource {
    latest: watch::Receiver<Option<Bytes>>,
    reader: JoinHandle<()>,
}

impl MjpegSource {
    pub async fn connect(config: &CameraConfig) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(CaptureError::HttpConnect)?;
        let response = client
            .get(&config.url)
            .send()
            .await
            .map_err(CaptureError::HttpConnect)?;

        if !response.status().is_success() {
            return Err(CaptureError::HttpStatus(response.status().as_u16()));
        }

        info!(url = config.url, status = %response.status(), "connected to MJPEG stream");

        let (tx, latest) = watch::channel(None);
        let reader = tokio::spawn(read_stream(response, tx));
        Ok(Self { latest, reader })
    }
}

impl FrameSource for MjpegSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        loop {
            self.latest
                .changed()
                .await
                .map_err(|_| CaptureError::StreamClosed)?;
            let latest = self.latest.borrow_and_update().clone();
            let Some(jpeg) = latest else {
                continue;
            };
            match decode_image(&jpeg) {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    warn!(error = %e, bytes = jpeg.len(), "failed to decode camera frame, waiting for next");
                }
            }
        }
    }
}

impl Drop for MjpegSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Drain the HTTP body into the parser until the stream ends or errors.
/// Dropping `tx` on return closes the source.
async fn read_stream(response: reqwest::Response, tx: watch::Sender<Option<Bytes>>) {
    let mut byte_stream = response.bytes_stream();
    let mut parser = MjpegParser::new();
    let mut frames: u64 = 0;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, frames, "MJPEG stream error");
                return;
            }
        };
        for jpeg in parser.push(&chunk) {
            frames += 1;
            if frames % 100 == 0 {
                debug!(frames, bytes = jpeg.len(), "camera frames received");
            }
            if tx.send(Some(jpeg)).is_err() {
                return;
            }
        }
    }

    info!(frames, "MJPEG stream ended");
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
