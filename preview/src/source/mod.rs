pub mod mjpeg;

use frame_dream_common::frame::Frame;
use std::future::Future;
use std::time::Duration;

pub use mjpeg::MjpegSource;

/// Camera-side frame provider polled once per display tick.
///
/// Implementations return the most recent frame available; a returned
/// error means the camera is gone and the display loop terminates.
pub trait FrameSource {
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame, CaptureError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("camera returned HTTP status {0}")]
    HttpStatus(u16),
    #[error("camera stream closed")]
    StreamClosed,
    #[error("no frame from camera within {0:?}")]
    Timeout(Duration),
}
