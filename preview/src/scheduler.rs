use std::sync::Arc;
use std::time::Duration;

use frame_dream_common::config::DispatchMode;
use frame_dream_common::frame::Frame;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::client::{RemoteTransform, TransformError};

/// What the display loop needs to know after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// A frame was sent to the remote transform on this tick.
    pub dispatched: bool,
    /// Whole seconds until the next scheduled dispatch, rounded up.
    pub seconds_remaining: u64,
    /// A snapshot is held and can be overlaid on the live feed.
    pub should_display_snapshot: bool,
}

/// Periodic capture-and-dispatch state machine.
///
/// Every `interval` the current frame is kept as the snapshot and sent to
/// the remote transform. The latest successful result is kept until a newer
/// one replaces it; failures are logged and leave it untouched. The
/// schedule advances on every dispatch whether or not it succeeds.
///
/// In [`DispatchMode::Background`] the request runs on a spawned task and
/// at most one is ever in flight: a due dispatch waits until the previous
/// request has settled.
pub struct CaptureScheduler<T> {
    transform: Arc<T>,
    interval: Duration,
    mode: DispatchMode,
    last_dispatch: Instant,
    snapshot: Option<Frame>,
    result: Option<Frame>,
    in_flight: Option<JoinHandle<Result<Frame, TransformError>>>,
    capture_requested: bool,
    dispatches: u64,
    failures: u64,
}

impl<T: RemoteTransform> CaptureScheduler<T> {
    pub fn new(transform: Arc<T>, interval: Duration, mode: DispatchMode, now: Instant) -> Self {
        debug_assert!(!interval.is_zero(), "capture interval must be positive");
        Self {
            transform,
            interval,
            mode,
            last_dispatch: now,
            snapshot: None,
            result: None,
            in_flight: None,
            capture_requested: false,
            dispatches: 0,
            failures: 0,
        }
    }

    /// Advance the schedule to `now` with the frame currently on screen.
    ///
    /// In inline mode a dispatch awaits the full round trip before returning.
    pub async fn tick(&mut self, now: Instant, frame: &Frame) -> TickOutcome {
        self.poll_in_flight().await;

        let elapsed = now.saturating_duration_since(self.last_dispatch);
        let due = self.capture_requested || elapsed >= self.interval;
        let mut dispatched = false;
        if due && self.in_flight.is_none() {
            self.capture_requested = false;
            self.dispatch(now, frame).await;
            dispatched = true;
        }

        TickOutcome {
            dispatched,
            // Measured after any reset, so a dispatching tick reads the full interval.
            seconds_remaining: self.seconds_remaining(now),
            should_display_snapshot: self.snapshot.is_some(),
        }
    }

    /// Force a dispatch on the next tick regardless of the interval.
    pub fn request_capture(&mut self) {
        self.capture_requested = true;
    }

    pub fn seconds_remaining(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_dispatch);
        let remaining = self.interval.saturating_sub(elapsed);
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    pub fn snapshot(&self) -> Option<&Frame> {
        self.snapshot.as_ref()
    }

    pub fn result(&self) -> Option<&Frame> {
        self.result.as_ref()
    }

    #[cfg(test)]
    pub fn last_dispatch(&self) -> Instant {
        self.last_dispatch
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    async fn dispatch(&mut self, now: Instant, frame: &Frame) {
        self.snapshot = Some(frame.clone());
        self.last_dispatch = now;
        self.dispatches += 1;
        info!(
            dispatch = self.dispatches,
            mode = ?self.mode,
            width = frame.width(),
            height = frame.height(),
            "dispatching frame to remote transform"
        );

        match self.mode {
            DispatchMode::Inline => {
                let outcome = self.transform.submit(frame).await;
                self.settle(outcome);
            }
            DispatchMode::Background => {
                let transform = Arc::clone(&self.transform);
                let frame = frame.clone();
                self.in_flight = Some(tokio::spawn(async move { transform.submit(&frame).await }));
            }
        }
    }

    /// Adopt the background request's outcome once it has finished.
    async fn poll_in_flight(&mut self) {
        if !self.in_flight.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        if let Some(handle) = self.in_flight.take() {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(TransformError::Task(e.to_string())));
            self.settle(outcome);
        }
    }

    fn settle(&mut self, outcome: Result<Frame, TransformError>) {
        match outcome {
            Ok(image) => {
                info!(
                    dispatch = self.dispatches,
                    width = image.width(),
                    height = image.height(),
                    "remote result updated"
                );
                self.result = Some(image);
            }
            Err(e) => {
                self.failures += 1;
                warn!(
                    dispatch = self.dispatches,
                    kind = e.kind(),
                    error = %e,
                    "remote transform failed, keeping previous result"
                );
            }
        }
    }
}
