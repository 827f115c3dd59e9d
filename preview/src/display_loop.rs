use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::RemoteTransform;
use crate::compositor::Compositor;
use crate::scheduler::CaptureScheduler;
use crate::sink::DisplaySink;
use crate::source::{CaptureError, FrameSource};

/// Flags set from outside the loop (signal handlers). Capture is polled
/// once per tick; quit also interrupts a pending frame read.
#[derive(Debug)]
pub struct LoopControl {
    quit: watch::Sender<bool>,
    capture: AtomicBool,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self {
            quit: watch::channel(false).0,
            capture: AtomicBool::new(false),
        }
    }
}

impl LoopControl {
    pub fn request_quit(&self) {
        self.quit.send_replace(true);
    }

    pub fn request_capture(&self) {
        self.capture.store(true, Ordering::SeqCst);
    }

    fn quit_requested(&self) -> bool {
        *self.quit.borrow()
    }

    /// Resolves once quit has been requested, immediately if it already was.
    async fn quit_signalled(&self) {
        let mut quit = self.quit.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = quit.wait_for(|requested| *requested).await;
    }

    fn take_capture_request(&self) -> bool {
        self.capture.swap(false, Ordering::SeqCst)
    }
}

/// Why the loop stopped.
#[derive(Debug)]
pub enum LoopExit {
    Quit,
    CameraFailed(CaptureError),
}

/// Per-tick driver: pull a frame, advance the scheduler, composite, show.
pub struct DisplayLoop<S, T, D> {
    source: S,
    scheduler: CaptureScheduler<T>,
    compositor: Compositor,
    sink: D,
    tick_period: Duration,
    frame_timeout: Duration,
    ticks: u64,
}

impl<S, T, D> DisplayLoop<S, T, D>
where
    S: FrameSource,
    T: RemoteTransform,
    D: DisplaySink,
{
    pub fn new(
        source: S,
        scheduler: CaptureScheduler<T>,
        compositor: Compositor,
        sink: D,
        tick_period: Duration,
        frame_timeout: Duration,
    ) -> Self {
        Self {
            source,
            scheduler,
            compositor,
            sink,
            tick_period,
            frame_timeout,
            ticks: 0,
        }
    }

    /// Run until quit is requested or the camera fails or stalls for
    /// longer than the frame timeout.
    pub async fn run(&mut self, control: &LoopControl) -> LoopExit {
        let mut ticker = tokio::time::interval(self.tick_period);
        // After a long inline dispatch, resume pacing instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let frame_timeout = self.frame_timeout;

        let exit = loop {
            ticker.tick().await;

            if control.take_capture_request() {
                info!("manual capture requested");
                self.scheduler.request_capture();
            }

            let read = tokio::select! {
                _ = control.quit_signalled() => break LoopExit::Quit,
                read = tokio::time::timeout(frame_timeout, self.source.next_frame()) => read,
            };
            let frame = match read.unwrap_or(Err(CaptureError::Timeout(frame_timeout))) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, "failed to read frame from camera");
                    break LoopExit::CameraFailed(e);
                }
            };

            let outcome = self.scheduler.tick(Instant::now(), &frame).await;
            let composite = self.compositor.render(
                &frame,
                self.scheduler
                    .snapshot()
                    .filter(|_| outcome.should_display_snapshot),
                self.scheduler.result(),
                outcome.seconds_remaining,
            );
            if let Err(e) = self.sink.show(&composite).await {
                warn!(error = %e, "failed to show preview frame");
            }

            self.ticks += 1;
            if outcome.dispatched || self.ticks % 100 == 0 {
                debug!(
                    ticks = self.ticks,
                    dispatched = outcome.dispatched,
                    in_flight = self.scheduler.is_in_flight(),
                    seconds_remaining = outcome.seconds_remaining,
                    "display loop running"
                );
            }

            if control.quit_requested() {
                break LoopExit::Quit;
            }
        };

        info!(
            ticks = self.ticks,
            dispatches = self.scheduler.dispatches(),
            failures = self.scheduler.failures(),
            reason = ?exit,
            "display loop stopped"
        );
        exit
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &CaptureScheduler<T> {
        &self.scheduler
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
