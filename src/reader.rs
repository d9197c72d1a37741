//! Live frame reader.
//!
//! [`FrameReader`] pulls raw lines from a camera on its own worker thread,
//! independent of any recording, and raises an alert for every line that
//! contains saturated pixels. The camera keeps a separate read cursor per
//! thread, so a reader never steals frames from the recorder.
//!
//! # Example
//!
//! ```no_run
//! use linescan_daq::hardware::mock::MockCamera;
//! use linescan_daq::reader::FrameReader;
//! use linescan_daq::worker::Worker;
//! use std::sync::Arc;
//!
//! let camera = Arc::new(MockCamera::new());
//! let reader = Worker::new(FrameReader::new(camera));
//! reader.start()?;
//! // ... acquisition runs ...
//! reader.stop();
//! reader.join();
//! println!("{} lines read", reader.body().stats().frames_read());
//! # Ok::<(), linescan_daq::error::ScanError>(())
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::hardware::{ImageMode, LineScanCamera};
use crate::log_capture::{ScanLog, TracingLog};
use crate::worker::{CancelToken, WorkerBody};

/// Default frame fetch timeout.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(500);

/// Alert logged for each saturated line.
pub const SATURATION_ALERT: &str = "Saturation detected!";

/// Counters updated by a running [`FrameReader`].
#[derive(Debug, Default)]
pub struct FrameReaderStats {
    frames_read: AtomicU64,
    saturated_frames: AtomicU64,
    fetch_errors: AtomicU64,
}

impl FrameReaderStats {
    /// Lines received.
    pub fn frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::Relaxed)
    }

    /// Lines that contained at least one saturated pixel.
    pub fn saturated_frames(&self) -> u64 {
        self.saturated_frames.load(Ordering::Relaxed)
    }

    /// Failed fetches.
    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.load(Ordering::Relaxed)
    }
}

/// Worker body that reads raw lines until cancelled.
pub struct FrameReader {
    camera: Arc<dyn LineScanCamera>,
    timeout: Duration,
    log: Arc<dyn ScanLog>,
    stats: FrameReaderStats,
}

impl FrameReader {
    /// Read from `camera` with the default timeout, logging through `tracing`.
    pub fn new(camera: Arc<dyn LineScanCamera>) -> Self {
        Self {
            camera,
            timeout: DEFAULT_FRAME_TIMEOUT,
            log: Arc::new(TracingLog),
            stats: FrameReaderStats::default(),
        }
    }

    /// Override the frame fetch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send alerts to `log`.
    pub fn with_log(mut self, log: Arc<dyn ScanLog>) -> Self {
        self.log = log;
        self
    }

    /// Live counters.
    pub fn stats(&self) -> &FrameReaderStats {
        &self.stats
    }
}

impl WorkerBody for FrameReader {
    fn name(&self) -> &str {
        "frame-reader"
    }

    fn run(&self, cancel: &CancelToken) {
        debug!(camera = %self.camera.id(), "Frame reader started");

        while !cancel.is_cancelled() {
            match self.camera.next_frame(ImageMode::Raw, self.timeout) {
                Ok(Some(line)) => {
                    self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
                    if line.has_saturation() {
                        self.stats.saturated_frames.fetch_add(1, Ordering::Relaxed);
                        self.log.info(SATURATION_ALERT);
                    }
                }
                // Timed out, try again
                Ok(None) => {}
                Err(e) => {
                    self.stats.fetch_errors.fetch_add(1, Ordering::Relaxed);
                    self.log.warn(&format!("Frame fetch failed: {e:#}"));
                    cancel.sleep(self.timeout);
                }
            }
        }

        self.camera.release_reader();
        debug!(
            frames = self.stats.frames_read(),
            saturated = self.stats.saturated_frames(),
            "Frame reader exiting"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockCamera;
    use crate::log_capture::CapturingLog;
    use crate::worker::Worker;
    use std::thread;

    #[test]
    fn reads_until_stopped_and_flags_saturation() {
        let log = CapturingLog::default();
        let camera = Arc::new(MockCamera::new().with_timing(1_000, 1).with_saturation_every(2));
        camera.start_acquisition().unwrap();

        let reader = Worker::new(
            FrameReader::new(camera.clone())
                .with_timeout(Duration::from_millis(50))
                .with_log(Arc::new(log.clone())),
        );
        reader.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        reader.stop();
        reader.join();

        let stats = reader.body().stats();
        assert!(stats.frames_read() >= 2, "read {}", stats.frames_read());
        assert_eq!(stats.saturated_frames(), stats.frames_read() / 2);
        assert_eq!(
            log.buffer().count_containing(SATURATION_ALERT) as u64,
            stats.saturated_frames()
        );
        assert_eq!(camera.active_readers(), 0);
    }

    #[test]
    fn idle_camera_only_times_out() {
        let camera = Arc::new(MockCamera::new());
        let reader =
            Worker::new(FrameReader::new(camera.clone()).with_timeout(Duration::from_millis(5)));
        reader.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        reader.stop();
        reader.join();

        assert_eq!(reader.body().stats().frames_read(), 0);
        assert_eq!(reader.body().stats().fetch_errors(), 0);
    }
}
