//! Frame reader running next to a recording
//!
//! The reader and the scan share one camera; each keeps its own read cursor
//! and the reader must neither block nor be blocked by the scan.

use linescan_daq::hardware::mock::{MockCamera, MockRecorder};
use linescan_daq::log_capture::CapturingLog;
use linescan_daq::profiles::{ScanJob, Stationary};
use linescan_daq::reader::{FrameReader, SATURATION_ALERT};
use linescan_daq::recording::{PollTiming, RecordingOrchestrator};
use linescan_daq::worker::Worker;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn reader_sees_frames_while_scan_records() {
    let log = CapturingLog::default();
    let camera = Arc::new(
        MockCamera::new()
            .with_timing(2_000, 1)
            .with_saturation_every(5),
    );

    let orchestrator = RecordingOrchestrator::builder(
        camera.clone(),
        MockRecorder::new().with_line_rate(500.0),
    )
    .timing(PollTiming {
        status_poll: Duration::from_millis(10),
        ..PollTiming::default()
    })
    .log(Arc::new(log.clone()))
    .build()
    .unwrap();

    let scan = Worker::new(ScanJob::new(orchestrator, Stationary::new(0)).unwrap());
    let reader = Worker::new(
        FrameReader::new(camera.clone())
            .with_timeout(Duration::from_millis(20))
            .with_log(Arc::new(log.clone())),
    );

    reader.start().unwrap();
    scan.start().unwrap();
    thread::sleep(Duration::from_millis(150));

    scan.stop();
    reader.stop();
    scan.join();
    reader.join();

    let stats = reader.body().stats();
    assert!(stats.frames_read() >= 5, "read {}", stats.frames_read());
    assert_eq!(stats.saturated_frames(), stats.frames_read() / 5);
    assert_eq!(
        log.buffer().count_containing(SATURATION_ALERT) as u64,
        stats.saturated_frames()
    );
    assert!(log.buffer().count_containing("Recorded: ") >= 1);
    assert_eq!(camera.active_readers(), 0);

    let outcomes = scan.body().outcomes();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].cancelled);
    assert!(outcomes[0].frames_written > 0);
}
