//! Camera Capture Layer
//!
//! Configures a capture session on top of a `CameraDevice` and runs the
//! capture thread that feeds frames to the frame-delivery worker. Every
//! setup step is optional: a missing device or an unsupported setting
//! leaves that part of the session unset instead of failing.

pub mod camera;
pub mod frame;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use image::imageops;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::shared::PipelineStats;

pub use camera::{default_device, CameraDevice, ImageSequenceCamera, ResolutionPreset, VideoOrientation};
pub use frame::{CapturedFrame, PixelFormat};

/// Errors raised while looking up or reading a camera
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture device: {0}")]
    DeviceNotFound(String),
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("device input rejected: {0}")]
    InputRejected(String),
    #[error("frame buffer too small for {width}x{height} ({len} bytes)")]
    MalformedFrame { width: u32, height: u32, len: usize },
    #[error("failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Camera capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory of recorded frames to replay
    pub frames_dir: Option<PathBuf>,
    /// Restart the recording when it ends
    pub loop_frames: bool,
    /// Orientation the recorded frames were taken in
    pub native_orientation: VideoOrientation,
    /// Requested resolution preset
    pub preset: ResolutionPreset,
    /// Requested orientation of delivered frames
    pub orientation: VideoOrientation,
    /// Drop frames that arrive while the worker is busy
    pub discard_late_frames: bool,
    /// Maximum frames per second pulled from the device (0 = unthrottled)
    pub max_fps: u32,
    /// Stop after this many frames have been captured
    pub max_frames: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frames_dir: None,
            loop_frames: false,
            native_orientation: VideoOrientation::Portrait,
            preset: ResolutionPreset::Hd1280x720,
            orientation: VideoOrientation::Portrait,
            discard_late_frames: true,
            max_fps: 30,
            max_frames: None,
        }
    }
}

/// Outcome of one session setup step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SetupOutcome {
    Applied,
    Skipped(String),
}

impl SetupOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SetupOutcome::Applied)
    }
}

/// Result of configuring a capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub preset: SetupOutcome,
    pub input: SetupOutcome,
    pub output: SetupOutcome,
    pub orientation: SetupOutcome,
}

/// A configured, not yet running, capture session
pub struct CaptureSession {
    config: CaptureConfig,
    device: Option<Box<dyn CameraDevice>>,
    quarter_turns: u8,
    report: SessionReport,
}

impl CaptureSession {
    /// Configure a session from the result of a device lookup
    pub fn configure(
        config: CaptureConfig,
        lookup: Result<Box<dyn CameraDevice>, CaptureError>,
    ) -> Self {
        let mut device = match lookup {
            Ok(device) => Some(device),
            Err(e) => {
                warn!("Capture input not attached: {}", e);
                None
            }
        };

        let preset = match device.as_mut() {
            Some(dev) if dev.supports_preset(config.preset) => {
                dev.set_preset(config.preset);
                SetupOutcome::Applied
            }
            Some(_) => SetupOutcome::Skipped(format!("{:?} not supported", config.preset)),
            None => SetupOutcome::Skipped("no input device".to_string()),
        };

        let input = match device.as_ref() {
            Some(dev) => {
                info!("Attached capture input {}", dev.name());
                SetupOutcome::Applied
            }
            None => SetupOutcome::Skipped("device lookup failed".to_string()),
        };

        debug!(
            "Frame output: {:?}, discard late frames: {}",
            PixelFormat::Bgra8,
            config.discard_late_frames
        );
        let output = SetupOutcome::Applied;

        let (orientation, quarter_turns) = match device.as_ref() {
            Some(dev) if dev.supports_orientation(config.orientation) => (
                SetupOutcome::Applied,
                config.orientation.quarter_turns_from(dev.native_orientation()),
            ),
            _ => {
                warn!("Video orientation was not set");
                (SetupOutcome::Skipped("orientation not supported".to_string()), 0)
            }
        };

        Self {
            config,
            device,
            quarter_turns,
            report: SessionReport {
                preset,
                input,
                output,
                orientation,
            },
        }
    }

    /// Outcomes of the setup steps
    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    /// Whether an input device is attached
    pub fn has_input(&self) -> bool {
        self.device.is_some()
    }

    /// Start the capture thread. Frames are offered to `frame_tx`; the
    /// sender is dropped when the stream ends.
    pub fn start(self, frame_tx: Sender<CapturedFrame>, stats: Arc<PipelineStats>) -> CaptureHandle {
        let running = Arc::new(AtomicBool::new(true));

        let Some(device) = self.device else {
            warn!("Capture session has no input, no frames will be delivered");
            return CaptureHandle {
                running,
                thread: None,
            };
        };

        let worker = CaptureLoop {
            device,
            frame_tx,
            stats,
            running: running.clone(),
            quarter_turns: self.quarter_turns,
            discard_late_frames: self.config.discard_late_frames,
            frame_interval: frame_interval(self.config.max_fps),
            max_frames: self.config.max_frames,
        };

        let thread = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || worker.run())
            .map_err(|e| warn!("Failed to spawn capture thread: {}", e))
            .ok();

        CaptureHandle { running, thread }
    }
}

/// Channel between the capture thread and the frame-delivery worker.
///
/// Zero capacity: a frame is handed over only while the worker waits in
/// `recv`, so with `discard_late_frames` a frame arriving while the worker
/// is busy is dropped instead of waiting for it.
pub fn frame_channel() -> (Sender<CapturedFrame>, Receiver<CapturedFrame>) {
    bounded(0)
}

/// Consecutive unreadable frames after which the stream is considered ended
const MAX_CONSECUTIVE_READ_FAILURES: u32 = 30;

fn frame_interval(max_fps: u32) -> Duration {
    if max_fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(1.0 / max_fps as f64)
    }
}

struct CaptureLoop {
    device: Box<dyn CameraDevice>,
    frame_tx: Sender<CapturedFrame>,
    stats: Arc<PipelineStats>,
    running: Arc<AtomicBool>,
    quarter_turns: u8,
    discard_late_frames: bool,
    frame_interval: Duration,
    max_frames: Option<u64>,
}

impl CaptureLoop {
    fn run(mut self) {
        info!("Capture thread starting on {}", self.device.name());
        let mut sequence = 0u64;
        let mut failures = 0u32;

        while self.running.load(Ordering::Acquire) {
            if self.max_frames.is_some_and(|max| sequence >= max) {
                info!("Reached frame limit of {}", sequence);
                break;
            }
            let started = Instant::now();

            let frame = match self.device.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Camera stream ended after {} frames", sequence);
                    break;
                }
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_READ_FAILURES {
                        warn!("{} unreadable frames in a row, ending stream: {}", failures, e);
                        break;
                    }
                    warn!("Skipping unreadable frame: {}", e);
                    self.pace(started);
                    continue;
                }
            };
            failures = 0;

            sequence += 1;
            let mut frame = orient(frame, self.quarter_turns);
            frame.sequence = sequence;
            PipelineStats::bump(&self.stats.frames_captured);

            if self.discard_late_frames {
                match self.frame_tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(late)) => {
                        trace!("Worker busy, discarding frame {}", late.sequence);
                        PipelineStats::bump(&self.stats.frames_dropped);
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            } else if self.frame_tx.send(frame).is_err() {
                break;
            }

            self.pace(started);
        }

        info!("Capture thread exiting");
    }

    /// Sleep out the rest of the frame interval
    fn pace(&self, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed < self.frame_interval {
            std::thread::sleep(self.frame_interval - elapsed);
        }
    }
}

/// Rotate a frame clockwise by the given number of quarter turns
fn orient(frame: CapturedFrame, quarter_turns: u8) -> CapturedFrame {
    if quarter_turns % 4 == 0 {
        return frame;
    }

    let image = frame.to_rgba_image();
    let rotated = match quarter_turns % 4 {
        1 => imageops::rotate90(&image),
        2 => imageops::rotate180(&image),
        _ => imageops::rotate270(&image),
    };

    let mut out = CapturedFrame::from_rgba_image(&rotated);
    out.timestamp = frame.timestamp;
    out
}

/// Handle to a running capture thread
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Whether the capture thread has exited (or never started)
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Stop capturing and wait for the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// Device producing a fixed number of solid frames
    struct FakeCamera {
        remaining: usize,
        width: u32,
        height: u32,
        orientation_supported: bool,
        preset_supported: bool,
        preset: Option<ResolutionPreset>,
        /// Time each read takes
        delay: Duration,
        /// Every read fails
        broken: bool,
    }

    impl FakeCamera {
        fn new(frames: usize) -> Self {
            Self {
                remaining: frames,
                width: 4,
                height: 2,
                orientation_supported: true,
                preset_supported: true,
                preset: None,
                delay: Duration::ZERO,
                broken: false,
            }
        }
    }

    impl CameraDevice for FakeCamera {
        fn name(&self) -> &str {
            "fake"
        }

        fn native_orientation(&self) -> VideoOrientation {
            VideoOrientation::LandscapeRight
        }

        fn supports_preset(&self, _preset: ResolutionPreset) -> bool {
            self.preset_supported
        }

        fn set_preset(&mut self, preset: ResolutionPreset) {
            self.preset = Some(preset);
        }

        fn supports_orientation(&self, _orientation: VideoOrientation) -> bool {
            self.orientation_supported
        }

        fn next_frame(&mut self) -> Result<Option<CapturedFrame>, CaptureError> {
            std::thread::sleep(self.delay);
            if self.broken {
                return Err(CaptureError::InputRejected("unreadable".to_string()));
            }
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let img = RgbaImage::from_pixel(self.width, self.height, Rgba([1, 2, 3, 255]));
            Ok(Some(CapturedFrame::from_rgba_image(&img)))
        }
    }

    fn unthrottled() -> CaptureConfig {
        CaptureConfig {
            max_fps: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_steps_applied_with_capable_device() {
        let session = CaptureSession::configure(unthrottled(), Ok(Box::new(FakeCamera::new(1))));
        let report = session.report();

        assert!(report.preset.is_applied());
        assert!(report.input.is_applied());
        assert!(report.output.is_applied());
        assert!(report.orientation.is_applied());
        assert!(session.has_input());
    }

    #[test]
    fn test_missing_device_leaves_input_unset() {
        let session = CaptureSession::configure(
            unthrottled(),
            Err(CaptureError::PermissionDenied("camera".to_string())),
        );

        assert!(!session.has_input());
        assert!(!session.report().input.is_applied());
        assert!(!session.report().preset.is_applied());
        assert!(session.report().output.is_applied());

        // Starting without input delivers nothing and does not panic
        let (tx, rx) = frame_channel();
        let handle = session.start(tx, Arc::new(PipelineStats::default()));
        assert!(handle.is_finished());
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_unsupported_steps_are_skipped_independently() {
        let mut camera = FakeCamera::new(1);
        camera.orientation_supported = false;
        camera.preset_supported = false;

        let session = CaptureSession::configure(unthrottled(), Ok(Box::new(camera)));
        let report = session.report();

        assert!(!report.preset.is_applied());
        assert!(report.input.is_applied());
        assert!(!report.orientation.is_applied());
    }

    fn blocking() -> CaptureConfig {
        CaptureConfig {
            discard_late_frames: false,
            ..unthrottled()
        }
    }

    #[test]
    fn test_portrait_rotates_landscape_frames() {
        let session = CaptureSession::configure(blocking(), Ok(Box::new(FakeCamera::new(1))));
        let (tx, rx) = frame_channel();
        let mut handle = session.start(tx, Arc::new(PipelineStats::default()));

        let frame = rx.recv().unwrap();
        assert_eq!(frame.dimensions(), (2, 4));
        assert_eq!(frame.sequence(), 1);
        handle.stop();
    }

    #[test]
    fn test_late_frames_are_discarded() {
        let stats = Arc::new(PipelineStats::default());
        let session = CaptureSession::configure(unthrottled(), Ok(Box::new(FakeCamera::new(5))));
        let (tx, rx) = frame_channel();
        let mut handle = session.start(tx, stats.clone());

        // Nobody is waiting for frames, so none can be handed over
        while !handle.is_finished() {
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.stop();

        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(stats.snapshot().frames_captured, 5);
        assert_eq!(stats.snapshot().frames_dropped, 5);
    }

    #[test]
    fn test_frames_arriving_while_busy_are_not_queued() {
        let stats = Arc::new(PipelineStats::default());
        let mut camera = FakeCamera::new(200);
        camera.delay = Duration::from_millis(5);
        let session = CaptureSession::configure(unthrottled(), Ok(Box::new(camera)));
        let (tx, rx) = frame_channel();
        let mut handle = session.start(tx, stats.clone());

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // Busy worker: frames captured meanwhile must be dropped
        std::thread::sleep(Duration::from_millis(200));
        let captured_while_busy = stats.snapshot().frames_captured;
        let next = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.stop();

        assert!(captured_while_busy > first.sequence() + 2);
        assert!(
            next.sequence() >= captured_while_busy,
            "stale frame {} delivered after {} were captured",
            next.sequence(),
            captured_while_busy
        );
        assert!(stats.snapshot().frames_dropped > 0);
    }

    #[test]
    fn test_blocking_delivery_keeps_every_frame() {
        let session = CaptureSession::configure(blocking(), Ok(Box::new(FakeCamera::new(3))));
        let (tx, rx) = frame_channel();
        let mut handle = session.start(tx, Arc::new(PipelineStats::default()));

        let sequences: Vec<u64> = rx.iter().map(|f| f.sequence()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        handle.stop();
    }

    #[test]
    fn test_frame_limit_stops_stream() {
        let config = CaptureConfig {
            max_frames: Some(2),
            ..blocking()
        };
        let session = CaptureSession::configure(config, Ok(Box::new(FakeCamera::new(10))));
        let (tx, rx) = frame_channel();
        let mut handle = session.start(tx, Arc::new(PipelineStats::default()));

        assert_eq!(rx.iter().count(), 2);
        handle.stop();
    }

    #[test]
    fn test_unreadable_camera_ends_stream() {
        let mut camera = FakeCamera::new(10);
        camera.broken = true;
        let config = CaptureConfig {
            loop_frames: true,
            ..blocking()
        };
        let stats = Arc::new(PipelineStats::default());
        let session = CaptureSession::configure(config, Ok(Box::new(camera)));
        let (tx, rx) = frame_channel();
        let mut handle = session.start(tx, stats.clone());

        // The sender is dropped once the capture thread gives up
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
        handle.stop();
        assert_eq!(stats.snapshot().frames_captured, 0);
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(0), Duration::ZERO);
        assert_eq!(frame_interval(10), Duration::from_millis(100));
    }
}
