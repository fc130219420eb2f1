//! Application Coordinator
//!
//! Wires the capture session, motion manager, localizer, recognition worker,
//! smoother and UI context into the reader pipeline and manages their
//! lifecycle.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::analysis::{TemporalSmoother, VotingSmoother};
use crate::capture::{
    default_device, frame_channel, CameraDevice, CaptureError, CaptureHandle, CaptureSession, CapturedFrame,
    SessionReport,
};
use crate::config::AppConfig;
use crate::display::{DisplaySnapshot, LogRenderer, Renderer, SnapshotRenderer, UiContext, UiHandle};
use crate::motion::{FixedGravity, GravitySource, GravityVector, MotionHandle, MotionManager, RecordedGravity, RotationCell};
use crate::shared::{DisplayUpdate, PipelineStats, StatsSnapshot};
use crate::vision::{
    build_recognizer, preprocess_patch, EdgeDensityLocalizer, PatchPreprocessing, PlateLocalizer,
    RecognitionJob, RecognitionOutcome, RecognitionWorker, TextRecognizer,
};

/// Everything the pipeline needs injected
pub struct Capabilities {
    /// Result of the camera lookup
    pub camera: Result<Box<dyn CameraDevice>, CaptureError>,
    pub gravity: Box<dyn GravitySource>,
    pub localizer: Box<dyn PlateLocalizer>,
    /// `None` runs localization only
    pub recognizer: Option<Box<dyn TextRecognizer>>,
    pub smoother: Box<dyn TemporalSmoother>,
    pub renderers: Vec<Box<dyn Renderer>>,
}

impl Capabilities {
    /// Build the built-in capabilities described by the configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let gravity: Box<dyn GravitySource> = match (&config.motion.gravity_file, config.motion.fixed_tilt_degrees) {
            (Some(path), _) => Box::new(RecordedGravity::from_file(path)?),
            (None, Some(degrees)) => Box::new(FixedGravity(GravityVector::from_tilt_degrees(degrees))),
            (None, None) => Box::new(FixedGravity(GravityVector::new(0.0, -1.0, 0.0))),
        };

        let recognizer = build_recognizer(&config.recognition).context("Failed to build recognizer")?;

        let mut renderers: Vec<Box<dyn Renderer>> = Vec::new();
        if config.output.log_readings {
            renderers.push(Box::new(LogRenderer::default()));
        }
        if let Some(dir) = &config.output.snapshot_dir {
            let renderer = SnapshotRenderer::new(dir, config.output.snapshot_every)
                .with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;
            renderers.push(Box::new(renderer));
        }

        Ok(Self {
            camera: default_device(&config.capture),
            gravity,
            localizer: Box::new(EdgeDensityLocalizer::new(config.localizer.clone())),
            recognizer,
            smoother: Box::new(VotingSmoother::new(config.smoothing.clone())),
            renderers,
        })
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub session: SessionReport,
    pub stats: StatsSnapshot,
    pub display: DisplaySnapshot,
    pub elapsed_ms: u64,
}

/// Threads of a started pipeline
struct RunningPipeline {
    report: SessionReport,
    ui: UiContext,
    motion: Option<MotionHandle>,
    capture: CaptureHandle,
    frame_worker: JoinHandle<()>,
    started: Instant,
}

/// Main application coordinator
pub struct PlateReaderApp {
    config: AppConfig,
    capabilities: Option<Capabilities>,
    /// Counters shared by every pipeline thread
    stats: Arc<PipelineStats>,
    /// Latest rotation written by the motion manager
    rotation: Arc<RotationCell>,
    running: Option<RunningPipeline>,
}

impl PlateReaderApp {
    /// Create a new application coordinator
    pub fn new(config: AppConfig, capabilities: Capabilities) -> Self {
        Self {
            config,
            capabilities: Some(capabilities),
            stats: Arc::new(PipelineStats::default()),
            rotation: Arc::new(RotationCell::new(0.0)),
            running: None,
        }
    }

    /// Shared pipeline counters
    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Latest published screen, if running
    pub fn snapshot(&self) -> Option<DisplaySnapshot> {
        self.running.as_ref().map(|r| r.ui.snapshot())
    }

    /// Start every pipeline thread
    pub fn run(&mut self) -> Result<()> {
        let caps = self
            .capabilities
            .take()
            .ok_or_else(|| anyhow::anyhow!("Pipeline already started"))?;

        let started = Instant::now();
        let ui = UiContext::spawn(caps.renderers, self.stats.clone()).context("Failed to spawn UI thread")?;

        let motion = match MotionManager::start(caps.gravity, self.config.motion.update_interval(), self.rotation.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Motion updates unavailable: {}", e);
                None
            }
        };

        let recognition = match caps.recognizer {
            Some(recognizer) => {
                let on_complete = completion_handler(caps.smoother, ui.handle(), self.stats.clone());
                Some(RecognitionWorker::spawn(recognizer, on_complete).context("Failed to spawn recognition thread")?)
            }
            None => {
                info!("No recognizer configured, running localization only");
                None
            }
        };

        let (frame_tx, frame_rx) = frame_channel();
        let worker = FrameWorker {
            localizer: caps.localizer,
            recognition,
            preprocessing: self.config.recognition.preprocessing.clone(),
            rotation: self.rotation.clone(),
            ui: ui.handle(),
            stats: self.stats.clone(),
        };
        let frame_worker = std::thread::Builder::new()
            .name("frame-worker".to_string())
            .spawn(move || worker.run(frame_rx))
            .context("Failed to spawn frame worker")?;

        let session = CaptureSession::configure(self.config.capture.clone(), caps.camera);
        let report = session.report().clone();
        let capture = session.start(frame_tx, self.stats.clone());

        info!("Pipeline started");
        self.running = Some(RunningPipeline {
            report,
            ui,
            motion,
            capture,
            frame_worker,
            started,
        });
        Ok(())
    }

    /// Block until the camera stream ends, drain the pipeline and summarize the run
    pub fn wait(&mut self) -> Result<RunSummary> {
        let mut running = self
            .running
            .take()
            .ok_or_else(|| anyhow::anyhow!("Pipeline not started"))?;

        // The frame worker ends once the capture thread drops its sender and
        // the outstanding recognition has completed
        if running.frame_worker.join().is_err() {
            warn!("Frame worker panicked");
        }
        running.capture.stop();
        if let Some(mut motion) = running.motion.take() {
            motion.stop();
        }
        let display = running.ui.shutdown();

        let summary = RunSummary {
            session: running.report,
            stats: self.stats.snapshot(),
            display: display.snapshot(),
            elapsed_ms: running.started.elapsed().as_millis() as u64,
        };
        info!(
            "Run finished: {} frames, {} readings, label {:?}",
            summary.stats.frames_processed, summary.display.readings_shown, summary.display.label
        );
        Ok(summary)
    }

    /// Stop capturing early and drain the pipeline
    pub fn stop(&mut self) -> Result<RunSummary> {
        if let Some(running) = self.running.as_mut() {
            running.capture.stop();
        }
        self.wait()
    }
}

impl Drop for PlateReaderApp {
    fn drop(&mut self) {
        if self.running.is_some() {
            let _ = self.stop();
        }
    }
}

/// Per-frame processing on the frame-delivery thread
struct FrameWorker {
    localizer: Box<dyn PlateLocalizer>,
    recognition: Option<RecognitionWorker>,
    preprocessing: PatchPreprocessing,
    rotation: Arc<RotationCell>,
    ui: UiHandle,
    stats: Arc<PipelineStats>,
}

impl FrameWorker {
    fn run(mut self, frames: crossbeam_channel::Receiver<CapturedFrame>) {
        debug!("Frame worker starting");
        for frame in frames.iter() {
            self.process(frame);
        }

        if let Some(mut recognition) = self.recognition.take() {
            recognition.shutdown();
        }
        debug!("Frame worker exiting");
    }

    fn process(&mut self, frame: CapturedFrame) {
        let rotation = self.rotation.load();
        let image = frame.to_rgba_image();
        let localization = self.localizer.correct_and_localize(&image, rotation);
        PipelineStats::bump(&self.stats.frames_processed);

        if let Some(patch) = &localization.patch {
            PipelineStats::bump(&self.stats.patches_found);
            if let Some(recognition) = &self.recognition {
                self.submit(recognition, frame.sequence(), patch);
            }
        }

        self.ui.post(DisplayUpdate::Frame {
            sequence: frame.sequence(),
            image: localization.corrected,
            patch: localization.patch,
        });
    }

    fn submit(&self, recognition: &RecognitionWorker, sequence: u64, patch: &image::RgbaImage) {
        if recognition.is_busy() {
            trace!("Recognition busy, skipping frame {}", sequence);
            PipelineStats::bump(&self.stats.recognitions_skipped_busy);
            return;
        }

        let job = RecognitionJob {
            sequence,
            patch: preprocess_patch(patch, &self.preprocessing),
        };
        if recognition.try_submit(job) {
            PipelineStats::bump(&self.stats.recognitions_submitted);
        } else {
            PipelineStats::bump(&self.stats.recognitions_skipped_busy);
        }
    }
}

/// Completion handler: smooth the reading and post it to the UI
fn completion_handler(
    mut smoother: Box<dyn TemporalSmoother>,
    ui: UiHandle,
    stats: Arc<PipelineStats>,
) -> impl FnMut(RecognitionOutcome) + Send + 'static {
    move |outcome| {
        stats.record_recognition(outcome.elapsed);
        match outcome.result {
            Ok(raw) => {
                PipelineStats::bump(&stats.recognitions_completed);
                let reading = smoother.observe(&raw);
                ui.post(DisplayUpdate::Reading {
                    sequence: outcome.sequence,
                    text: reading.text,
                    confidence: reading.confidence,
                });
            }
            Err(_) => PipelineStats::bump(&stats.recognitions_failed),
        }
    }
}
