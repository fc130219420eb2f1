//! Display Layer
//!
//! Headless presentation model of the reader screen: the corrected frame,
//! the plate patch, the plate label and the confidence bar. All fields are
//! owned and mutated by a single UI thread; workers post `DisplayUpdate`s to
//! it, and other threads read a published snapshot.

pub mod renderers;

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

use crate::shared::{DisplayUpdate, PipelineStats};

pub use renderers::{LogRenderer, Renderer, SnapshotRenderer};

/// What an applied update changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayChange {
    /// Image and patch were replaced
    Frame,
    /// Label and progress were replaced
    Reading,
}

/// The reader screen
#[derive(Debug, Clone, Default)]
pub struct DisplayState {
    /// Corrected camera frame
    pub image: Option<RgbaImage>,
    /// Plate candidate of the last frame
    pub patch: Option<RgbaImage>,
    /// Stabilized plate text
    pub label: String,
    /// Confidence bar value in [0, 1]
    pub progress: f32,
    /// Sequence of the frame shown
    pub frame_sequence: u64,
    /// Sequence of the frame the shown reading came from
    pub reading_sequence: u64,
    pub frames_shown: u64,
    pub readings_shown: u64,
}

impl DisplayState {
    /// Apply an update. Returns what changed, or `None` for a reading older
    /// than the one already shown.
    pub fn apply(&mut self, update: DisplayUpdate) -> Option<DisplayChange> {
        match update {
            DisplayUpdate::Frame { sequence, image, patch } => {
                self.image = Some(image);
                self.patch = patch;
                self.frame_sequence = sequence;
                self.frames_shown += 1;
                Some(DisplayChange::Frame)
            }
            DisplayUpdate::Reading {
                sequence,
                text,
                confidence,
            } => {
                if self.readings_shown > 0 && sequence < self.reading_sequence {
                    debug!(
                        "Discarding reading from frame {} (showing {})",
                        sequence, self.reading_sequence
                    );
                    return None;
                }
                self.label = text;
                self.progress = confidence.clamp(0.0, 1.0);
                self.reading_sequence = sequence;
                self.readings_shown += 1;
                Some(DisplayChange::Reading)
            }
            DisplayUpdate::Shutdown => None,
        }
    }

    /// Read-only summary of the screen
    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            label: self.label.clone(),
            progress: self.progress,
            frame_sequence: self.frame_sequence,
            reading_sequence: self.reading_sequence,
            image_size: self.image.as_ref().map(|i| i.dimensions()),
            patch_size: self.patch.as_ref().map(|p| p.dimensions()),
            frames_shown: self.frames_shown,
            readings_shown: self.readings_shown,
        }
    }
}

/// Copy of the screen contents readable from any thread
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplaySnapshot {
    pub label: String,
    pub progress: f32,
    pub frame_sequence: u64,
    pub reading_sequence: u64,
    pub image_size: Option<(u32, u32)>,
    pub patch_size: Option<(u32, u32)>,
    pub frames_shown: u64,
    pub readings_shown: u64,
}

/// Cloneable handle for posting updates to the UI thread
#[derive(Debug, Clone)]
pub struct UiHandle {
    tx: Sender<DisplayUpdate>,
}

impl UiHandle {
    /// Schedule an update; silently dropped once the UI has shut down
    pub fn post(&self, update: DisplayUpdate) {
        let _ = self.tx.send(update);
    }
}

/// The single-threaded UI context
pub struct UiContext {
    handle: UiHandle,
    snapshot: Arc<RwLock<DisplaySnapshot>>,
    thread: Option<JoinHandle<DisplayState>>,
}

impl UiContext {
    /// Spawn the UI thread with the given renderers
    pub fn spawn(renderers: Vec<Box<dyn Renderer>>, stats: Arc<PipelineStats>) -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        let snapshot = Arc::new(RwLock::new(DisplaySnapshot::default()));
        let published = snapshot.clone();

        let thread = std::thread::Builder::new()
            .name("ui".to_string())
            .spawn(move || run_ui(rx, renderers, published, stats))?;

        Ok(Self {
            handle: UiHandle { tx },
            snapshot,
            thread: Some(thread),
        })
    }

    /// Handle for posting updates
    pub fn handle(&self) -> UiHandle {
        self.handle.clone()
    }

    /// Latest published screen contents
    pub fn snapshot(&self) -> DisplaySnapshot {
        self.snapshot.read().clone()
    }

    /// Apply everything posted so far, stop the thread and return the final screen
    pub fn shutdown(mut self) -> DisplayState {
        self.handle.post(DisplayUpdate::Shutdown);
        self.thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for UiContext {
    fn drop(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.handle.post(DisplayUpdate::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_ui(
    rx: Receiver<DisplayUpdate>,
    mut renderers: Vec<Box<dyn Renderer>>,
    published: Arc<RwLock<DisplaySnapshot>>,
    stats: Arc<PipelineStats>,
) -> DisplayState {
    info!("UI context started with {} renderer(s)", renderers.len());
    let mut state = DisplayState::default();

    for update in rx.iter() {
        if matches!(update, DisplayUpdate::Shutdown) {
            break;
        }
        let is_reading = matches!(update, DisplayUpdate::Reading { .. });

        match state.apply(update) {
            Some(change) => {
                *published.write() = state.snapshot();
                for renderer in renderers.iter_mut() {
                    renderer.render(&state, change);
                }
            }
            None if is_reading => PipelineStats::bump(&stats.stale_readings_discarded),
            None => {}
        }
    }

    info!("UI context stopped");
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn frame(sequence: u64, patch: bool) -> DisplayUpdate {
        DisplayUpdate::Frame {
            sequence,
            image: RgbaImage::new(8, 6),
            patch: patch.then(|| RgbaImage::new(4, 2)),
        }
    }

    fn reading(sequence: u64, text: &str, confidence: f32) -> DisplayUpdate {
        DisplayUpdate::Reading {
            sequence,
            text: text.to_string(),
            confidence,
        }
    }

    #[test]
    fn test_frame_without_patch_keeps_label_and_progress() {
        let mut state = DisplayState::default();
        state.apply(frame(1, true));
        state.apply(reading(1, "1AB2345", 0.8));

        assert_eq!(state.apply(frame(2, false)), Some(DisplayChange::Frame));
        assert!(state.patch.is_none());
        assert_eq!(state.label, "1AB2345");
        assert!((state.progress - 0.8).abs() < f32::EPSILON);
        assert_eq!(state.frame_sequence, 2);
    }

    #[test]
    fn test_stale_reading_is_discarded() {
        let mut state = DisplayState::default();
        state.apply(reading(5, "NEWER", 0.9));

        assert_eq!(state.apply(reading(3, "OLDER", 0.4)), None);
        assert_eq!(state.label, "NEWER");
        assert_eq!(state.reading_sequence, 5);
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut state = DisplayState::default();
        state.apply(reading(1, "X", 1.7));
        assert_eq!(state.progress, 1.0);
    }

    #[test]
    fn test_snapshot_sizes() {
        let mut state = DisplayState::default();
        state.apply(frame(1, true));
        let snap = state.snapshot();
        assert_eq!(snap.image_size, Some((8, 6)));
        assert_eq!(snap.patch_size, Some((4, 2)));
        assert_eq!(snap.frames_shown, 1);
    }

    /// Records the thread every render happens on
    struct ThreadRecorder(Arc<Mutex<Vec<Option<String>>>>);

    impl Renderer for ThreadRecorder {
        fn render(&mut self, _state: &DisplayState, _change: DisplayChange) {
            self.0
                .lock()
                .push(std::thread::current().name().map(|n| n.to_string()));
        }
    }

    #[test]
    fn test_updates_are_applied_on_ui_thread() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stats = Arc::new(PipelineStats::default());
        let ui = UiContext::spawn(vec![Box::new(ThreadRecorder(seen.clone()))], stats.clone()).unwrap();

        let handle = ui.handle();
        let poster = std::thread::spawn(move || {
            handle.post(frame(1, true));
            handle.post(reading(1, "1AB2345", 0.5));
            handle.post(reading(0, "STALE", 0.1));
        });
        poster.join().unwrap();

        let state = ui.shutdown();
        assert_eq!(state.label, "1AB2345");
        assert_eq!(state.frames_shown, 1);
        assert_eq!(state.readings_shown, 1);
        assert_eq!(stats.snapshot().stale_readings_discarded, 1);

        let threads = seen.lock();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|t| t.as_deref() == Some("ui")));
    }

    #[test]
    fn test_snapshot_is_published() {
        let ui = UiContext::spawn(Vec::new(), Arc::new(PipelineStats::default())).unwrap();
        ui.handle().post(reading(2, "ZZ99", 0.25));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while ui.snapshot().readings_shown == 0 && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert_eq!(ui.snapshot().label, "ZZ99");
        ui.shutdown();
    }
}
