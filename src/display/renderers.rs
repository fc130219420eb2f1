//! Renderers presenting the reader screen
//!
//! Renderers run on the UI thread after every applied update.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{DisplayChange, DisplayState};

/// Presents the screen after it changed
pub trait Renderer: Send {
    fn render(&mut self, state: &DisplayState, change: DisplayChange);
}

/// Logs plate readings as they change
#[derive(Debug, Default)]
pub struct LogRenderer {
    last_label: String,
}

impl Renderer for LogRenderer {
    fn render(&mut self, state: &DisplayState, change: DisplayChange) {
        match change {
            DisplayChange::Frame => debug!(
                "Frame {} shown, patch: {}",
                state.frame_sequence,
                state.patch.is_some()
            ),
            DisplayChange::Reading => {
                if state.label != self.last_label {
                    info!(
                        "Plate {} ({:.0}% confidence, frame {})",
                        if state.label.is_empty() { "-" } else { state.label.as_str() },
                        state.progress * 100.0,
                        state.reading_sequence
                    );
                    self.last_label = state.label.clone();
                }
            }
        }
    }
}

/// Reading as written to `reading.json`
#[derive(Debug, Serialize)]
struct ReadingRecord<'a> {
    frame: u64,
    text: &'a str,
    confidence: f32,
}

/// Writes the screen to disk: `frame.png` and `patch.png` every N frames,
/// `reading.json` on every reading
pub struct SnapshotRenderer {
    dir: PathBuf,
    every_n_frames: u64,
}

impl SnapshotRenderer {
    /// Create the renderer, creating `dir` if needed
    pub fn new(dir: &Path, every_n_frames: u64) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            every_n_frames: every_n_frames.max(1),
        })
    }

    fn write_frame(&self, state: &DisplayState) {
        if let Some(image) = &state.image {
            if let Err(e) = image.save(self.dir.join("frame.png")) {
                warn!("Failed to write frame snapshot: {}", e);
            }
        }

        let patch_path = self.dir.join("patch.png");
        match &state.patch {
            Some(patch) => {
                if let Err(e) = patch.save(&patch_path) {
                    warn!("Failed to write patch snapshot: {}", e);
                }
            }
            None => {
                let _ = std::fs::remove_file(&patch_path);
            }
        }
    }

    fn write_reading(&self, state: &DisplayState) {
        let record = ReadingRecord {
            frame: state.reading_sequence,
            text: &state.label,
            confidence: state.progress,
        };
        let result = serde_json::to_string_pretty(&record)
            .map_err(std::io::Error::from)
            .and_then(|json| std::fs::write(self.dir.join("reading.json"), json));
        if let Err(e) = result {
            warn!("Failed to write reading snapshot: {}", e);
        }
    }
}

impl Renderer for SnapshotRenderer {
    fn render(&mut self, state: &DisplayState, change: DisplayChange) {
        match change {
            DisplayChange::Frame if state.frames_shown % self.every_n_frames == 0 => self.write_frame(state),
            DisplayChange::Frame => {}
            DisplayChange::Reading => self.write_reading(state),
        }
    }
}
