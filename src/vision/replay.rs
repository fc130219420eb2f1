//! Replay recognizer
//!
//! Returns readings recorded from an earlier run (or hand-labelled), one per
//! recognition call. Useful for tuning the smoother offline and for running
//! the pipeline where no OCR engine is installed.

use image::GrayImage;
use std::path::Path;

use super::recognize::{RecognitionError, TextRecognizer};

/// Recognizer cycling through a fixed list of readings
#[derive(Debug, Clone)]
pub struct ReplayRecognizer {
    readings: Vec<String>,
    cursor: usize,
}

impl ReplayRecognizer {
    pub fn new(readings: Vec<String>) -> Self {
        Self { readings, cursor: 0 }
    }

    /// Load a transcript with one reading per line. Trailing whitespace is
    /// trimmed; empty lines stand for a recognition that returned nothing.
    pub fn from_file(path: &Path) -> Result<Self, RecognitionError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecognitionError::Init(format!("{}: {}", path.display(), e)))?;
        let readings: Vec<String> = content.lines().map(|l| l.trim_end().to_string()).collect();
        if readings.is_empty() {
            return Err(RecognitionError::Init(format!("{} is empty", path.display())));
        }
        Ok(Self::new(readings))
    }
}

impl TextRecognizer for ReplayRecognizer {
    fn name(&self) -> &str {
        "replay"
    }

    fn recognize(&mut self, _patch: &GrayImage) -> Result<String, RecognitionError> {
        if self.readings.is_empty() {
            return Err(RecognitionError::Exhausted);
        }
        let reading = self.readings[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.readings.len();
        Ok(reading)
    }
}
