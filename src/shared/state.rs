//! Pipeline counters shared between the capture, frame and recognition threads

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live pipeline counters, updated lock-free from every worker
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Frames read from the camera
    pub frames_captured: AtomicU64,
    /// Frames discarded because the frame worker was busy
    pub frames_dropped: AtomicU64,
    /// Frames corrected and localized by the frame worker
    pub frames_processed: AtomicU64,
    /// Frames that yielded a plate candidate
    pub patches_found: AtomicU64,
    /// Patches handed to the recognizer
    pub recognitions_submitted: AtomicU64,
    /// Patches skipped because a recognition was outstanding
    pub recognitions_skipped_busy: AtomicU64,
    /// Recognitions that produced text
    pub recognitions_completed: AtomicU64,
    /// Recognitions that failed
    pub recognitions_failed: AtomicU64,
    /// Readings discarded by the display as older than the one shown
    pub stale_readings_discarded: AtomicU64,
    /// Time spent in the recognizer, summed over finished recognitions
    pub recognition_micros: AtomicU64,
}

impl PipelineStats {
    /// Increment a counter by one
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for one finished recognition
    pub fn record_recognition(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.recognition_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_captured: load(&self.frames_captured),
            frames_dropped: load(&self.frames_dropped),
            frames_processed: load(&self.frames_processed),
            patches_found: load(&self.patches_found),
            recognitions_submitted: load(&self.recognitions_submitted),
            recognitions_skipped_busy: load(&self.recognitions_skipped_busy),
            recognitions_completed: load(&self.recognitions_completed),
            recognitions_failed: load(&self.recognitions_failed),
            stale_readings_discarded: load(&self.stale_readings_discarded),
            recognition_micros: load(&self.recognition_micros),
        }
    }
}

/// Point-in-time copy of `PipelineStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub frames_processed: u64,
    pub patches_found: u64,
    pub recognitions_submitted: u64,
    pub recognitions_skipped_busy: u64,
    pub recognitions_completed: u64,
    pub recognitions_failed: u64,
    pub stale_readings_discarded: u64,
    pub recognition_micros: u64,
}

impl StatsSnapshot {
    /// Fraction of processed frames that produced a plate candidate
    pub fn detection_rate(&self) -> f32 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.patches_found as f32 / self.frames_processed as f32
        }
    }

    /// Mean recognizer time over completed and failed recognitions
    pub fn mean_recognition_time(&self) -> Option<Duration> {
        let finished = self.recognitions_completed + self.recognitions_failed;
        if finished == 0 {
            return None;
        }
        Some(Duration::from_micros(self.recognition_micros / finished))
    }
}
