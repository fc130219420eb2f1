//! Message types posted to the UI context

use image::RgbaImage;

/// Updates posted by the workers to the UI context
#[derive(Debug, Clone)]
pub enum DisplayUpdate {
    /// A corrected frame and the plate candidate found in it (if any)
    Frame {
        sequence: u64,
        image: RgbaImage,
        patch: Option<RgbaImage>,
    },
    /// A smoothed plate reading produced by a completed recognition
    Reading {
        sequence: u64,
        text: String,
        confidence: f32,
    },
    /// Stop the UI context after draining earlier updates
    Shutdown,
}

